//! The conversion orchestrator.
//!
//! [`Converter`] wires the pipeline together: validate options, derive the
//! output geometry and timing plan, grab and composite every planned frame
//! into one preallocated combined buffer, then hand that buffer to the
//! selected encoder back end. It is the single place where failures become
//! user-visible: either the full encoded GIF is returned, or a terminal
//! error - with cancellation surfacing as the distinct
//! [`GifpressError::Aborted`] state, never as a generic failure.
//!
//! # Example
//!
//! ```no_run
//! use gifpress::{Converter, Options, SourceInfo};
//!
//! let source = SourceInfo::probe("input.mp4")?;
//! let options = Options { framerate: 15.0, ..Options::for_source(&source) };
//!
//! let converter = Converter::new()?;
//! let gif_bytes = converter.run("input.mp4".as_ref(), &source, &options, &[])?;
//! std::fs::write("output.gif", &gif_bytes)?;
//! # Ok::<(), gifpress::GifpressError>(())
//! ```

use std::{path::Path, sync::Arc};

use crate::{
    buffer::CombinedBuffer,
    demux_grab::DemuxDecodeStrategy,
    engine::{SystemFfmpeg, TranscodeEngine},
    engine_encode,
    engine_grab::EngineGrabStrategy,
    error::GifpressError,
    frames::{self, FrameRequest, FrameStrategy},
    gif,
    options::Options,
    plan::{plan_time_range, resolve_output_size},
    probe::SourceInfo,
    progress::{CancellationToken, NoOpProgress, Phase, ProgressCallback, ProgressUpdate},
    seek_grab::SeekGrabStrategy,
    watermark::{Compositor, WatermarkConfig},
};

/// Which encoder consumes the combined buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderBackend {
    /// In-process palette encoder (`gif` crate). This is the default.
    #[default]
    DirectPixel,
    /// The external transcoding engine's palettegen/paletteuse graph.
    Engine,
}

/// Drives one conversion at a time from plan to encoded bytes.
///
/// Built once and reused across runs; the back end can be switched between
/// runs and no per-run state survives a completed, failed, or aborted run.
pub struct Converter {
    backend: EncoderBackend,
    engine: Arc<dyn TranscodeEngine>,
    progress: Arc<dyn ProgressCallback>,
    token: CancellationToken,
    strategies: Option<Vec<Box<dyn FrameStrategy>>>,
}

impl Converter {
    /// Create a converter over the system FFmpeg engine.
    ///
    /// # Errors
    ///
    /// Returns [`GifpressError::Io`] when the engine's private working
    /// directory cannot be created.
    pub fn new() -> Result<Self, GifpressError> {
        Ok(Self::with_engine(Arc::new(SystemFfmpeg::new()?)))
    }

    /// Create a converter over a custom engine implementation.
    pub fn with_engine(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            backend: EncoderBackend::default(),
            engine,
            progress: Arc::new(NoOpProgress),
            token: CancellationToken::new(),
            strategies: None,
        }
    }

    /// Select the encoder back end for subsequent runs.
    #[must_use]
    pub fn with_backend(mut self, backend: EncoderBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Attach a progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Attach a cancellation token shared with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Replace the frame-grab strategy chain.
    ///
    /// Strategies are tried in the given order with the standard fallback
    /// rules; primarily useful for tests and embedders with bespoke decode
    /// paths.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn FrameStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// The token cancelling this converter's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn report(&self, phase: Phase, label: &'static str, percent: Option<f32>) {
        let percent = percent.map(|value| value.clamp(0.0, 100.0));
        self.progress.on_progress(&ProgressUpdate {
            phase,
            label,
            percent,
        });
    }

    /// Convert `path` to an animated GIF.
    ///
    /// Runs the full pipeline: validation, timing plan, grab + composite
    /// into the combined buffer, then encode through the selected back end.
    ///
    /// # Errors
    ///
    /// - [`GifpressError::Validation`] for invalid options or geometry.
    /// - [`GifpressError::Aborted`] when the cancellation token flips;
    ///   bounded by one frame's processing latency.
    /// - [`GifpressError::ResourceExhausted`] when the combined buffer
    ///   cannot be allocated.
    /// - [`GifpressError::Decode`] when every grab strategy failed.
    /// - [`GifpressError::GifEncode`] / [`GifpressError::Engine`] for
    ///   encoder failures.
    pub fn run(
        &self,
        path: &Path,
        source: &SourceInfo,
        options: &Options,
        watermarks: &[WatermarkConfig],
    ) -> Result<Vec<u8>, GifpressError> {
        self.report(Phase::Preparing, "analyzing input", None);

        options.validate(source)?;
        let output_size = resolve_output_size(source, options)?;
        let plan = plan_time_range(options)?;
        let timestamps = plan.source_timestamps(options.speed);

        let watermark = select_watermark(options, watermarks);
        let mut compositor = Compositor::new(watermark, output_size.width, output_size.height);

        let mut combined = CombinedBuffer::allocate(
            compositor.output_width(),
            compositor.output_height(),
            plan.frame_count,
        )?;

        log::info!(
            "converting {}: {} frames at {}x{} ({} backend)",
            path.display(),
            plan.frame_count,
            compositor.output_width(),
            compositor.output_height(),
            match self.backend {
                EncoderBackend::DirectPixel => "direct",
                EncoderBackend::Engine => "engine",
            }
        );

        let request = FrameRequest {
            path,
            timestamps: &timestamps,
            width: output_size.width,
            height: output_size.height,
        };

        let produced = {
            let frame_count = plan.frame_count;
            let progress = &self.progress;
            let token = &self.token;
            let compositor = &mut compositor;
            let combined = &mut combined;

            let mut sink = |index: usize, frame: frames::GrabbedFrame| -> bool {
                compositor.composite_into(&frame.image, combined.frame_slice_mut(index));
                // The grabbed frame and its pixel buffer are released here.
                drop(frame);

                progress.on_progress(&ProgressUpdate {
                    phase: Phase::Grabbing,
                    label: "grabbing frames",
                    percent: Some((index + 1) as f32 / frame_count as f32 * 100.0),
                });

                !token.is_cancelled()
            };

            match &self.strategies {
                Some(custom) => {
                    let refs: Vec<&dyn FrameStrategy> =
                        custom.iter().map(Box::as_ref).collect();
                    frames::grab_frames(&refs, &request, &self.token, &mut sink)?
                }
                None => {
                    let demux = DemuxDecodeStrategy;
                    let seek = SeekGrabStrategy;
                    let engine = EngineGrabStrategy::new(self.engine.clone());
                    frames::grab_frames(
                        &[&demux, &seek, &engine],
                        &request,
                        &self.token,
                        &mut sink,
                    )?
                }
            }
        };

        if self.token.is_cancelled() {
            return Err(GifpressError::Aborted);
        }
        if produced == 0 {
            return Err(GifpressError::Decode {
                strategy: "none",
                reason: "no frames were produced".to_string(),
            });
        }
        combined.set_filled(produced);

        self.report(Phase::Encoding, "encoding", None);
        let bytes = match self.backend {
            EncoderBackend::DirectPixel => gif::encode_combined(
                &combined,
                &plan.duration_ms,
                options.max_colors,
                &self.token,
                &mut |percent| self.report(Phase::Encoding, "encoding", percent),
            )?,
            EncoderBackend::Engine => engine_encode::encode_with_engine(
                self.engine.as_ref(),
                &combined,
                &plan,
                options.max_colors,
                options.dither,
                &self.token,
                &mut |percent| self.report(Phase::Encoding, "encoding", percent),
            )?,
        };

        self.report(Phase::Finalizing, "done", Some(100.0));
        log::info!("conversion finished: {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// Resolve the watermark selected by `options.watermark_index`.
///
/// A negative or out-of-range index selects none; out-of-range is logged
/// rather than treated as an error, matching the "degrade, don't abort"
/// watermark policy.
fn select_watermark<'a>(
    options: &Options,
    watermarks: &'a [WatermarkConfig],
) -> Option<&'a WatermarkConfig> {
    if options.watermark_index < 0 {
        return None;
    }
    let index = options.watermark_index as usize;
    let selected = watermarks.get(index);
    if selected.is_none() {
        log::warn!(
            "watermark index {index} out of range ({} configured); none applied",
            watermarks.len()
        );
    }
    selected
}
