//! The frame source: strategy contract and fallback coordinator.
//!
//! A frame-grab strategy receives a sorted list of source timestamps and a
//! target raster size, and produces exactly one RGBA frame per timestamp,
//! in order, through a callback. The callback returns a `bool` "continue?"
//! signal: `false` stops production within one frame and is **not** an
//! error.
//!
//! Three strategies are tried in a fixed order, each only after the
//! previous one failed: container demux + decode
//! ([`DemuxDecodeStrategy`](crate::demux_grab::DemuxDecodeStrategy)),
//! sequential seek-and-capture
//! ([`SeekGrabStrategy`](crate::seek_grab::SeekGrabStrategy)), and the
//! external engine's raw-pixel export
//! ([`EngineGrabStrategy`](crate::engine_grab::EngineGrabStrategy)).
//! Failures fall through silently (logged with the strategy name);
//! cancellation never does.

use std::path::Path;

use image::RgbaImage;

use crate::{error::GifpressError, progress::CancellationToken};

/// One decoded, resized frame handed to the compositor.
///
/// Ephemeral: owned by the strategy until the sink callback returns, then
/// dropped together with its backing pixel buffer.
pub struct GrabbedFrame {
    /// The frame pixels at the requested raster size.
    pub image: RgbaImage,
    /// The source timestamp this frame was decoded at, in seconds.
    pub timestamp: f64,
}

/// What a strategy is asked to produce.
pub struct FrameRequest<'a> {
    /// The source media file.
    pub path: &'a Path,
    /// Source timestamps to sample, seconds, sorted ascending.
    pub timestamps: &'a [f64],
    /// Target raster width.
    pub width: u32,
    /// Target raster height.
    pub height: u32,
}

/// Per-frame callback. Receives the zero-based output frame index and the
/// frame itself; returns `false` to stop grabbing.
///
/// Strategies always start over from index 0, so a partial attempt by a
/// failed strategy is simply overwritten by the next one.
pub type FrameSink<'a> = dyn FnMut(usize, GrabbedFrame) -> bool + 'a;

/// A frame-grab strategy.
///
/// All strategies share one contract so the coordinator can try them
/// interchangeably. A strategy must:
///
/// - produce frames strictly in timestamp order, indexed from 0;
/// - poll `token` at least once per produced frame and return
///   [`GifpressError::Aborted`] promptly when it flips;
/// - stop (returning `Ok` with the count so far) when the sink returns
///   `false`;
/// - release every decoder/file handle it opened on all exit paths, and
///   never leave state behind that could corrupt a later strategy.
pub trait FrameStrategy {
    /// Short name used in logs and error context.
    fn name(&self) -> &'static str;

    /// Grab frames for `request`, reporting each through `sink`.
    ///
    /// Returns the number of frames produced.
    fn grab(
        &self,
        request: &FrameRequest<'_>,
        token: &CancellationToken,
        sink: &mut FrameSink<'_>,
    ) -> Result<usize, GifpressError>;
}

/// Try each strategy in order until one succeeds.
///
/// A strategy failure is reported (strategy name plus error detail) and the
/// next strategy is tried with untouched inputs; the last failure is
/// returned when no strategy remains. [`GifpressError::Aborted`] is a
/// terminal state, never a fallback trigger.
pub fn grab_frames(
    strategies: &[&dyn FrameStrategy],
    request: &FrameRequest<'_>,
    token: &CancellationToken,
    sink: &mut FrameSink<'_>,
) -> Result<usize, GifpressError> {
    if request.timestamps.is_empty() {
        return Err(GifpressError::Validation(
            "no timestamps to grab".to_string(),
        ));
    }
    debug_assert!(
        request
            .timestamps
            .windows(2)
            .all(|pair| pair[0] <= pair[1]),
        "timestamps must be sorted ascending"
    );

    let mut last_error: Option<GifpressError> = None;

    for strategy in strategies {
        if token.is_cancelled() {
            return Err(GifpressError::Aborted);
        }

        log::debug!(
            "grabbing {} frames at {}x{} via {}",
            request.timestamps.len(),
            request.width,
            request.height,
            strategy.name()
        );

        match strategy.grab(request, token, sink) {
            Ok(produced) => return Ok(produced),
            Err(GifpressError::Aborted) => return Err(GifpressError::Aborted),
            Err(error) => {
                log::warn!("strategy {} failed: {error}", strategy.name());
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GifpressError::Decode {
        strategy: "none",
        reason: "no frame-grab strategy available".to_string(),
    }))
}
