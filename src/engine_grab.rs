//! Strategy 3: engine raw-pixel export.
//!
//! The last-resort decoder. The whole input file is handed to the external
//! transcoding engine, which is asked to emit one raw RGBA frame file per
//! required sample at the computed sampling rate into its private
//! namespace. The frame files are then consumed in an incrementing loop -
//! each one read, converted, reported through the callback, and deleted
//! engine-side - with cancellation checked per file. Cancelling while the
//! engine command runs aborts the command itself.
//!
//! This strategy shares its "feed pixels through the engine" primitive with
//! the engine encoder back end; only the direction differs.

use std::sync::Arc;

use image::RgbaImage;

use crate::{
    engine::TranscodeEngine,
    error::GifpressError,
    frames::{FrameRequest, FrameSink, FrameStrategy, GrabbedFrame},
    progress::CancellationToken,
};

const STRATEGY_NAME: &str = "engine-grab";

/// Engine-backed frame grabbing (strategy 3).
pub struct EngineGrabStrategy {
    engine: Arc<dyn TranscodeEngine>,
}

fn decode_error(reason: impl ToString) -> GifpressError {
    GifpressError::Decode {
        strategy: STRATEGY_NAME,
        reason: reason.to_string(),
    }
}

fn frame_file_name(index: usize) -> String {
    format!("frame_{:05}.raw", index + 1)
}

impl EngineGrabStrategy {
    /// Create the strategy over a shared engine.
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self { engine }
    }

    /// Delete every engine-side file this strategy may have created.
    fn cleanup(&self, input_name: &str, frame_count: usize) {
        let _ = self.engine.delete_file(input_name);
        for index in 0..frame_count {
            let _ = self.engine.delete_file(&frame_file_name(index));
        }
    }
}

impl FrameStrategy for EngineGrabStrategy {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn grab(
        &self,
        request: &FrameRequest<'_>,
        token: &CancellationToken,
        sink: &mut FrameSink<'_>,
    ) -> Result<usize, GifpressError> {
        let timestamps = request.timestamps;
        let frame_count = timestamps.len();

        let extension = request
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let input_name = format!("input.{extension}");

        let bytes = std::fs::read(request.path).map_err(decode_error)?;
        self.engine.write_file(&input_name, &bytes)?;
        drop(bytes);

        let first = timestamps[0];
        let last = timestamps[frame_count - 1];
        // Planned timestamps are evenly spaced; the export rate is the
        // inverse of their spacing.
        let rate = if frame_count > 1 && last > first {
            (frame_count - 1) as f64 / (last - first)
        } else {
            1.0
        };

        let args: Vec<String> = [
            "-i",
            &input_name,
            "-ss",
            &format!("{first:.6}"),
            "-vf",
            &format!(
                "fps={rate:.6},scale={}:{}",
                request.width, request.height
            ),
            "-f",
            "image2",
            "-vcodec",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-frames:v",
            &frame_count.to_string(),
            "-y",
            "frame_%05d.raw",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let exec_result = self.engine.exec(args.as_slice(), token, &mut |event| {
            log::trace!(
                "engine grab progress: {:.3} after {:?}",
                event.fraction_complete,
                event.elapsed
            );
        });
        if let Err(error) = exec_result {
            self.cleanup(&input_name, frame_count);
            return Err(match error {
                GifpressError::Aborted => GifpressError::Aborted,
                other => decode_error(other),
            });
        }

        let frame_bytes = request.width as usize * request.height as usize * 4;
        let mut produced = 0usize;

        for index in 0..frame_count {
            if token.is_cancelled() {
                self.cleanup(&input_name, frame_count);
                return Err(GifpressError::Aborted);
            }

            let name = frame_file_name(index);
            let pixels = match self.engine.read_file(&name) {
                Ok(pixels) => pixels,
                Err(error) => {
                    // The engine produced fewer frames than requested;
                    // report what exists.
                    log::debug!("engine frame {name} unavailable: {error}");
                    break;
                }
            };
            let _ = self.engine.delete_file(&name);

            if pixels.len() != frame_bytes {
                self.cleanup(&input_name, frame_count);
                return Err(decode_error(format!(
                    "engine frame {name} has {} bytes, expected {frame_bytes}",
                    pixels.len()
                )));
            }

            let image = RgbaImage::from_raw(request.width, request.height, pixels)
                .ok_or_else(|| decode_error("failed to build RGBA image from engine frame"))?;

            let index_to_emit = produced;
            produced += 1;

            let keep_going = sink(
                index_to_emit,
                GrabbedFrame {
                    image,
                    timestamp: timestamps[index_to_emit],
                },
            );
            if !keep_going {
                break;
            }
        }

        self.cleanup(&input_name, frame_count);

        if produced == 0 {
            return Err(decode_error("engine produced no frames"));
        }

        Ok(produced)
    }
}
