//! Direct GIF encoding from the combined frame buffer.
//!
//! The in-process encoder back end: slices the combined buffer into
//! per-frame RGBA chunks, pairs each with its planned display duration, and
//! streams them into a palette-based GIF encoder writing to memory. Each
//! frame is quantized to at most the requested number of colors; when all
//! 256 colors are allowed, the `gif` crate's built-in quantizer fast path
//! is used.

use std::borrow::Cow;

use color_quant::NeuQuant;
use gif::{Encoder, Frame, Repeat};

use crate::{buffer::CombinedBuffer, error::GifpressError, progress::CancellationToken};

/// NeuQuant sampling factor; 10 balances quality against speed.
const QUANTIZER_SAMPLE_FACTOR: i32 = 10;

/// Encode the filled portion of `buffer` as an animated GIF, in memory.
///
/// `durations_ms[i]` is frame `i`'s display duration in milliseconds; GIF
/// stores delays in centiseconds, so durations are rounded to the nearest
/// 10 ms. The animation repeats forever.
///
/// # Errors
///
/// - [`GifpressError::Aborted`] when `token` flips mid-encode.
/// - [`GifpressError::GifEncode`] for encoder failures or frames larger
///   than the format's 65535-pixel dimension limit.
pub(crate) fn encode_combined(
    buffer: &CombinedBuffer,
    durations_ms: &[u64],
    max_colors: u16,
    token: &CancellationToken,
    on_progress: &mut dyn FnMut(Option<f32>),
) -> Result<Vec<u8>, GifpressError> {
    let frame_count = buffer.filled_frames();
    if frame_count == 0 {
        return Err(GifpressError::GifEncode("no frames to encode".to_string()));
    }

    let width = u16::try_from(buffer.width())
        .map_err(|_| GifpressError::GifEncode("frame width exceeds GIF limits".to_string()))?;
    let height = u16::try_from(buffer.height())
        .map_err(|_| GifpressError::GifEncode("frame height exceeds GIF limits".to_string()))?;

    log::debug!(
        "encoding {frame_count} frames ({width}x{height}, max {max_colors} colors) to GIF"
    );

    let mut output = Vec::new();
    {
        let mut encoder = Encoder::new(&mut output, width, height, &[])
            .map_err(|e| GifpressError::GifEncode(format!("failed to create encoder: {e}")))?;
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| GifpressError::GifEncode(format!("failed to set repeat: {e}")))?;

        for index in 0..frame_count {
            if token.is_cancelled() {
                return Err(GifpressError::Aborted);
            }

            let delay_cs = frame_delay_cs(durations_ms, index);
            let rgba = buffer.frame(index);

            let mut frame = if max_colors >= 256 {
                let mut pixels = rgba.to_vec();
                Frame::from_rgba_speed(width, height, &mut pixels, QUANTIZER_SAMPLE_FACTOR)
            } else {
                quantized_frame(rgba, width, height, max_colors)
            };
            frame.delay = delay_cs;

            encoder
                .write_frame(&frame)
                .map_err(|e| GifpressError::GifEncode(format!("failed to write frame: {e}")))?;

            on_progress(Some((index + 1) as f32 / frame_count as f32 * 100.0));
        }
    }

    Ok(output)
}

/// Quantize one RGBA frame to a palette of at most `max_colors` entries.
fn quantized_frame(rgba: &[u8], width: u16, height: u16, max_colors: u16) -> Frame<'static> {
    let quantizer = NeuQuant::new(QUANTIZER_SAMPLE_FACTOR, max_colors as usize, rgba);
    let palette = quantizer.color_map_rgb();
    let indices: Vec<u8> = rgba
        .chunks_exact(4)
        .map(|pixel| quantizer.index_of(pixel) as u8)
        .collect();

    let mut frame = Frame::default();
    frame.width = width;
    frame.height = height;
    frame.buffer = Cow::Owned(indices);
    frame.palette = Some(palette);
    frame
}

/// Display delay of frame `index` in centiseconds, rounded.
fn frame_delay_cs(durations_ms: &[u64], index: usize) -> u16 {
    let duration_ms = durations_ms.get(index).copied().unwrap_or(100);
    ((duration_ms + 5) / 10).min(u16::MAX as u64) as u16
}
