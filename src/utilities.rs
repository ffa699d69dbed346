//! Internal utility functions.
//!
//! Helpers for pixel-data copying and timestamp conversion shared by the
//! decode strategies.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy pixel data from an FFmpeg video frame into a tightly-packed RGBA
/// buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width * 4).
/// This strips the padding so the result can be passed directly to
/// [`image::RgbaImage::from_raw`].
pub(crate) fn frame_to_rgba_buffer(frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_bytes = (width as usize) * 4;
    let data = frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Convert seconds to a timestamp in the stream's time base, suitable for
/// FFmpeg seeking functions.
pub(crate) fn seconds_to_stream_timestamp(seconds: f64, time_base: Rational) -> i64 {
    let numerator = time_base.numerator() as f64;
    let denominator = time_base.denominator() as f64;
    (seconds * denominator / numerator) as i64
}

/// Rescale a PTS value from the stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}
