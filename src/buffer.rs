//! The combined frame buffer.
//!
//! One contiguous RGBA byte buffer holding every composited output frame,
//! preallocated before grabbing starts so the per-frame loop never
//! reallocates. On early termination the buffer is logically truncated to
//! the frames actually written - the allocation itself is never resized.

use crate::error::GifpressError;

/// A preallocated `width * height * 4 * planned_frames` byte buffer.
///
/// Frame `i`'s RGBA bytes live at offset `i * frame_bytes()`. The number of
/// frames visible downstream is controlled by
/// [`set_filled`](CombinedBuffer::set_filled).
pub struct CombinedBuffer {
    width: u32,
    height: u32,
    frame_bytes: usize,
    planned_frames: usize,
    filled_frames: usize,
    bytes: Vec<u8>,
}

impl CombinedBuffer {
    /// Allocate a buffer for `planned_frames` frames of `width x height`.
    ///
    /// # Errors
    ///
    /// Returns [`GifpressError::ResourceExhausted`] when the allocation
    /// fails; the error message tells the user which options to reduce.
    pub fn allocate(
        width: u32,
        height: u32,
        planned_frames: usize,
    ) -> Result<Self, GifpressError> {
        let frame_bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(GifpressError::ResourceExhausted {
                needed_bytes: usize::MAX,
            })?;
        let total = frame_bytes
            .checked_mul(planned_frames)
            .ok_or(GifpressError::ResourceExhausted {
                needed_bytes: usize::MAX,
            })?;

        log::debug!(
            "allocating combined buffer: {planned_frames} frames x {frame_bytes} bytes = {total} bytes"
        );

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(total)
            .map_err(|_| GifpressError::ResourceExhausted { needed_bytes: total })?;
        bytes.resize(total, 0);

        Ok(Self {
            width,
            height,
            frame_bytes,
            planned_frames,
            filled_frames: 0,
            bytes,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per frame (`width * height * 4`).
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Number of frames the buffer was allocated for.
    pub fn planned_frames(&self) -> usize {
        self.planned_frames
    }

    /// Number of frames written so far.
    pub fn filled_frames(&self) -> usize {
        self.filled_frames
    }

    /// Mutable slice for frame `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the planned frame count.
    pub fn frame_slice_mut(&mut self, index: usize) -> &mut [u8] {
        assert!(index < self.planned_frames);
        let start = index * self.frame_bytes;
        &mut self.bytes[start..start + self.frame_bytes]
    }

    /// Immutable slice of frame `index` (must be within the filled count).
    pub fn frame(&self, index: usize) -> &[u8] {
        assert!(index < self.filled_frames);
        let start = index * self.frame_bytes;
        &self.bytes[start..start + self.frame_bytes]
    }

    /// Logically truncate (or extend, up to the planned count) the number
    /// of frames visible downstream. The allocation is untouched.
    pub fn set_filled(&mut self, frames: usize) {
        self.filled_frames = frames.min(self.planned_frames);
    }

    /// The filled portion of the buffer as one contiguous byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.filled_frames * self.frame_bytes]
    }
}
