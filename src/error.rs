//! Error types for the `gifpress` crate.
//!
//! This module defines [`GifpressError`], the unified error type returned by
//! all fallible operations in the crate. Variants carry enough context to
//! diagnose a failure without extra logging at the call site: file paths,
//! strategy names, and upstream error messages.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `gifpress` operations.
///
/// Every public method that can fail returns `Result<T, GifpressError>`.
///
/// Two variants deserve special handling by callers:
///
/// - [`Aborted`](GifpressError::Aborted) is the terminal state of a
///   cooperatively cancelled run. It is **not** a failure and should not be
///   shown to the user as one.
/// - [`ResourceExhausted`](GifpressError::ResourceExhausted) means the
///   combined frame buffer could not be allocated; the message carries a
///   hint about which options to reduce.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GifpressError {
    /// The source file could not be opened or probed.
    #[error("Failed to open media file at {path}: {reason}")]
    Probe {
        /// Path that was passed to [`crate::SourceInfo::probe`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// Invalid geometry or timing inputs. Fatal; never retried.
    #[error("Invalid options: {0}")]
    Validation(String),

    /// A frame-grab strategy failed to decode. The fallback coordinator
    /// catches this and escalates to the next strategy; it is fatal only
    /// when no strategy remains.
    #[error("Frame grab failed ({strategy}): {reason}")]
    Decode {
        /// Name of the strategy that failed.
        strategy: &'static str,
        /// Underlying failure detail.
        reason: String,
    },

    /// The run was cancelled via a [`CancellationToken`](crate::CancellationToken).
    ///
    /// A distinct terminal state, not an error path: a stopped run must
    /// never be reported to the user as a failure.
    #[error("Conversion aborted")]
    Aborted,

    /// The combined frame buffer could not be allocated.
    #[error(
        "Out of memory: the conversion needs {needed_bytes} bytes of frame buffer; \
         try reducing the output width, height, frame rate, or clip duration"
    )]
    ResourceExhausted {
        /// Number of bytes the buffer would have required.
        needed_bytes: usize,
    },

    /// GIF encoding failed.
    #[error("GIF encoding error: {0}")]
    GifEncode(String),

    /// The external transcoding engine failed.
    #[error("Transcode engine error: {0}")]
    Engine(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during frame conversion.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for GifpressError {
    fn from(error: FfmpegError) -> Self {
        GifpressError::Ffmpeg(error.to_string())
    }
}
