//! Source-file probing.
//!
//! [`SourceInfo`] is read once when a file is loaded and stays immutable
//! until a new file replaces it. Probing opens the container, locates the
//! best video stream, and reports the upright dimensions - the display
//! matrix carried by portrait phone recordings is applied here, so a
//! 1080x1920 portrait clip probes as 1080 wide even when its coded frames
//! are stored rotated.
//!
//! # Example
//!
//! ```no_run
//! use gifpress::SourceInfo;
//!
//! let info = SourceInfo::probe("input.mp4")?;
//! println!("{}x{}, {:.2}s", info.width, info.height, info.duration);
//! # Ok::<(), gifpress::GifpressError>(())
//! ```

use std::path::Path;

use ffmpeg_next::{
    codec::context::Context as CodecContext, codec::packet::side_data::Type as SideDataType,
    media::Type as MediaType,
};

use crate::error::GifpressError;

/// Fixed-point scale of display-matrix rotation coefficients (16.16).
const MATRIX_FIXED_ONE: f64 = 65536.0;

/// Basic facts about a video source, probed once per file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    /// Upright width in pixels.
    pub width: u32,
    /// Upright height in pixels.
    pub height: u32,
    /// Container duration in seconds.
    pub duration: f64,
}

impl SourceInfo {
    /// Probe a media file.
    ///
    /// # Errors
    ///
    /// - [`GifpressError::Probe`] if the file cannot be opened.
    /// - [`GifpressError::NoVideoStream`] if it has no video stream.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self, GifpressError> {
        let path = path.as_ref();
        log::debug!("Probing media file: {}", path.display());

        ffmpeg_next::init().map_err(|error| GifpressError::Probe {
            path: path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| GifpressError::Probe {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(MediaType::Video)
            .ok_or(GifpressError::NoVideoStream)?;

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| GifpressError::Probe {
                path: path.to_path_buf(),
                reason: format!("failed to read video codec parameters: {error}"),
            })?;

        let coded_width = decoder.width();
        let coded_height = decoder.height();

        let orientation = stream_orientation(&stream);
        let (width, height) = orientation.apply_to_dimensions(coded_width, coded_height);

        let duration_microseconds = input.duration();
        let duration = if duration_microseconds > 0 {
            duration_microseconds as f64 / 1_000_000.0
        } else {
            // Some containers only carry a per-stream duration.
            let time_base = stream.time_base();
            let stream_duration = stream.duration();
            if stream_duration > 0 && time_base.denominator() != 0 {
                stream_duration as f64 * time_base.numerator() as f64
                    / time_base.denominator() as f64
            } else {
                0.0
            }
        };

        Ok(Self {
            width,
            height,
            duration,
        })
    }
}

/// Quarter-turn orientation derived from a stream's display matrix.
///
/// The matrix encodes the transform a player applies to obtain the visually
/// upright frame; anything that is not a quarter turn is treated as
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Orientation {
    /// No transform required.
    #[default]
    Identity,
    /// Rotate 90 degrees clockwise.
    Rotate90,
    /// Rotate 180 degrees.
    Rotate180,
    /// Rotate 270 degrees clockwise.
    Rotate270,
}

impl Orientation {
    /// The upright dimensions of a coded frame under this orientation.
    pub(crate) fn apply_to_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Identity | Orientation::Rotate180 => (width, height),
            Orientation::Rotate90 | Orientation::Rotate270 => (height, width),
        }
    }

    pub(crate) fn is_identity(self) -> bool {
        self == Orientation::Identity
    }
}

/// Read the display-matrix side data of a stream, if any.
pub(crate) fn stream_orientation(stream: &ffmpeg_next::format::stream::Stream) -> Orientation {
    for side_data in stream.side_data() {
        if side_data.kind() == SideDataType::DisplayMatrix {
            return orientation_from_matrix(side_data.data());
        }
    }
    Orientation::Identity
}

/// Decode a raw 3x3 display matrix (nine native-endian `i32` values in
/// 16.16 fixed point) into a quarter-turn orientation.
fn orientation_from_matrix(data: &[u8]) -> Orientation {
    if data.len() < 9 * 4 {
        return Orientation::Identity;
    }

    let coefficient = |index: usize| -> f64 {
        let offset = index * 4;
        let bytes: [u8; 4] = match data[offset..offset + 4].try_into() {
            Ok(bytes) => bytes,
            Err(_) => return 0.0,
        };
        i32::from_ne_bytes(bytes) as f64 / MATRIX_FIXED_ONE
    };

    let a = coefficient(0);
    let b = coefficient(1);

    // Angle by which the stored frame must be rotated clockwise to display
    // upright, snapped to the nearest quarter turn.
    let degrees = (-b.atan2(a)).to_degrees();
    let quarter = (degrees / 90.0).round() as i64;

    match quarter.rem_euclid(4) {
        1 => Orientation::Rotate90,
        2 => Orientation::Rotate180,
        3 => Orientation::Rotate270,
        _ => Orientation::Identity,
    }
}
