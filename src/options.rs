//! Conversion options.
//!
//! [`Options`] collects everything the user can tune for one conversion:
//! trim range, playback speed, output resolution, sampling frame rate,
//! palette size, dithering algorithm, and watermark selection. The struct is
//! owned and mutated by the caller (UI or CLI); the pipeline only reads it.
//!
//! # Example
//!
//! ```
//! use gifpress::{Dither, Options};
//!
//! let options = Options {
//!     start: 1.0,
//!     end: 4.0,
//!     framerate: 15.0,
//!     width: 480,
//!     ..Options::default()
//! };
//! assert_eq!(options.dither, Dither::Bayer);
//! ```

use serde::{Deserialize, Serialize};

use crate::{error::GifpressError, probe::SourceInfo};

/// Sentinel for [`Options::width`] / [`Options::height`] meaning "derive
/// this dimension from the source aspect ratio".
pub const DERIVE_DIMENSION: i32 = -1;

/// Dithering algorithm applied by the engine encoder's palette mapping.
///
/// Maps to the `paletteuse` filter's `dither` parameter. The direct pixel
/// encoder quantizes without dithering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dither {
    /// No dithering; hard nearest-palette-entry mapping.
    None,
    /// Ordered 8x8 bayer pattern. This is the default.
    #[default]
    Bayer,
    /// Floyd-Steinberg error diffusion.
    FloydSteinberg,
    /// Sierra-2 error diffusion.
    Sierra2,
    /// Sierra-2-4A ("filter lite") error diffusion.
    Sierra2_4a,
}

impl Dither {
    /// The value expected by the `paletteuse` filter.
    pub(crate) fn filter_value(self) -> &'static str {
        match self {
            Dither::None => "none",
            Dither::Bayer => "bayer",
            Dither::FloydSteinberg => "floyd_steinberg",
            Dither::Sierra2 => "sierra2",
            Dither::Sierra2_4a => "sierra2_4a",
        }
    }
}

/// User-tunable settings for one conversion run.
///
/// Invariants (checked by [`validate`](Options::validate)):
/// `0 <= start <= end <= duration`, `speed > 0`, `framerate > 0`,
/// `max_colors` in `2..=256`, and `width`/`height` each either positive or
/// the [`DERIVE_DIMENSION`] sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Trim start in the source, in seconds.
    pub start: f64,
    /// Trim end in the source, in seconds.
    pub end: f64,
    /// Playback speed factor; `2.0` halves the output duration.
    pub speed: f64,
    /// Output width in pixels, or [`DERIVE_DIMENSION`].
    pub width: i32,
    /// Output height in pixels, or [`DERIVE_DIMENSION`].
    pub height: i32,
    /// Output sampling rate in frames per second.
    pub framerate: f64,
    /// Maximum palette size for the encoded GIF (2..=256).
    pub max_colors: u16,
    /// Dithering algorithm for the engine encoder.
    pub dither: Dither,
    /// Index into the caller's watermark collection; `-1` selects none.
    pub watermark_index: i32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 0.0,
            speed: 1.0,
            width: DERIVE_DIMENSION,
            height: DERIVE_DIMENSION,
            framerate: 12.0,
            max_colors: 255,
            dither: Dither::default(),
            watermark_index: -1,
        }
    }
}

impl Options {
    /// Check every option invariant against the probed source.
    ///
    /// # Errors
    ///
    /// Returns [`GifpressError::Validation`] naming the first violated
    /// invariant. Validation failures are fatal and never retried.
    pub fn validate(&self, source: &SourceInfo) -> Result<(), GifpressError> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(GifpressError::Validation(format!(
                "start must be >= 0, got {}",
                self.start
            )));
        }
        if !self.end.is_finite() || self.end < self.start {
            return Err(GifpressError::Validation(format!(
                "end ({}) must be >= start ({})",
                self.end, self.start
            )));
        }
        if source.duration > 0.0 && self.end > source.duration + 1e-6 {
            return Err(GifpressError::Validation(format!(
                "end ({}) exceeds source duration ({})",
                self.end, source.duration
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(GifpressError::Validation(format!(
                "speed must be > 0, got {}",
                self.speed
            )));
        }
        if !(self.framerate.is_finite() && self.framerate > 0.0) {
            return Err(GifpressError::Validation(format!(
                "framerate must be > 0, got {}",
                self.framerate
            )));
        }
        if self.width != DERIVE_DIMENSION && self.width <= 0 {
            return Err(GifpressError::Validation(format!(
                "width must be positive or -1, got {}",
                self.width
            )));
        }
        if self.height != DERIVE_DIMENSION && self.height <= 0 {
            return Err(GifpressError::Validation(format!(
                "height must be positive or -1, got {}",
                self.height
            )));
        }
        if !(2..=256).contains(&self.max_colors) {
            return Err(GifpressError::Validation(format!(
                "max_colors must be within 2..=256, got {}",
                self.max_colors
            )));
        }
        Ok(())
    }

    /// Options spanning the whole source at default settings.
    ///
    /// Mirrors what a UI does when a new file is loaded: reset everything
    /// and set the trim end to the file duration.
    pub fn for_source(source: &SourceInfo) -> Self {
        Self {
            end: source.duration,
            ..Self::default()
        }
    }
}
