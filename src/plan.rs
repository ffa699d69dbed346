//! The timing planner.
//!
//! Pure, deterministic derivations from [`SourceInfo`] and [`Options`]:
//! the output raster size and the per-frame timestamp/duration plan. No
//! I/O, no side effects - calling either function twice with identical
//! inputs yields bit-identical results, so callers may cache freely.
//!
//! The duration arithmetic is done in integral milliseconds so the sum of
//! all per-frame durations equals the rounded total duration exactly, with
//! no accumulated drift.

use crate::{
    error::GifpressError,
    options::{DERIVE_DIMENSION, Options},
    probe::SourceInfo,
};

/// Derived output raster size; both dimensions positive, floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSize {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

/// The per-frame sampling and display plan for one run.
///
/// Produced by [`plan_time_range`]; never mutated in place - option or
/// source changes require recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePlan {
    /// Trim start in the source, seconds.
    pub source_start: f64,
    /// Trim end in the source, seconds.
    pub source_end: f64,
    /// Output duration in seconds: `(source_end - source_start) / speed`.
    pub duration: f64,
    /// Number of output frames: `ceil(duration * framerate)`, at least 1.
    pub frame_count: usize,
    /// Presentation time of each output frame, milliseconds from start.
    pub present_time_ms: Vec<u64>,
    /// Display duration of each output frame, milliseconds. Sums to
    /// `round(duration * 1000)` exactly.
    pub duration_ms: Vec<u64>,
}

impl TimePlan {
    /// The source timestamp (seconds) to sample for each output frame.
    ///
    /// Maps each presentation time back through the speed factor; the
    /// result is sorted ascending.
    pub fn source_timestamps(&self, speed: f64) -> Vec<f64> {
        self.present_time_ms
            .iter()
            .map(|&ms| self.source_start + ms as f64 / 1000.0 * speed)
            .collect()
    }

    /// Total output duration in integral milliseconds.
    pub fn total_ms(&self) -> u64 {
        (self.duration * 1000.0).round() as u64
    }
}

/// Resolve the output raster size from the source size and the requested
/// dimensions.
///
/// Both dimensions `-1`: source size. Exactly one `-1`: the other is scaled
/// to preserve the source aspect ratio. Otherwise both are taken verbatim.
/// Results are floored.
///
/// # Errors
///
/// Returns [`GifpressError::Validation`] when a dimension resolves to zero
/// or below - invalid geometry is surfaced, never silently clamped.
///
/// # Example
///
/// ```
/// use gifpress::{Options, SourceInfo, resolve_output_size};
///
/// let source = SourceInfo { width: 1920, height: 1080, duration: 10.0 };
/// let options = Options { width: 960, ..Options::for_source(&source) };
/// let size = resolve_output_size(&source, &options)?;
/// assert_eq!((size.width, size.height), (960, 540));
/// # Ok::<(), gifpress::GifpressError>(())
/// ```
pub fn resolve_output_size(
    source: &SourceInfo,
    options: &Options,
) -> Result<OutputSize, GifpressError> {
    let source_width = source.width as f64;
    let source_height = source.height as f64;

    let (width, height) = match (options.width, options.height) {
        (DERIVE_DIMENSION, DERIVE_DIMENSION) => (source_width, source_height),
        (DERIVE_DIMENSION, requested_height) => {
            let height = requested_height as f64;
            (source_width * (height / source_height), height)
        }
        (requested_width, DERIVE_DIMENSION) => {
            let width = requested_width as f64;
            (width, source_height * (width / source_width))
        }
        (requested_width, requested_height) => (requested_width as f64, requested_height as f64),
    };

    let width = width.floor();
    let height = height.floor();

    if !(width >= 1.0 && height >= 1.0 && width.is_finite() && height.is_finite()) {
        return Err(GifpressError::Validation(format!(
            "output size resolves to {width}x{height}; both dimensions must be positive"
        )));
    }

    Ok(OutputSize {
        width: width as u32,
        height: height as u32,
    })
}

/// Compute the per-frame timestamp and duration plan.
///
/// `frame_count = ceil(duration * framerate)` clamped to at least 1;
/// `present_time_ms[i] = round(i / frame_count * duration * 1000)`; each
/// frame's duration is the gap to the next presentation time, and the last
/// frame absorbs the remainder so the durations sum to the rounded total
/// with no drift.
///
/// # Errors
///
/// Returns [`GifpressError::Validation`] for a non-positive speed or
/// framerate, or a reversed trim range.
pub fn plan_time_range(options: &Options) -> Result<TimePlan, GifpressError> {
    if !(options.speed.is_finite() && options.speed > 0.0) {
        return Err(GifpressError::Validation(format!(
            "speed must be > 0, got {}",
            options.speed
        )));
    }
    if !(options.framerate.is_finite() && options.framerate > 0.0) {
        return Err(GifpressError::Validation(format!(
            "framerate must be > 0, got {}",
            options.framerate
        )));
    }
    if options.end < options.start {
        return Err(GifpressError::Validation(format!(
            "end ({}) must be >= start ({})",
            options.end, options.start
        )));
    }

    let duration = (options.end - options.start) / options.speed;
    let frame_count = ((duration * options.framerate).ceil() as usize).max(1);
    let total_ms = (duration * 1000.0).round() as u64;

    let present_time_ms: Vec<u64> = (0..frame_count)
        .map(|index| (index as f64 / frame_count as f64 * duration * 1000.0).round() as u64)
        .collect();

    let duration_ms: Vec<u64> = present_time_ms
        .iter()
        .enumerate()
        .map(|(index, &present)| {
            if index + 1 < frame_count {
                present_time_ms[index + 1] - present
            } else {
                total_ms - present
            }
        })
        .collect();

    Ok(TimePlan {
        source_start: options.start,
        source_end: options.end,
        duration,
        frame_count,
        present_time_ms,
        duration_ms,
    })
}
