//! Timing-planner unit and property tests.

use gifpress::{GifpressError, Options, SourceInfo, plan_time_range, resolve_output_size};
use proptest::prelude::*;

fn source_1080p() -> SourceInfo {
    SourceInfo {
        width: 1920,
        height: 1080,
        duration: 60.0,
    }
}

fn options(start: f64, end: f64, speed: f64, framerate: f64) -> Options {
    Options {
        start,
        end,
        speed,
        framerate,
        ..Options::default()
    }
}

// ── Output size ────────────────────────────────────────────────────

#[test]
fn output_size_defaults_to_source() {
    let size = resolve_output_size(&source_1080p(), &Options::default()).unwrap();
    assert_eq!((size.width, size.height), (1920, 1080));
}

#[test]
fn output_size_derives_height_from_width() {
    let opts = Options {
        width: 960,
        ..Options::default()
    };
    let size = resolve_output_size(&source_1080p(), &opts).unwrap();
    assert_eq!((size.width, size.height), (960, 540));
}

#[test]
fn output_size_derives_width_from_height() {
    let opts = Options {
        height: 540,
        ..Options::default()
    };
    let size = resolve_output_size(&source_1080p(), &opts).unwrap();
    assert_eq!((size.width, size.height), (960, 540));
}

#[test]
fn output_size_takes_both_dimensions_verbatim() {
    let opts = Options {
        width: 123,
        height: 77,
        ..Options::default()
    };
    let size = resolve_output_size(&source_1080p(), &opts).unwrap();
    assert_eq!((size.width, size.height), (123, 77));
}

#[test]
fn output_size_floors_derived_dimensions() {
    // 1080 * (100 / 1920) = 56.25 -> 56
    let opts = Options {
        width: 100,
        ..Options::default()
    };
    let size = resolve_output_size(&source_1080p(), &opts).unwrap();
    assert_eq!((size.width, size.height), (100, 56));
}

#[test]
fn output_size_rejects_degenerate_geometry() {
    // A 1-pixel-wide request against a very wide source floors height to 0.
    let source = SourceInfo {
        width: 4000,
        height: 100,
        duration: 1.0,
    };
    let opts = Options {
        width: 10,
        ..Options::default()
    };
    let result = resolve_output_size(&source, &opts);
    assert!(matches!(result, Err(GifpressError::Validation(_))));
}

// ── Time plan ──────────────────────────────────────────────────────

#[test]
fn frame_count_follows_ceil_formula() {
    let plan = plan_time_range(&options(0.0, 2.5, 1.0, 12.0)).unwrap();
    assert_eq!(plan.frame_count, 30);

    let plan = plan_time_range(&options(0.0, 2.51, 1.0, 12.0)).unwrap();
    assert_eq!(plan.frame_count, ((2.51f64 * 12.0).ceil()) as usize);
}

#[test]
fn frame_count_clamps_to_one() {
    let plan = plan_time_range(&options(3.0, 3.0, 1.0, 12.0)).unwrap();
    assert_eq!(plan.frame_count, 1);
    assert_eq!(plan.present_time_ms, vec![0]);
    assert_eq!(plan.duration_ms, vec![0]);
}

#[test]
fn durations_sum_without_drift() {
    let plan = plan_time_range(&options(0.3, 7.77, 1.5, 13.0)).unwrap();
    let sum: u64 = plan.duration_ms.iter().sum();
    assert_eq!(sum, plan.total_ms());
}

#[test]
fn speed_divides_duration() {
    let plan = plan_time_range(&options(0.0, 10.0, 2.0, 10.0)).unwrap();
    assert!((plan.duration - 5.0).abs() < 1e-9);
    assert_eq!(plan.frame_count, 50);
}

#[test]
fn source_timestamps_map_back_through_speed() {
    let plan = plan_time_range(&options(4.0, 8.0, 2.0, 10.0)).unwrap();
    let timestamps = plan.source_timestamps(2.0);

    assert_eq!(timestamps.len(), plan.frame_count);
    assert!((timestamps[0] - 4.0).abs() < 1e-9);
    // Ascending and bounded by the trim range.
    for pair in timestamps.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    assert!(*timestamps.last().unwrap() <= 8.0 + 1e-6);
}

#[test]
fn planner_is_deterministic() {
    let opts = options(1.2, 9.7, 1.3, 24.0);
    let first = plan_time_range(&opts).unwrap();
    let second = plan_time_range(&opts).unwrap();
    assert_eq!(first, second);

    let size_a = resolve_output_size(&source_1080p(), &opts).unwrap();
    let size_b = resolve_output_size(&source_1080p(), &opts).unwrap();
    assert_eq!(size_a, size_b);
}

#[test]
fn planner_rejects_bad_inputs() {
    assert!(matches!(
        plan_time_range(&options(5.0, 1.0, 1.0, 12.0)),
        Err(GifpressError::Validation(_))
    ));
    assert!(matches!(
        plan_time_range(&options(0.0, 1.0, 0.0, 12.0)),
        Err(GifpressError::Validation(_))
    ));
    assert!(matches!(
        plan_time_range(&options(0.0, 1.0, 1.0, -3.0)),
        Err(GifpressError::Validation(_))
    ));
}

// ── Property sweep ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn plan_arithmetic_holds_for_all_valid_options(
        start in 0.0f64..30.0,
        span in 0.01f64..30.0,
        speed in 0.1f64..8.0,
        framerate in 1.0f64..60.0,
    ) {
        let opts = options(start, start + span, speed, framerate);
        let plan = plan_time_range(&opts).unwrap();

        // Recompute with the same float expression the planner uses.
        let duration = (opts.end - opts.start) / speed;
        prop_assert_eq!(plan.frame_count, ((duration * framerate).ceil() as usize).max(1));

        let sum: u64 = plan.duration_ms.iter().sum();
        prop_assert_eq!(sum, (duration * 1000.0).round() as u64);

        // Presentation times never decrease.
        for pair in plan.present_time_ms.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
    }
}
