//! Fallback-coordinator and full-pipeline tests over scripted strategies.

use std::path::Path;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use gifpress::{
    CancellationToken, Converter, FrameRequest, FrameStrategy, GifpressError, GrabbedFrame,
    Options, Phase, ProgressCallback, ProgressUpdate, SourceInfo, grab_frames, plan_time_range,
};
use image::{Rgba, RgbaImage};

/// A scripted strategy: either fails immediately or emits one solid-color
/// frame per requested timestamp.
struct FakeStrategy {
    label: &'static str,
    fail: bool,
    abort: bool,
    color: [u8; 4],
    attempts: AtomicUsize,
    emitted: AtomicUsize,
}

impl FakeStrategy {
    fn succeeding(label: &'static str, color: [u8; 4]) -> Self {
        Self {
            label,
            fail: false,
            abort: false,
            color,
            attempts: AtomicUsize::new(0),
            emitted: AtomicUsize::new(0),
        }
    }

    fn failing(label: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::succeeding(label, [0; 4])
        }
    }

    fn aborting(label: &'static str) -> Self {
        Self {
            abort: true,
            ..Self::succeeding(label, [0; 4])
        }
    }
}

impl FrameStrategy for FakeStrategy {
    fn name(&self) -> &'static str {
        self.label
    }

    fn grab(
        &self,
        request: &FrameRequest<'_>,
        token: &CancellationToken,
        sink: &mut gifpress::FrameSink<'_>,
    ) -> Result<usize, GifpressError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.abort {
            return Err(GifpressError::Aborted);
        }
        if self.fail {
            return Err(GifpressError::Decode {
                strategy: self.label,
                reason: "scripted failure".to_string(),
            });
        }

        let mut produced = 0;
        for (index, &timestamp) in request.timestamps.iter().enumerate() {
            if token.is_cancelled() {
                return Err(GifpressError::Aborted);
            }

            let image =
                RgbaImage::from_pixel(request.width, request.height, Rgba(self.color));
            produced = index + 1;
            self.emitted.fetch_add(1, Ordering::SeqCst);

            if !sink(index, GrabbedFrame { image, timestamp }) {
                break;
            }
        }
        Ok(produced)
    }
}

fn request<'a>(timestamps: &'a [f64]) -> FrameRequest<'a> {
    FrameRequest {
        path: Path::new("unused.mp4"),
        timestamps,
        width: 16,
        height: 12,
    }
}

// ── Coordinator behaviour ──────────────────────────────────────────

#[test]
fn first_strategy_failure_falls_back_to_second() {
    let broken = FakeStrategy::failing("broken");
    let working = FakeStrategy::succeeding("working", [1, 2, 3, 255]);
    let timestamps = [0.0, 0.1, 0.2, 0.3, 0.4];

    let token = CancellationToken::new();
    let mut seen: Vec<(usize, f64)> = Vec::new();
    let produced = grab_frames(
        &[&broken, &working],
        &request(&timestamps),
        &token,
        &mut |index, frame| {
            seen.push((index, frame.timestamp));
            true
        },
    )
    .unwrap();

    assert_eq!(produced, timestamps.len());
    assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(working.attempts.load(Ordering::SeqCst), 1);

    // Every planned frame arrived, in order, within one frame interval of
    // its planned timestamp.
    let frame_interval = 0.1;
    for (position, (index, timestamp)) in seen.iter().enumerate() {
        assert_eq!(position, *index);
        assert!((timestamp - timestamps[*index]).abs() <= frame_interval);
    }
}

#[test]
fn all_strategies_failing_surfaces_last_error() {
    let first = FakeStrategy::failing("first");
    let second = FakeStrategy::failing("second");
    let timestamps = [0.0, 0.5];

    let token = CancellationToken::new();
    let result = grab_frames(
        &[&first, &second],
        &request(&timestamps),
        &token,
        &mut |_, _| true,
    );

    match result {
        Err(GifpressError::Decode { strategy, .. }) => assert_eq!(strategy, "second"),
        other => panic!("expected Decode error, got {other:?}"),
    }
}

#[test]
fn abort_is_terminal_and_never_triggers_fallback() {
    let aborting = FakeStrategy::aborting("aborting");
    let fallback = FakeStrategy::succeeding("fallback", [9, 9, 9, 255]);
    let timestamps = [0.0, 0.5];

    let token = CancellationToken::new();
    let result = grab_frames(
        &[&aborting, &fallback],
        &request(&timestamps),
        &token,
        &mut |_, _| true,
    );

    assert!(matches!(result, Err(GifpressError::Aborted)));
    assert_eq!(fallback.attempts.load(Ordering::SeqCst), 0);
}

#[test]
fn sink_stop_halts_within_one_frame_without_error() {
    let strategy = FakeStrategy::succeeding("working", [7, 7, 7, 255]);
    let timestamps = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];

    let token = CancellationToken::new();
    let mut delivered = 0usize;
    let produced = grab_frames(
        &[&strategy],
        &request(&timestamps),
        &token,
        &mut |_, _| {
            delivered += 1;
            delivered < 3
        },
    )
    .unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(produced, 3);
    assert_eq!(strategy.emitted.load(Ordering::SeqCst), 3);
}

// ── Full pipeline over the direct encoder ──────────────────────────

fn test_source() -> SourceInfo {
    SourceInfo {
        width: 32,
        height: 24,
        duration: 2.0,
    }
}

#[test]
fn pipeline_encodes_every_planned_frame_with_planned_delays() {
    let source = test_source();
    let options = Options {
        end: 1.0,
        framerate: 5.0,
        ..Options::for_source(&source)
    };
    let plan = plan_time_range(&options).unwrap();

    let converter = Converter::new()
        .unwrap()
        .with_strategies(vec![Box::new(FakeStrategy::succeeding(
            "scripted",
            [120, 40, 200, 255],
        ))]);

    let bytes = converter
        .run(Path::new("unused.mp4"), &source, &options, &[])
        .unwrap();

    let mut decode_options = gif::DecodeOptions::new();
    decode_options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = decode_options
        .read_info(std::io::Cursor::new(bytes))
        .unwrap();
    assert_eq!(u32::from(decoder.width()), 32);
    assert_eq!(u32::from(decoder.height()), 24);

    let mut frames = 0usize;
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        // 1 s over 5 frames = 200 ms each = 20 cs.
        assert_eq!(frame.delay, 20);
        frames += 1;
    }
    assert_eq!(frames, plan.frame_count);
}

#[test]
fn pipeline_survives_first_strategy_failure() {
    let source = test_source();
    let options = Options {
        end: 0.6,
        framerate: 5.0,
        ..Options::for_source(&source)
    };

    let converter = Converter::new().unwrap().with_strategies(vec![
        Box::new(FakeStrategy::failing("broken")),
        Box::new(FakeStrategy::succeeding("working", [15, 15, 15, 255])),
    ]);

    let bytes = converter
        .run(Path::new("unused.mp4"), &source, &options, &[])
        .unwrap();
    assert!(bytes.starts_with(b"GIF89a"));
}

/// Progress observer that cancels the run after a few grabbed frames.
struct CancelDuringGrab {
    token: CancellationToken,
    grabs_before_cancel: usize,
    seen: AtomicUsize,
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressCallback for CancelDuringGrab {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
        if update.phase == Phase::Grabbing {
            let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if seen >= self.grabs_before_cancel {
                self.token.cancel();
            }
        }
    }
}

#[test]
fn cancellation_mid_grab_returns_aborted() {
    let source = test_source();
    let options = Options {
        framerate: 10.0,
        ..Options::for_source(&source)
    };

    let token = CancellationToken::new();
    let observer = Arc::new(CancelDuringGrab {
        token: token.clone(),
        grabs_before_cancel: 3,
        seen: AtomicUsize::new(0),
        updates: Mutex::new(Vec::new()),
    });

    let converter = Converter::new()
        .unwrap()
        .with_cancellation(token)
        .with_progress(observer.clone())
        .with_strategies(vec![Box::new(FakeStrategy::succeeding(
            "scripted",
            [1, 1, 1, 255],
        ))]);

    let result = converter.run(Path::new("unused.mp4"), &source, &options, &[]);
    assert!(matches!(result, Err(GifpressError::Aborted)));

    // The run stopped within one frame of the cancellation: 20 frames were
    // planned, only the frames up to the flip were grabbed.
    let grabbing_updates = observer
        .updates
        .lock()
        .unwrap()
        .iter()
        .filter(|update| update.phase == Phase::Grabbing)
        .count();
    assert!(grabbing_updates <= 4, "grabbed {grabbing_updates} frames after cancel");
}
