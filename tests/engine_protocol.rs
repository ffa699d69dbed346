//! Engine back-end protocol tests over a scripted in-memory engine.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use gifpress::{
    CancellationToken, Converter, Dither, EncoderBackend, EngineGrabStrategy, EngineProgress,
    EngineProgressSink, FrameRequest, FrameStrategy, GifpressError, GrabbedFrame, Options, Phase,
    ProgressCallback, ProgressUpdate, SourceInfo, TranscodeEngine,
};
use image::{Rgba, RgbaImage};

type ExecScript =
    Box<dyn Fn(&[String], &mut HashMap<String, Vec<u8>>) -> Result<(), String> + Send + Sync>;

/// An in-memory engine that records every call and runs a scripted
/// response to `exec`.
struct ScriptedEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    execs: Mutex<Vec<Vec<String>>>,
    progress_fractions: Vec<f64>,
    script: ExecScript,
}

impl ScriptedEngine {
    fn new(progress_fractions: Vec<f64>, script: ExecScript) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            execs: Mutex::new(Vec::new()),
            progress_fractions,
            script,
        }
    }

    fn remaining_files(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    fn recorded_execs(&self) -> Vec<Vec<String>> {
        self.execs.lock().unwrap().clone()
    }
}

impl TranscodeEngine for ScriptedEngine {
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), GifpressError> {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, GifpressError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GifpressError::Engine(format!("no such file: {name}")))
    }

    fn delete_file(&self, name: &str) -> Result<(), GifpressError> {
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GifpressError::Engine(format!("no such file: {name}")))
    }

    fn exec(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_progress: &mut EngineProgressSink<'_>,
    ) -> Result<(), GifpressError> {
        if token.is_cancelled() {
            return Err(GifpressError::Aborted);
        }
        self.execs.lock().unwrap().push(args.to_vec());

        for &fraction in &self.progress_fractions {
            on_progress(EngineProgress {
                fraction_complete: fraction,
                elapsed: std::time::Duration::from_millis(5),
            });
        }

        let mut files = self.files.lock().unwrap();
        (self.script)(args, &mut files).map_err(GifpressError::Engine)
    }
}

/// Emits one solid frame per timestamp; used to feed the encode stage.
struct SolidStrategy;

impl FrameStrategy for SolidStrategy {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn grab(
        &self,
        request: &FrameRequest<'_>,
        _token: &CancellationToken,
        sink: &mut gifpress::FrameSink<'_>,
    ) -> Result<usize, GifpressError> {
        let mut produced = 0;
        for (index, &timestamp) in request.timestamps.iter().enumerate() {
            let image =
                RgbaImage::from_pixel(request.width, request.height, Rgba([50, 60, 70, 255]));
            produced = index + 1;
            if !sink(index, GrabbedFrame { image, timestamp }) {
                break;
            }
        }
        Ok(produced)
    }
}

struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .cloned()
}

// ── Engine encoder back end ────────────────────────────────────────

#[test]
fn engine_backend_runs_palette_graph_and_reads_output_back() {
    let fake_gif = b"GIF89a-scripted".to_vec();
    let expected = fake_gif.clone();

    let engine = Arc::new(ScriptedEngine::new(
        vec![0.25, 2.0],
        Box::new(move |args, files| {
            // The raw input must be present, fully submitted, and declared.
            let raw = files
                .get("combined.raw")
                .ok_or("combined.raw not written")?;
            assert_eq!(raw.len(), 20 * 10 * 4 * 4, "combined buffer size");
            assert!(args.iter().any(|a| a == "rawvideo"));

            files.insert("output.gif".to_string(), fake_gif.clone());
            Ok(())
        }),
    ));

    let source = SourceInfo {
        width: 20,
        height: 10,
        duration: 4.0,
    };
    let options = Options {
        end: 2.0,
        framerate: 2.0,
        max_colors: 64,
        dither: Dither::FloydSteinberg,
        ..Options::for_source(&source)
    };

    let observer = Arc::new(RecordingProgress {
        updates: Mutex::new(Vec::new()),
    });

    let converter = Converter::with_engine(engine.clone())
        .with_backend(EncoderBackend::Engine)
        .with_progress(observer.clone())
        .with_strategies(vec![Box::new(SolidStrategy)]);

    let bytes = converter
        .run(Path::new("unused.mp4"), &source, &options, &[])
        .unwrap();
    assert_eq!(bytes, expected);

    // One command, with the declared geometry and the two-stage filter.
    let execs = engine.recorded_execs();
    assert_eq!(execs.len(), 1);
    let args = &execs[0];
    assert_eq!(arg_value(args, "-s").as_deref(), Some("20x10"));
    assert_eq!(arg_value(args, "-pix_fmt").as_deref(), Some("rgba"));

    // 4 frames over 2 s of plan duration.
    let framerate: f64 = arg_value(args, "-framerate").unwrap().parse().unwrap();
    assert!((framerate - 2.0).abs() < 1e-3);

    let filter = arg_value(args, "-vf").unwrap();
    assert!(filter.contains("palettegen=max_colors=64"));
    assert!(filter.contains("paletteuse=dither=floyd_steinberg"));

    // Engine-side files are cleaned up after the read-back.
    assert!(engine.remaining_files().is_empty());

    // Progress forwarding: 0.25 became a percentage, 2.0 became
    // indeterminate.
    let updates = observer.updates.lock().unwrap();
    let encoding: Vec<_> = updates
        .iter()
        .filter(|update| update.phase == Phase::Encoding)
        .collect();
    assert!(encoding.iter().any(|u| u.percent == Some(25.0)));
    assert!(encoding.iter().any(|u| u.percent.is_none()));
}

#[test]
fn engine_backend_failure_is_fatal_and_cleans_up() {
    let engine = Arc::new(ScriptedEngine::new(
        Vec::new(),
        Box::new(|_, _| Err("scripted engine failure".to_string())),
    ));

    let source = SourceInfo {
        width: 8,
        height: 8,
        duration: 1.0,
    };
    let options = Options {
        framerate: 3.0,
        ..Options::for_source(&source)
    };

    let converter = Converter::with_engine(engine.clone())
        .with_backend(EncoderBackend::Engine)
        .with_strategies(vec![Box::new(SolidStrategy)]);

    let result = converter.run(Path::new("unused.mp4"), &source, &options, &[]);
    assert!(matches!(result, Err(GifpressError::Engine(_))));
    assert!(engine.remaining_files().is_empty());
}

// ── Engine grab strategy ───────────────────────────────────────────

#[test]
fn engine_grab_reads_and_deletes_frame_files_in_order() {
    const WIDTH: u32 = 6;
    const HEIGHT: u32 = 4;
    let frame_bytes = (WIDTH * HEIGHT * 4) as usize;

    let engine = Arc::new(ScriptedEngine::new(
        Vec::new(),
        Box::new(move |args, files| {
            assert!(args.iter().any(|a| a == "frame_%05d.raw"));
            let count: usize = arg_value(args, "-frames:v")
                .ok_or("missing -frames:v")?
                .parse()
                .map_err(|_| "bad -frames:v")?;
            for index in 0..count {
                files.insert(
                    format!("frame_{:05}.raw", index + 1),
                    vec![index as u8; frame_bytes],
                );
            }
            Ok(())
        }),
    ));

    // The strategy reads the real input file from disk before submitting
    // it to the engine.
    let mut input = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    input.write_all(b"not really a video").unwrap();

    let timestamps = [0.0, 0.25, 0.5, 0.75];
    let request = FrameRequest {
        path: input.path(),
        timestamps: &timestamps,
        width: WIDTH,
        height: HEIGHT,
    };

    let strategy = EngineGrabStrategy::new(engine.clone());
    let token = CancellationToken::new();

    let mut seen: Vec<(usize, u8)> = Vec::new();
    let produced = strategy
        .grab(&request, &token, &mut |index, frame| {
            seen.push((index, frame.image.get_pixel(0, 0)[0]));
            true
        })
        .unwrap();

    assert_eq!(produced, timestamps.len());
    for (position, (index, first_byte)) in seen.iter().enumerate() {
        assert_eq!(position, *index);
        assert_eq!(*first_byte, *index as u8);
    }

    // Input upload and every frame file were deleted engine-side.
    assert!(engine.remaining_files().is_empty());
}

#[test]
fn engine_grab_with_no_output_is_a_decode_failure() {
    let engine = Arc::new(ScriptedEngine::new(Vec::new(), Box::new(|_, _| Ok(()))));

    let mut input = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
    input.write_all(b"bytes").unwrap();

    let timestamps = [0.0, 1.0];
    let request = FrameRequest {
        path: input.path(),
        timestamps: &timestamps,
        width: 4,
        height: 4,
    };

    let strategy = EngineGrabStrategy::new(engine);
    let token = CancellationToken::new();
    let result = strategy.grab(&request, &token, &mut |_, _| true);

    assert!(matches!(result, Err(GifpressError::Decode { .. })));
}
