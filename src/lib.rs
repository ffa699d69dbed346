//! # gifpress
//!
//! Convert video clips into animated GIFs - trim, resize, retime,
//! watermark, and palette-encode entirely on the local machine.
//!
//! `gifpress` turns a slice of any video file into a GIF through a
//! deterministic pipeline: a pure timing planner decides which source
//! timestamps to sample and how long each output frame is displayed; a
//! frame source extracts raw RGBA frames through a chain of fallback
//! decoding strategies (container demux + decode, seek-and-capture, and an
//! external-engine raw export); an optional watermark band is rendered once
//! and composited onto every frame; and one of two interchangeable encoder
//! back ends produces the final bytes - an in-process palette encoder or
//! the external engine's palettegen/paletteuse graph.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gifpress::{Converter, Options, SourceInfo};
//!
//! let source = SourceInfo::probe("input.mp4").unwrap();
//! let options = Options {
//!     start: 2.0,
//!     end: 6.5,
//!     framerate: 15.0,
//!     width: 480,
//!     ..Options::for_source(&source)
//! };
//!
//! let converter = Converter::new().unwrap();
//! let gif = converter.run("input.mp4".as_ref(), &source, &options, &[]).unwrap();
//! std::fs::write("output.gif", &gif).unwrap();
//! ```
//!
//! ## Cancellation
//!
//! Every per-frame loop polls a shared [`CancellationToken`]; flipping it
//! stops the run within one frame and surfaces the distinct
//! [`GifpressError::Aborted`] outcome - a stopped run is not a failure.
//!
//! ```no_run
//! use gifpress::{CancellationToken, Converter};
//!
//! let token = CancellationToken::new();
//! let converter = Converter::new().unwrap().with_cancellation(token.clone());
//! // call token.cancel() from another thread to stop the run
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `hardware` | Prefer hardware decoders (CUDA, VAAPI, VideoToolbox, ...) in the demux-decode strategy |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed for the in-process
//! decode strategies; the engine back end and last-resort grab strategy
//! additionally use the `ffmpeg` binary on `PATH`.

pub mod buffer;
pub mod convert;
pub mod demux_grab;
pub mod engine;
mod engine_encode;
pub mod engine_grab;
pub mod error;
pub mod frames;
mod gif;
#[cfg(feature = "hardware")]
mod hardware;
pub mod options;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod seek_grab;
mod utilities;
pub mod watermark;

pub use buffer::CombinedBuffer;
pub use convert::{Converter, EncoderBackend};
pub use demux_grab::DemuxDecodeStrategy;
pub use engine::{EngineProgress, EngineProgressSink, SystemFfmpeg, TranscodeEngine};
pub use engine_grab::EngineGrabStrategy;
pub use error::GifpressError;
pub use frames::{FrameRequest, FrameSink, FrameStrategy, GrabbedFrame, grab_frames};
pub use options::{DERIVE_DIMENSION, Dither, Options};
pub use plan::{OutputSize, TimePlan, plan_time_range, resolve_output_size};
pub use probe::SourceInfo;
pub use progress::{CancellationToken, Phase, ProgressCallback, ProgressUpdate};
pub use seek_grab::SeekGrabStrategy;
pub use watermark::{Compositor, TextAlign, WatermarkConfig, WatermarkLocation};
