//! The external transcoding engine boundary.
//!
//! The pipeline drives the engine as an opaque service through four calls -
//! write a named file, execute one command over an ordered argument list,
//! read a named file back, delete a named file - plus a progress-event
//! stream and an abort signal. [`SystemFfmpeg`] is the production
//! implementation: it runs the system `ffmpeg` binary inside a private
//! temporary directory and synthesizes progress fractions from the
//! duration/time lines the binary prints while working.
//!
//! Tests substitute their own [`TranscodeEngine`] to script engine
//! behaviour without spawning processes.

use std::{
    collections::VecDeque,
    io::Read,
    path::PathBuf,
    process::{Command, Stdio},
    sync::mpsc,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use crate::{error::GifpressError, progress::CancellationToken};

/// How often the exec supervisor polls the child and the abort token.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(30);

/// How many trailing output lines are kept for error reporting.
const STDERR_TAIL_LINES: usize = 12;

/// One progress event from a running engine command.
#[derive(Debug, Clone, Copy)]
pub struct EngineProgress {
    /// Fraction of the command completed. Values outside `0.0..=1.0`
    /// (including the `-1.0` emitted while the total is unknown) mean the
    /// engine cannot tell; treat them as indeterminate, not as an error.
    pub fraction_complete: f64,
    /// Wall-clock time since the command started.
    pub elapsed: Duration,
}

/// Callback receiving [`EngineProgress`] events during [`TranscodeEngine::exec`].
pub type EngineProgressSink<'a> = dyn FnMut(EngineProgress) + 'a;

/// A general-purpose external transcoding engine.
///
/// File names are flat - no path separators - and live in a namespace
/// private to the engine instance.
pub trait TranscodeEngine {
    /// Write `bytes` to the named engine-side file, replacing it if present.
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), GifpressError>;

    /// Read an engine-side file.
    fn read_file(&self, name: &str) -> Result<Vec<u8>, GifpressError>;

    /// Delete an engine-side file.
    fn delete_file(&self, name: &str) -> Result<(), GifpressError>;

    /// Run one command to completion.
    ///
    /// `token` is checked continuously; flipping it kills the command and
    /// returns [`GifpressError::Aborted`]. Progress events are delivered to
    /// `on_progress` as the engine reports them.
    fn exec(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_progress: &mut EngineProgressSink<'_>,
    ) -> Result<(), GifpressError>;
}

/// [`TranscodeEngine`] backed by the system `ffmpeg` binary.
///
/// Each instance owns a private temporary working directory; engine-side
/// file names resolve inside it and the directory is removed when the
/// engine is dropped.
pub struct SystemFfmpeg {
    binary: PathBuf,
    workdir: TempDir,
}

impl SystemFfmpeg {
    /// Create an engine using the `ffmpeg` found on `PATH`.
    pub fn new() -> Result<Self, GifpressError> {
        Self::with_binary("ffmpeg")
    }

    /// Create an engine using a specific binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Result<Self, GifpressError> {
        Ok(Self {
            binary: binary.into(),
            workdir: TempDir::new()?,
        })
    }

    /// Whether the configured binary can be executed at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, GifpressError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(GifpressError::Engine(format!(
                "engine file names must be flat, got {name:?}"
            )));
        }
        Ok(self.workdir.path().join(name))
    }
}

impl TranscodeEngine for SystemFfmpeg {
    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), GifpressError> {
        let path = self.resolve(name)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, GifpressError> {
        let path = self.resolve(name)?;
        Ok(std::fs::read(path)?)
    }

    fn delete_file(&self, name: &str) -> Result<(), GifpressError> {
        let path = self.resolve(name)?;
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn exec(
        &self,
        args: &[String],
        token: &CancellationToken,
        on_progress: &mut EngineProgressSink<'_>,
    ) -> Result<(), GifpressError> {
        log::debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                GifpressError::Engine(format!(
                    "failed to spawn {} (is FFmpeg installed?): {error}",
                    self.binary.display()
                ))
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GifpressError::Engine("failed to capture engine output".to_string()))?;

        let started = Instant::now();
        let (event_sender, event_receiver) = mpsc::channel::<EngineProgress>();

        // ffmpeg writes its stats lines to stderr, terminated by carriage
        // returns; a dedicated reader turns them into progress events and
        // keeps a tail for error reporting.
        let reader = std::thread::spawn(move || {
            parse_engine_output(stderr, started, event_sender)
        });

        let outcome = loop {
            for event in event_receiver.try_iter() {
                on_progress(event);
            }

            if token.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                break Err(GifpressError::Aborted);
            }

            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => std::thread::sleep(SUPERVISE_INTERVAL),
                Err(error) => break Err(GifpressError::Engine(error.to_string())),
            }
        };

        let tail = reader.join().unwrap_or_default();
        for event in event_receiver.try_iter() {
            on_progress(event);
        }

        match outcome {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(GifpressError::Engine(format!(
                "ffmpeg exited with {status}: {}",
                tail.join(" | ")
            ))),
            Err(error) => Err(error),
        }
    }
}

/// Read the child's stderr, emitting progress events and returning the
/// trailing output lines.
fn parse_engine_output(
    mut stderr: impl Read,
    started: Instant,
    events: mpsc::Sender<EngineProgress>,
) -> Vec<String> {
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut total_seconds: Option<f64> = None;

    loop {
        let read = match stderr.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        pending.extend_from_slice(&chunk[..read]);

        while let Some(boundary) = pending.iter().position(|&b| b == b'\n' || b == b'\r') {
            let line: Vec<u8> = pending.drain(..=boundary).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if line.trim().is_empty() {
                continue;
            }

            if total_seconds.is_none() {
                if let Some(value) = extract_clock(&line, "Duration: ") {
                    total_seconds = Some(value);
                }
            }

            if let Some(position) = extract_clock(&line, "time=") {
                let fraction_complete = match total_seconds {
                    Some(total) if total > 0.0 => position / total,
                    _ => -1.0,
                };
                let _ = events.send(EngineProgress {
                    fraction_complete,
                    elapsed: started.elapsed(),
                });
            }

            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    tail.into()
}

/// Find `prefix` in `line` and parse the `HH:MM:SS.cc` clock that follows.
fn extract_clock(line: &str, prefix: &str) -> Option<f64> {
    let start = line.find(prefix)? + prefix.len();
    let rest = &line[start..];
    let clock: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
        .collect();

    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
