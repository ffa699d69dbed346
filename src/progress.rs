//! Progress reporting and cooperative cancellation.
//!
//! This module provides [`ProgressCallback`] for observing a conversion and
//! [`CancellationToken`] for stopping one. The token is passed by reference
//! into every suspension point of the pipeline rather than living in any
//! global state, so independent pipelines (and tests) never interfere.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gifpress::{
//!     CancellationToken, Converter, ProgressCallback, ProgressUpdate,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, update: &ProgressUpdate) {
//!         match update.percent {
//!             Some(pct) => println!("{}: {pct:.0}%", update.label),
//!             None => println!("{}...", update.label),
//!         }
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let converter = Converter::new()?
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//! // token.cancel() from elsewhere stops the run with an Aborted outcome.
//! # Ok::<(), gifpress::GifpressError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// The pipeline phase an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Phase {
    /// Probing and validating inputs, building the plan.
    Preparing,
    /// Extracting and compositing frames.
    Grabbing,
    /// Encoding the combined buffer.
    Encoding,
    /// Reading back and finalizing the output.
    Finalizing,
}

/// One progress snapshot.
///
/// `percent` is `None` while the pipeline is in an indeterminate stretch
/// (buffer submission, engine startup) and `Some` in `0.0..=100.0` when a
/// determinate ratio is known.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Which phase is running.
    pub phase: Phase,
    /// Short human-readable description of the current work.
    pub label: &'static str,
    /// Completion percentage, clamped to `0..=100`; `None` = indeterminate.
    pub percent: Option<f32>,
}

/// Trait for receiving progress updates during a conversion.
///
/// Implementations must be [`Send`] and [`Sync`]; the engine back end may
/// deliver updates while a command is being supervised.
///
/// Progress callbacks are **infallible** - they observe but cannot halt the
/// run. Use [`CancellationToken`] to stop it.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever the pipeline's progress state changes.
    fn on_progress(&self, update: &ProgressUpdate);
}

/// A no-op implementation that discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone the token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any of them to request that
/// the associated run stop. Every per-frame loop in the pipeline checks
/// [`is_cancelled`](CancellationToken::is_cancelled) at least once per
/// frame, and long-running engine commands are killed as soon as the flag
/// flips, so cancellation latency is bounded by one frame's processing.
///
/// # Example
///
/// ```
/// use gifpress::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
