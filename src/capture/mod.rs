//! Output capture for plugin operations
//!
//! The orchestrator reads exactly one JSON result from the plugin's stdout.
//! Anything else printed while an operation runs (progress text, tool output,
//! tracing events, panic messages) would corrupt it, so operations run inside
//! a capture scope:
//!
//! ```text
//!  before            during f()                     after
//!  fd 1 ─► tty       fd 1 ─┐                        fd 1 ─► tty
//!  fd 2 ─► tty       fd 2 ─┴─► pipe ─► drain thread  fd 2 ─► tty
//!                                          │
//!                                          └─► Captured { output, outcome }
//! ```
//!
//! The operation's result comes back as data. The caller writes it to the
//! real stdout once the scope has ended.
//!
//! # Example
//!
//! ```ignore
//! let captured = capture::run_captured(|| {
//!     println!("mounting volume x");
//!     "ok"
//! })?;
//! assert_eq!(captured.output, b"mounting volume x\n");
//! assert_eq!(captured.into_value(), "ok");
//! ```

mod redirect;

use std::any::Any;
use std::borrow::Cow;
use std::cell::Cell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use thiserror::Error;

use redirect::{Drain, StdRedirect};

/// Serializes scopes across threads: fds 1 and 2 are process-wide
static SCOPE_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static SCOPE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Error setting up or tearing down a capture scope
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture scope is already active on this thread")]
    AlreadyActive,
    #[error("failed to redirect stdout/stderr: {0}")]
    Setup(#[source] std::io::Error),
    #[error("failed to restore stdout/stderr: {0}")]
    Restore(#[source] std::io::Error),
    #[error("failed to read captured output: {0}")]
    Drain(#[source] std::io::Error),
}

/// Result of running an operation inside a capture scope
pub struct Captured<T> {
    /// Everything written to stdout and stderr while the operation ran
    pub output: Vec<u8>,
    outcome: Result<T, Box<dyn Any + Send + 'static>>,
}

impl<T> Captured<T> {
    /// Whether the operation panicked
    pub fn panicked(&self) -> bool {
        self.outcome.is_err()
    }

    /// Captured output as text
    pub fn output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// The operation's return value
    ///
    /// If the operation panicked, the original panic is resumed here.
    pub fn into_value(self) -> T {
        match self.outcome {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// The operation's return value, or the payload it panicked with
    pub fn into_outcome(self) -> std::thread::Result<T> {
        self.outcome
    }
}

/// Text of a panic payload, when it carries one
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T, E> Captured<Result<T, E>> {
    /// Whether the operation panicked or returned an error
    pub fn failed(&self) -> bool {
        !matches!(self.outcome, Ok(Ok(_)))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Captured<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Captured");
        s.field("output", &self.output_lossy());
        match &self.outcome {
            Ok(value) => s.field("value", value),
            Err(_) => s.field("value", &"<panicked>"),
        };
        s.finish()
    }
}

/// Run `f` with stdout and stderr captured
pub fn run_captured<T, F>(f: F) -> Result<Captured<T>, CaptureError>
where
    F: FnOnce() -> T,
{
    let scope = Scope::begin()?;
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    let output = scope.finish()?;
    Ok(Captured { output, outcome })
}

/// Drive `fut` to completion with stdout and stderr captured
///
/// Meant for a single-threaded runtime: any other task polled while `fut` is
/// pending writes into the same capture.
pub async fn run_captured_async<F>(fut: F) -> Result<Captured<F::Output>, CaptureError>
where
    F: Future,
{
    let scope = Scope::begin()?;
    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
    let output = scope.finish()?;
    Ok(Captured { output, outcome })
}

/// Clears the per-thread "scope active" flag when the scope ends
struct ActiveFlag;

impl ActiveFlag {
    fn set() -> Result<Self, CaptureError> {
        if SCOPE_ACTIVE.with(|active| active.replace(true)) {
            return Err(CaptureError::AlreadyActive);
        }
        Ok(Self)
    }
}

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        SCOPE_ACTIVE.with(|active| active.set(false));
    }
}

/// One active redirection
///
/// Field order is drop order: streams are restored before the lock is
/// released to the next scope.
struct Scope {
    redirect: StdRedirect,
    drain: Drain,
    _lock: MutexGuard<'static, ()>,
    _active: ActiveFlag,
}

impl Scope {
    fn begin() -> Result<Self, CaptureError> {
        let active = ActiveFlag::set()?;
        // A panic inside an earlier scope is already handled by catch_unwind
        let lock = SCOPE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let (read_end, write_end) = redirect::pipe().map_err(CaptureError::Setup)?;
        let drain = Drain::spawn(read_end).map_err(CaptureError::Setup)?;
        let redirect = StdRedirect::install(&write_end).map_err(CaptureError::Setup)?;
        // fds 1 and 2 now hold the only write ends
        drop(write_end);

        Ok(Self {
            redirect,
            drain,
            _lock: lock,
            _active: active,
        })
    }

    fn finish(mut self) -> Result<Vec<u8>, CaptureError> {
        self.redirect.restore().map_err(CaptureError::Restore)?;
        self.drain.finish().map_err(CaptureError::Drain)
    }
}
