//! Error types for the worker and its cooperative loop

use core::fmt;
use std::io;

/// Result type for worker lifecycle operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Result type for cooperative loop operations and loop callbacks
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors surfaced by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// `start()` was called on a worker that already left `Created`
    AlreadyStarted,

    /// The OS refused to create the worker thread
    SpawnFailed(io::ErrorKind),

    /// Creating or operating a wait handle failed (errno)
    EventFailed(i32),

    /// The cooperative loop failed; fatal when raised inside the run body
    Loop(LoopError),

    /// Invalid worker options
    Config(&'static str),

    /// The run body itself panicked outside any callback
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::AlreadyStarted => write!(f, "worker already started"),
            WorkerError::SpawnFailed(kind) => write!(f, "failed to spawn worker thread: {}", kind),
            WorkerError::EventFailed(errno) => write!(f, "wait handle failure: errno {}", errno),
            WorkerError::Loop(e) => write!(f, "loop error: {}", e),
            WorkerError::Config(msg) => write!(f, "invalid worker options: {}", msg),
            WorkerError::Panicked => write!(f, "worker run body panicked"),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Loop(e) => Some(e),
            _ => None,
        }
    }
}

/// Cooperative loop errors
///
/// Also the status handed to loop callbacks: `Ok(())` when the operation
/// matured normally, one of these when it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopError {
    /// OS-level failure inside the loop (errno)
    Os(i32),

    /// A wait operation timed out before its handle was signaled
    DeadlineExceeded,

    /// The loop was torn down with the operation still outstanding
    Aborted,

    /// Delay or timeout too large to schedule
    InvalidDelay,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Os(errno) => write!(f, "OS error: errno {}", errno),
            LoopError::DeadlineExceeded => write!(f, "deadline exceeded"),
            LoopError::Aborted => write!(f, "operation aborted"),
            LoopError::InvalidDelay => write!(f, "delay out of range"),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<LoopError> for WorkerError {
    fn from(e: LoopError) -> Self {
        WorkerError::Loop(e)
    }
}

impl From<io::Error> for WorkerError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(errno) => WorkerError::EventFailed(errno),
            None => WorkerError::SpawnFailed(e.kind()),
        }
    }
}
