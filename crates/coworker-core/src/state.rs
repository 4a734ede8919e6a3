//! Worker lifecycle state
//!
//! ```text
//! Created ──start──▶ Started ──kill / fatal──▶ Stopping ──exit──▶ Ended
//!                       └──────────────exit──────────────────────▲
//! ```
//!
//! There is no transition out of `Ended`; a worker is single-use.

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, thread not spawned yet
    Created = 0,

    /// Thread spawned, run body executing
    Started = 1,

    /// Shutdown requested (kill or fatal run-body error), thread still alive
    Stopping = 2,

    /// Run body exited and the ended signal was raised
    Ended = 3,
}

impl WorkerState {
    /// Thread exists and has not finished yet
    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(self, WorkerState::Started | WorkerState::Stopping)
    }

    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, WorkerState::Ended)
    }
}

impl From<u8> for WorkerState {
    fn from(v: u8) -> Self {
        match v {
            0 => WorkerState::Created,
            1 => WorkerState::Started,
            2 => WorkerState::Stopping,
            _ => WorkerState::Ended,
        }
    }
}

impl From<WorkerState> for u8 {
    fn from(state: WorkerState) -> u8 {
        state as u8
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Created => "created",
            WorkerState::Started => "started",
            WorkerState::Stopping => "stopping",
            WorkerState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Atomic cell holding a `WorkerState`, shared between the worker thread
/// and its controllers.
#[derive(Debug)]
pub struct AtomicWorkerState(AtomicU8);

impl AtomicWorkerState {
    pub const fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> WorkerState {
        WorkerState::from(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from -> to` atomically. Returns false if the current state
    /// was not `from`.
    #[inline]
    pub fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicWorkerState {
    fn default() -> Self {
        Self::new(WorkerState::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_u8() {
        for s in [
            WorkerState::Created,
            WorkerState::Started,
            WorkerState::Stopping,
            WorkerState::Ended,
        ] {
            assert_eq!(WorkerState::from(u8::from(s)), s);
        }
        assert_eq!(WorkerState::from(200), WorkerState::Ended);
    }

    #[test]
    fn test_transition_only_from_expected() {
        let cell = AtomicWorkerState::default();
        assert!(!cell.transition(WorkerState::Started, WorkerState::Stopping));
        assert!(cell.transition(WorkerState::Created, WorkerState::Started));
        assert!(cell.load().is_running());
        assert!(cell.transition(WorkerState::Started, WorkerState::Stopping));
        assert!(!cell.transition(WorkerState::Started, WorkerState::Stopping));
        cell.store(WorkerState::Ended);
        assert!(cell.load().is_terminated());
        assert!(!cell.load().is_running());
    }
}
