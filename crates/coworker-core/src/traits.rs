//! Collaborator traits
//!
//! The worker depends on two capabilities it does not implement itself:
//!
//! - a **wait handle** (create / signal / wait-with-reset / destroy), used
//!   for the transact and ended signals and for loop wait operations;
//! - a **cooperative loop**, the single-threaded event loop that turns
//!   matured asynchronous operations into callbacks on the worker thread.
//!
//! Platform implementations live in `coworker-runtime`. Tests can inject
//! their own loop to drive the worker without any real asynchronous work.

use crate::error::{LoopResult, WorkerResult};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

/// Callback fired by the cooperative loop when an operation matures.
///
/// Receives `Ok(())` on normal completion, or the reason it did not
/// complete (`DeadlineExceeded`, `Aborted`).
pub type LoopCallback = Box<dyn FnOnce(LoopResult<()>) + Send + 'static>;

/// A signalable OS wait object.
///
/// Creation is the implementor's constructor and destruction is `Drop`.
/// The raw fd lets a loop multiplex several handles in one `poll(2)`;
/// a handle is signaled while its fd is readable.
///
/// **Contract:**
/// - `signal()` never blocks. Signals before a wait coalesce into one.
/// - `wait()` consumes the signal (auto-reset).
/// - `is_signaled()` never consumes it.
pub trait WaitHandle: AsRawFd + Send + Sync {
    /// Raise the signal.
    fn signal(&self) -> WorkerResult<()>;

    /// Block until signaled or `timeout` elapses (`None` = forever), then
    /// reset. Returns `true` if the signal was observed.
    fn wait(&self, timeout: Option<Duration>) -> WorkerResult<bool>;

    /// Non-consuming readiness check.
    fn is_signaled(&self) -> WorkerResult<bool>;

    /// Clear a pending signal without waiting.
    fn reset(&self) -> WorkerResult<()>;
}

/// What a loop step left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Nothing registered.
    Idle,
    /// Operations registered, none matured yet. Safe to park.
    Waiting,
    /// Work can fire right now; the caller must not park.
    Ready,
}

/// The cooperative loop primitive driven by a worker.
///
/// All methods are called on the worker thread only. Registration methods
/// take `&self` so callbacks fired by `run_ready` can register follow-up
/// operations on the same loop.
///
/// **Contract:**
/// - `run_ready()` never blocks.
/// - Operations registered while `run_ready()` fires callbacks mature no
///   earlier than the next step.
/// - An `Err` from `run_ready()` or `park()` is fatal to the worker.
pub trait CoopLoop {
    /// Fire `callback` on the next step.
    fn call(&self, callback: LoopCallback) -> LoopResult<()>;

    /// Fire `callback` once `delay` has elapsed.
    fn call_after(&self, delay: Duration, callback: LoopCallback) -> LoopResult<()>;

    /// Fire `callback` once `handle` is signaled, or with
    /// `DeadlineExceeded` after `timeout` (`None` = no deadline).
    /// The handle's signal is left in place.
    fn wait_one(
        &self,
        handle: Arc<dyn WaitHandle>,
        timeout: Option<Duration>,
        callback: LoopCallback,
    ) -> LoopResult<()>;

    /// Fire every matured operation synchronously on this thread.
    fn run_ready(&self) -> LoopResult<LoopStatus>;

    /// Block until `wake` is signaled (consuming it), a registered
    /// operation matures, or `limit` elapses.
    fn park(&self, wake: &dyn WaitHandle, limit: Option<Duration>) -> LoopResult<()>;

    /// Fire every outstanding operation with `Aborted`.
    fn abort_all(&self);

    /// Number of registered, not yet fired operations.
    fn pending(&self) -> usize;
}
