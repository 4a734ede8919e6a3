//! # coworker - Single-thread cooperative worker
//!
//! One dedicated OS thread that runs callbacks submitted from any thread,
//! in submission order, interleaved with a cooperative event loop.
//!
//! ## Features
//!
//! - **Ordered**: callbacks run one at a time, per-producer FIFO
//! - **Non-blocking submission**: producers only contend for a short lock
//! - **Batch hand-off**: the worker swaps the whole queue out in O(1)
//! - **Event loop**: timers and waits on handles run on the same thread
//! - **Contained failures**: a panicking callback is logged, the worker goes on
//!
//! ## Quick Start
//!
//! ```ignore
//! use coworker::{Worker, WorkerOptions, kinfo};
//! use std::time::Duration;
//!
//! fn main() {
//!     let worker = Worker::new(WorkerOptions::new("device-0")).unwrap();
//!     worker.start().unwrap();
//!
//!     worker.enqueue_callback(|| kinfo!("hello from the worker"));
//!
//!     // Callbacks reach the loop through `current`.
//!     worker.enqueue_callback(|| {
//!         coworker::current::with_loop(|lp| {
//!             lp.call_after(Duration::from_millis(10), Box::new(|_| kinfo!("tick")))
//!         });
//!     });
//!
//!     worker.kill();
//!     worker.wait_for_shutdown();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Producer threads (any number)               │
//! │            enqueue_callback(), kill(), wait_for_shutdown()  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  lock { pending, kill } + signal
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Worker thread                         │
//! │     swap batch → run callbacks → loop.run_ready → park      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Cooperative loop (SyncLoop)                 │
//! │       calls, timers, waits on handles, one poll(2) park     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use coworker_core::{
    Callback,
    WorkerState,
    WorkerError,
    WorkerResult,
    LoopError,
    LoopResult,
    CoopLoop,
    LoopCallback,
    LoopStatus,
    WaitHandle,
};

// Re-export kprint macros for debug logging
pub use coworker_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use coworker_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use coworker_core::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use coworker_runtime::{
    ConfigError,
    Event,
    LoopFactory,
    SyncLoop,
    Worker,
    WorkerHandle,
    WorkerOptions,
};
pub use coworker_runtime::{config, current};

/// Create and start a worker with the default loop.
pub fn start(options: WorkerOptions) -> WorkerResult<Worker> {
    let worker = Worker::new(options)?;
    worker.start()?;
    Ok(worker)
}

/// Run `f` with a started worker, then kill it and wait for it to end.
///
/// This is the typical entry point for short-lived workers.
///
/// # Example
///
/// ```ignore
/// let total = coworker::scoped(WorkerOptions::new("scoped"), |w| {
///     w.enqueue_callback(|| kinfo!("on the worker"));
///     42
/// })?;
/// ```
pub fn scoped<F, T>(options: WorkerOptions, f: F) -> WorkerResult<T>
where
    F: FnOnce(&Worker) -> T,
{
    let worker = start(options)?;
    let result = f(&worker);
    worker.kill();
    worker.wait_for_shutdown();
    match worker.last_error() {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn test_scoped_runs_and_ends() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = scoped(WorkerOptions::new("scoped"), move |w| {
            for _ in 0..10 {
                let h = Arc::clone(&h);
                w.enqueue_callback(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                });
            }
            w.handle()
        })
        .unwrap();
        // Everything queued before kill() runs.
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(handle.state(), WorkerState::Ended);
    }

    #[test]
    fn test_start_rejects_bad_options() {
        let r = start(WorkerOptions::new("bad").stack_size(1));
        assert!(matches!(r, Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_timer_through_facade() {
        let (tx, rx) = mpsc::channel();
        scoped(WorkerOptions::new("facade-timer"), move |w| {
            w.enqueue_callback(move || {
                current::with_loop(|lp| {
                    lp.call_after(
                        Duration::from_millis(5),
                        Box::new(move |status: LoopResult<()>| tx.send(status).unwrap()),
                    )
                });
            });
            rx.recv_timeout(Duration::from_secs(10)).unwrap()
        })
        .map(|status| assert_eq!(status, Ok(())))
        .unwrap();
    }
}
