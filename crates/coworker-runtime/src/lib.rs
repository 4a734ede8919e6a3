//! # coworker-runtime
//!
//! Platform-specific runtime for the coworker executor.
//!
//! This crate provides:
//! - Wait handles (eventfd on Linux, self-pipe on other unix)
//! - The default cooperative loop (`SyncLoop`): immediate calls, timers,
//!   waits on handles
//! - The worker thread and its run body
//! - Thread-local access to the current worker and its loop

pub mod config;
pub mod event;
pub mod sync_loop;
pub mod worker;
pub mod current;

// Re-exports
pub use config::{ConfigError, WorkerOptions};
pub use event::Event;
pub use sync_loop::SyncLoop;
pub use worker::{LoopFactory, Worker, WorkerHandle};
