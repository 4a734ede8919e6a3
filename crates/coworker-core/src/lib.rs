//! # coworker-core
//!
//! Core types and traits for the coworker single-thread executor.
//!
//! This crate is platform-agnostic and contains no OS calls.
//! Wait handles, the default cooperative loop and the worker itself live in
//! `coworker-runtime`.
//!
//! ## Modules
//!
//! - `callback` - Callback type and panic containment
//! - `state` - Worker lifecycle state machine
//! - `error` - Error types
//! - `traits` - Wait handle and cooperative loop traits
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod callback;
pub mod state;
pub mod error;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use callback::{invoke_contained, Callback};
pub use state::{AtomicWorkerState, WorkerState};
pub use error::{LoopError, LoopResult, WorkerError, WorkerResult};
pub use traits::{CoopLoop, LoopCallback, LoopStatus, WaitHandle};
pub use env::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};
