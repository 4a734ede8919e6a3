//! Worker configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`new`)
//!
//! # Example
//!
//! ```rust,ignore
//! use coworker_runtime::config::WorkerOptions;
//!
//! let options = WorkerOptions::from_env("device-0")
//!     .stack_size(512 * 1024)
//!     .park_timeout(Some(Duration::from_millis(50)));
//! ```

use coworker_core::env::{env_get_millis, env_get_opt};
use std::time::Duration;

/// Library defaults.
pub mod defaults {
    use std::time::Duration;

    /// Stack for the worker OS thread. `None` keeps the std default.
    pub const STACK_SIZE: Option<usize> = None;
    /// Smallest stack accepted by `validate()`.
    pub const MIN_STACK_SIZE: usize = 64 * 1024;
    /// Longest idle park accepted by `validate()` (the `poll(2)` range).
    pub const MAX_PARK_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);
    /// Prefix of the OS thread name.
    pub const THREAD_NAME_PREFIX: &str = "cwk-";
}

/// Options for one worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Diagnostic name. Not required to be unique.
    pub name: String,
    /// Worker thread stack size in bytes (`None` = std default)
    pub stack_size: Option<usize>,
    /// Upper bound on one idle park (`None` = park until woken)
    pub park_timeout: Option<Duration>,
}

impl WorkerOptions {
    /// Options with library defaults, no env override.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: defaults::STACK_SIZE,
            park_timeout: None,
        }
    }

    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `CWK_STACK_SIZE` - Worker thread stack size in bytes
    /// - `CWK_PARK_TIMEOUT_MS` - Idle park bound in milliseconds (0 = unbounded)
    pub fn from_env(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: env_get_opt("CWK_STACK_SIZE").or(defaults::STACK_SIZE),
            park_timeout: env_get_millis("CWK_PARK_TIMEOUT_MS"),
        }
    }

    // Builder methods

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn park_timeout(mut self, d: Option<Duration>) -> Self {
        self.park_timeout = d;
        self
    }

    /// OS thread name for this worker.
    pub fn thread_name(&self) -> String {
        format!("{}{}", defaults::THREAD_NAME_PREFIX, self.name)
    }

    /// Validate options and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.contains('\0') {
            return Err(ConfigError::InvalidValue("name must not contain NUL"));
        }
        if let Some(size) = self.stack_size {
            if size < defaults::MIN_STACK_SIZE {
                return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
            }
        }
        if self.park_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0 (use None)"));
        }
        if self.park_timeout.is_some_and(|d| d > defaults::MAX_PARK_TIMEOUT) {
            return Err(ConfigError::InvalidValue("park_timeout out of range (use None)"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Worker Options:");
        eprintln!("  name:           {}", self.name);
        eprintln!("  stack_size:     {:?}", self.stack_size);
        eprintln!("  park_timeout:   {:?}", self.park_timeout);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for coworker_core::WorkerError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => coworker_core::WorkerError::Config(msg),
        }
    }
}
