//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `WorkerOptions::from_env()` and the
//! logging layer.
//!
//! ```ignore
//! use coworker_core::env::{env_get, env_get_millis};
//!
//! let stack: usize = env_get("CWK_STACK_SIZE", 2 * 1024 * 1024);
//! let park = env_get_millis("CWK_PARK_TIMEOUT_MS"); // 0 or unset => None
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

/// Millisecond duration where `0` means "no bound".
///
/// Returns `None` when unset, unparsable, or zero.
pub fn env_get_millis(key: &str) -> Option<Duration> {
    match env_get_opt::<u64>(key) {
        Some(0) | None => None,
        Some(ms) => Some(Duration::from_millis(ms)),
    }
}
