//! Callbacks and panic containment
//!
//! A `Callback` is a fire-and-forget unit of work. Once submitted it belongs
//! to the worker; the submitter gets no completion signal back.
//!
//! Panics escaping a callback are isolated: the panic is caught, logged at
//! error level, and the worker moves on to the next callback. One runaway
//! callback never takes the whole worker down.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Zero-argument unit of work submitted to a worker
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Run `f`, containing any panic it raises.
///
/// Returns `true` when `f` completed normally. `label` names the kind of
/// work in the log line ("callback", "loop callback", ...).
pub fn invoke_contained<F>(label: &str, f: F) -> bool
where
    F: FnOnce(),
{
    // `f` is consumed by the call; nothing it captured is observed afterwards.
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            crate::kerror!("{} panicked: {}", label, panic_message(payload.as_ref()));
            false
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
