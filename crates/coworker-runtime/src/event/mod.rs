//! Wait handles
//!
//! `Event` is the platform's `WaitHandle`: an fd that is readable while
//! signaled, so the cooperative loop can multiplex it with other handles in
//! a single `poll(2)`.
//!
//! | Platform    | Implementation              | Reset                  |
//! |-------------|-----------------------------|------------------------|
//! | Linux       | `eventfd(EFD_NONBLOCK)`     | one `read` drains      |
//! | other unix  | non-blocking self-pipe      | read until `EAGAIN`    |

mod poll;

pub use poll::poll_readable;

use coworker_core::error::{WorkerError, WorkerResult};
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd_linux;
        pub use eventfd_linux::EventFdEvent as Event;
    } else if #[cfg(unix)] {
        mod pipe_unix;
        pub use pipe_unix::PipeEvent as Event;
    } else {
        compile_error!("coworker requires a unix platform");
    }
}

/// Shared wait-with-reset logic for fd-backed events.
///
/// `drain` consumes a pending signal and reports whether there was one.
/// Another waiter may drain between our poll and our read, so a readable
/// fd that drains empty just loops back into poll with the remaining time.
pub(crate) fn wait_and_drain<D>(fd: RawFd, timeout: Option<Duration>, drain: D) -> WorkerResult<bool>
where
    D: Fn() -> WorkerResult<bool>,
{
    // Past the end of the clock means no deadline.
    let deadline = timeout.and_then(|d| Instant::now().checked_add(d));
    loop {
        if drain()? {
            return Ok(true);
        }
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        if remaining == Some(Duration::ZERO) {
            return Ok(false);
        }
        let ready = poll_readable(&[fd], remaining).map_err(WorkerError::EventFailed)?;
        if !ready[0] && deadline.is_some() {
            return Ok(false);
        }
    }
}

/// Non-consuming readiness check for one fd.
pub(crate) fn fd_is_readable(fd: RawFd) -> WorkerResult<bool> {
    let ready = poll_readable(&[fd], Some(Duration::ZERO)).map_err(WorkerError::EventFailed)?;
    Ok(ready[0])
}
