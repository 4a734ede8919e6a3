//! `EventFdEvent` - Linux `WaitHandle`.
//!
//! Signaling writes 1 to an eventfd. Coalescing: multiple `signal()` calls
//! before a wait are observed as a single wakeup (eventfd counter semantics,
//! one read drains the counter back to zero).

use coworker_core::error::{WorkerError, WorkerResult};
use coworker_core::traits::WaitHandle;
use nix::errno::Errno;

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

pub struct EventFdEvent {
    fd: OwnedFd,
}

impl EventFdEvent {
    /// Create a new, unsignaled event.
    pub fn new() -> WorkerResult<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(WorkerError::EventFailed(Errno::last() as i32));
        }
        // SAFETY: `fd` was just returned by eventfd(2) and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Read the counter. `Ok(false)` when it was already zero.
    fn drain(&self) -> WorkerResult<bool> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = Errno::last();
            if errno == Errno::EAGAIN {
                return Ok(false);
            }
            return Err(WorkerError::EventFailed(errno as i32));
        }
        Ok(val > 0)
    }
}

impl WaitHandle for EventFdEvent {
    fn signal(&self) -> WorkerResult<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let errno = Errno::last();
            // EAGAIN: counter would overflow, a signal is already pending.
            if errno == Errno::EAGAIN {
                return Ok(());
            }
            return Err(WorkerError::EventFailed(errno as i32));
        }
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> WorkerResult<bool> {
        super::wait_and_drain(self.fd.as_raw_fd(), timeout, || self.drain())
    }

    fn is_signaled(&self) -> WorkerResult<bool> {
        super::fd_is_readable(self.fd.as_raw_fd())
    }

    fn reset(&self) -> WorkerResult<()> {
        self.drain().map(|_| ())
    }
}

impl AsRawFd for EventFdEvent {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for EventFdEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFdEvent").field("fd", &self.fd.as_raw_fd()).finish()
    }
}
