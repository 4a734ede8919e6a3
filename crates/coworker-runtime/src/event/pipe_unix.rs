//! `PipeEvent` - self-pipe `WaitHandle` for unix targets without eventfd.
//!
//! Signaling writes one byte; the read end is readable while any byte is
//! buffered. Reset reads until `EAGAIN`. A full pipe means a signal is
//! already pending, so a failed write with `EAGAIN` is success.

use coworker_core::error::{WorkerError, WorkerResult};
use coworker_core::traits::WaitHandle;
use nix::errno::Errno;

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

pub struct PipeEvent {
    read: OwnedFd,
    write: OwnedFd,
}

fn set_nonblock_cloexec(fd: RawFd) -> WorkerResult<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(WorkerError::EventFailed(Errno::last() as i32));
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(WorkerError::EventFailed(Errno::last() as i32));
        }
    }
    Ok(())
}

impl PipeEvent {
    pub fn new() -> WorkerResult<Self> {
        let (read, write) = nix::unistd::pipe().map_err(|e| WorkerError::EventFailed(e as i32))?;
        set_nonblock_cloexec(read.as_raw_fd())?;
        set_nonblock_cloexec(write.as_raw_fd())?;
        Ok(Self { read, write })
    }

    fn drain(&self) -> WorkerResult<bool> {
        let mut buf = [0u8; 64];
        let mut got = false;
        loop {
            let ret = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if ret > 0 {
                got = true;
                continue;
            }
            if ret == 0 {
                return Ok(got);
            }
            let errno = Errno::last();
            match errno {
                Errno::EAGAIN => return Ok(got),
                Errno::EINTR => continue,
                _ => return Err(WorkerError::EventFailed(errno as i32)),
            }
        }
    }
}

impl WaitHandle for PipeEvent {
    fn signal(&self) -> WorkerResult<()> {
        let byte = 1u8;
        let ret = unsafe {
            libc::write(
                self.write.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            )
        };
        if ret < 0 {
            let errno = Errno::last();
            if errno == Errno::EAGAIN {
                return Ok(());
            }
            return Err(WorkerError::EventFailed(errno as i32));
        }
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> WorkerResult<bool> {
        super::wait_and_drain(self.read.as_raw_fd(), timeout, || self.drain())
    }

    fn is_signaled(&self) -> WorkerResult<bool> {
        super::fd_is_readable(self.read.as_raw_fd())
    }

    fn reset(&self) -> WorkerResult<()> {
        self.drain().map(|_| ())
    }
}

impl AsRawFd for PipeEvent {
    fn as_raw_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

impl std::fmt::Debug for PipeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEvent")
            .field("read", &self.read.as_raw_fd())
            .field("write", &self.write.as_raw_fd())
            .finish()
    }
}
