//! `poll(2)` over a set of wait-handle fds.

use nix::errno::Errno;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Convert an optional timeout into poll milliseconds, rounding up so a
/// sub-millisecond remainder never turns into a busy spin.
fn to_poll_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

/// Wait until at least one fd is readable or `timeout` elapses.
///
/// Returns one flag per input fd. All false means timeout. `EINTR` is
/// retried with the remaining time; any other failure returns the errno.
/// A timeout too large to place on the clock waits without bound.
pub fn poll_readable(fds: &[RawFd], timeout: Option<Duration>) -> Result<Vec<bool>, i32> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd { fd, events: libc::POLLIN, revents: 0 })
        .collect();
    let deadline = timeout.and_then(|d| Instant::now().checked_add(d));

    loop {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                to_poll_ms(remaining),
            )
        };
        if ret >= 0 {
            break;
        }
        let errno = Errno::last();
        if errno != Errno::EINTR {
            return Err(errno as i32);
        }
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_ms_rounding() {
        assert_eq!(to_poll_ms(None), -1);
        assert_eq!(to_poll_ms(Some(Duration::ZERO)), 0);
        assert_eq!(to_poll_ms(Some(Duration::from_micros(10))), 1);
        assert_eq!(to_poll_ms(Some(Duration::from_millis(15))), 15);
        assert_eq!(to_poll_ms(Some(Duration::from_secs(u64::MAX))), libc::c_int::MAX);
    }

    #[test]
    fn test_unrepresentable_timeout_waits_for_readiness() {
        let ev = crate::event::Event::new().unwrap();
        coworker_core::traits::WaitHandle::signal(&ev).unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&ev);
        let ready = poll_readable(&[fd], Some(Duration::MAX)).unwrap();
        assert_eq!(ready, vec![true]);
    }

    #[test]
    fn test_empty_set_times_out() {
        let start = Instant::now();
        let ready = poll_readable(&[], Some(Duration::from_millis(20))).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
