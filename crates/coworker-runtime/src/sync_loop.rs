//! `SyncLoop` - default `CoopLoop` implementation.
//!
//! A single-threaded loop with three kinds of operations:
//!
//! | Operation   | Matures when                                   |
//! |-------------|------------------------------------------------|
//! | `call`      | next step                                      |
//! | `call_after`| deadline passed (earliest first, ties FIFO)    |
//! | `wait_one`  | handle signaled, or deadline passed (timeout)  |
//!
//! State sits in a `RefCell`. Every step takes the matured operations out,
//! drops the borrow, then fires them, so callbacks can register follow-up
//! operations; those land in the next step.
//!
//! `park()` multiplexes the worker's wake handle with every waited handle
//! in one `poll(2)`, bounded by the earliest deadline.

use crate::event::poll_readable;

use coworker_core::callback::invoke_contained;
use coworker_core::error::{LoopError, LoopResult, WorkerError};
use coworker_core::traits::{CoopLoop, LoopCallback, LoopStatus, WaitHandle};
use coworker_core::ktrace;

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timer queue entry. Reversed ordering turns `BinaryHeap` into a
/// min-heap on `(deadline, seq)`.
struct TimerOp {
    deadline: Instant,
    seq: u64,
    callback: LoopCallback,
}

impl Eq for TimerOp {}

impl PartialEq for TimerOp {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerOp {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct WaitOp {
    handle: Arc<dyn WaitHandle>,
    deadline: Option<Instant>,
    callback: LoopCallback,
}

#[derive(Default)]
struct LoopState {
    calls: VecDeque<LoopCallback>,
    timers: BinaryHeap<TimerOp>,
    waits: Vec<WaitOp>,
    next_seq: u64,
}

impl LoopState {
    fn len(&self) -> usize {
        self.calls.len() + self.timers.len() + self.waits.len()
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        let timer = self.timers.peek().map(|t| t.deadline);
        let wait = self.waits.iter().filter_map(|w| w.deadline).min();
        match (timer, wait) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Map a wait-handle failure into the loop's error space.
fn handle_error(e: WorkerError) -> LoopError {
    match e {
        WorkerError::EventFailed(errno) => LoopError::Os(errno),
        WorkerError::Loop(inner) => inner,
        _ => LoopError::Os(libc::EIO),
    }
}

/// Default cooperative loop.
pub struct SyncLoop {
    state: RefCell<LoopState>,
    closed: Cell<bool>,
}

impl SyncLoop {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(LoopState::default()),
            closed: Cell::new(false),
        }
    }

    fn check_open(&self) -> LoopResult<()> {
        if self.closed.get() {
            return Err(LoopError::Aborted);
        }
        Ok(())
    }

    /// Collect every operation that has matured by `now`.
    ///
    /// Handles are checked before anything is removed, so a failing check
    /// leaves every operation registered for `abort_all()`.
    fn take_matured(&self, now: Instant) -> LoopResult<Vec<(LoopCallback, LoopResult<()>)>> {
        let mut st = self.state.borrow_mut();

        let mut matured_waits = Vec::new();
        for (i, op) in st.waits.iter().enumerate() {
            if op.handle.is_signaled().map_err(handle_error)? {
                matured_waits.push((i, Ok(())));
            } else if op.deadline.is_some_and(|d| d <= now) {
                matured_waits.push((i, Err(LoopError::DeadlineExceeded)));
            }
        }

        let mut fired = Vec::with_capacity(st.calls.len() + matured_waits.len());
        fired.extend(st.calls.drain(..).map(|cb| (cb, Ok(()))));

        while st.timers.peek().is_some_and(|t| t.deadline <= now) {
            if let Some(t) = st.timers.pop() {
                fired.push((t.callback, Ok(())));
            }
        }

        // Remove back to front so earlier indices stay valid, then restore
        // registration order.
        let mut waits: Vec<_> = matured_waits
            .into_iter()
            .rev()
            .map(|(i, status)| (st.waits.remove(i).callback, status))
            .collect();
        waits.reverse();
        fired.extend(waits);

        Ok(fired)
    }

    /// Deadline `delay` from now, or `InvalidDelay` past the end of the clock.
    fn deadline_after(delay: Duration) -> LoopResult<Instant> {
        Instant::now()
            .checked_add(delay)
            .ok_or(LoopError::InvalidDelay)
    }

    fn status(&self) -> LoopStatus {
        let st = self.state.borrow();
        if !st.calls.is_empty() {
            return LoopStatus::Ready;
        }
        if st.timers.peek().is_some_and(|t| t.deadline <= Instant::now()) {
            return LoopStatus::Ready;
        }
        if st.len() > 0 {
            LoopStatus::Waiting
        } else {
            LoopStatus::Idle
        }
    }
}

impl Default for SyncLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl CoopLoop for SyncLoop {
    fn call(&self, callback: LoopCallback) -> LoopResult<()> {
        self.check_open()?;
        self.state.borrow_mut().calls.push_back(callback);
        Ok(())
    }

    fn call_after(&self, delay: Duration, callback: LoopCallback) -> LoopResult<()> {
        self.check_open()?;
        let deadline = Self::deadline_after(delay)?;
        let mut st = self.state.borrow_mut();
        let seq = st.next_seq;
        st.next_seq += 1;
        st.timers.push(TimerOp {
            deadline,
            seq,
            callback,
        });
        Ok(())
    }

    fn wait_one(
        &self,
        handle: Arc<dyn WaitHandle>,
        timeout: Option<Duration>,
        callback: LoopCallback,
    ) -> LoopResult<()> {
        self.check_open()?;
        let deadline = timeout.map(Self::deadline_after).transpose()?;
        self.state.borrow_mut().waits.push(WaitOp {
            handle,
            deadline,
            callback,
        });
        Ok(())
    }

    fn run_ready(&self) -> LoopResult<LoopStatus> {
        let fired = self.take_matured(Instant::now())?;
        if !fired.is_empty() {
            ktrace!("loop step: firing {} operation(s)", fired.len());
        }
        for (callback, status) in fired {
            invoke_contained("loop callback", move || callback(status));
        }
        Ok(self.status())
    }

    fn park(&self, wake: &dyn WaitHandle, limit: Option<Duration>) -> LoopResult<()> {
        let (fds, timeout) = {
            let st = self.state.borrow();
            if !st.calls.is_empty() {
                return Ok(());
            }
            let mut fds = Vec::with_capacity(1 + st.waits.len());
            fds.push(wake.as_raw_fd());
            fds.extend(st.waits.iter().map(|w| w.handle.as_raw_fd()));

            let until_deadline = st
                .earliest_deadline()
                .map(|d| d.saturating_duration_since(Instant::now()));
            let timeout = match (limit, until_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            (fds, timeout)
        };

        let ready = poll_readable(&fds, timeout).map_err(LoopError::Os)?;
        if ready[0] {
            wake.reset().map_err(handle_error)?;
        }
        Ok(())
    }

    fn abort_all(&self) {
        self.closed.set(true);
        let aborted: Vec<LoopCallback> = {
            let mut st = self.state.borrow_mut();
            let mut all: Vec<LoopCallback> = st.calls.drain(..).collect();
            let timers = std::mem::take(&mut st.timers).into_sorted_vec();
            all.extend(timers.into_iter().rev().map(|t| t.callback));
            all.extend(st.waits.drain(..).map(|w| w.callback));
            all
        };
        for callback in aborted {
            invoke_contained("loop callback", move || callback(Err(LoopError::Aborted)));
        }
    }

    fn pending(&self) -> usize {
        self.state.borrow().len()
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        if !self.closed.get() {
            self.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> LoopCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let make = move |tag: &str| -> LoopCallback {
            let l = Arc::clone(&l);
            let tag = tag.to_string();
            Box::new(move |status: LoopResult<()>| {
                let entry = match status {
                    Ok(()) => tag,
                    Err(e) => format!("{}:{}", tag, e),
                };
                l.lock().unwrap().push(entry);
            })
        };
        (log, make)
    }

    #[test]
    fn test_calls_fire_in_order() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        lp.call(cb("a")).unwrap();
        lp.call(cb("b")).unwrap();
        assert_eq!(lp.pending(), 2);
        assert_eq!(lp.run_ready().unwrap(), LoopStatus::Idle);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_timers_fire_by_deadline_then_fifo() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        lp.call_after(Duration::from_millis(30), cb("late")).unwrap();
        lp.call_after(Duration::ZERO, cb("t1")).unwrap();
        lp.call_after(Duration::ZERO, cb("t2")).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(lp.run_ready().unwrap(), LoopStatus::Waiting);
        assert_eq!(*log.lock().unwrap(), vec!["t1", "t2"]);

        let wake = Event::new().unwrap();
        lp.park(&wake, None).unwrap();
        lp.run_ready().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["t1", "t2", "late"]);
    }

    #[test]
    fn test_registration_from_callback_is_deferred() {
        let lp = Arc::new(SyncLoop::new());
        let hits = Arc::new(Mutex::new(Vec::new()));
        // SyncLoop is not Sync; reach it through a raw pointer the callback
        // only uses while this thread is inside run_ready().
        let lp_ptr = Arc::as_ptr(&lp) as usize;
        let h = Arc::clone(&hits);
        lp.call(Box::new(move |_: LoopResult<()>| {
            h.lock().unwrap().push("outer");
            let lp = unsafe { &*(lp_ptr as *const SyncLoop) };
            let h2 = Arc::clone(&h);
            lp.call(Box::new(move |_: LoopResult<()>| h2.lock().unwrap().push("inner")))
                .unwrap();
        }))
        .unwrap();

        assert_eq!(lp.run_ready().unwrap(), LoopStatus::Ready);
        assert_eq!(*hits.lock().unwrap(), vec!["outer"]);
        assert_eq!(lp.run_ready().unwrap(), LoopStatus::Idle);
        assert_eq!(*hits.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_wait_one_signaled_and_timeout() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        let signaled = Arc::new(Event::new().unwrap());
        let silent = Arc::new(Event::new().unwrap());
        lp.wait_one(signaled.clone(), None, cb("sig")).unwrap();
        lp.wait_one(silent.clone(), Some(Duration::from_millis(200)), cb("quiet")).unwrap();

        assert_eq!(lp.run_ready().unwrap(), LoopStatus::Waiting);
        assert!(log.lock().unwrap().is_empty());

        signaled.signal().unwrap();
        let wake = Event::new().unwrap();
        lp.park(&wake, Some(Duration::from_secs(5))).unwrap();
        lp.run_ready().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["sig"]);
        assert!(signaled.is_signaled().unwrap(), "wait_one leaves the signal in place");

        lp.park(&wake, Some(Duration::from_secs(5))).unwrap();
        lp.run_ready().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["sig", "quiet:deadline exceeded"]);
        assert_eq!(lp.pending(), 0);
    }

    #[test]
    fn test_matured_waits_fire_in_registration_order() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        let events: Vec<Arc<Event>> = (0..3).map(|_| Arc::new(Event::new().unwrap())).collect();
        for (i, ev) in events.iter().enumerate() {
            lp.wait_one(ev.clone(), None, cb(&format!("w{}", i))).unwrap();
        }
        events[2].signal().unwrap();
        events[0].signal().unwrap();
        lp.run_ready().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["w0", "w2"]);
        assert_eq!(lp.pending(), 1);
    }

    /// Handle whose readiness check always fails.
    struct BrokenHandle(Event);

    impl WaitHandle for BrokenHandle {
        fn signal(&self) -> coworker_core::WorkerResult<()> {
            self.0.signal()
        }
        fn wait(&self, timeout: Option<Duration>) -> coworker_core::WorkerResult<bool> {
            self.0.wait(timeout)
        }
        fn is_signaled(&self) -> coworker_core::WorkerResult<bool> {
            Err(WorkerError::EventFailed(libc::EBADF))
        }
        fn reset(&self) -> coworker_core::WorkerResult<()> {
            self.0.reset()
        }
    }

    impl AsRawFd for BrokenHandle {
        fn as_raw_fd(&self) -> std::os::fd::RawFd {
            self.0.as_raw_fd()
        }
    }

    #[test]
    fn test_failed_readiness_check_keeps_every_operation() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        lp.call(cb("call")).unwrap();
        lp.call_after(Duration::ZERO, cb("timer")).unwrap();
        lp.wait_one(Arc::new(BrokenHandle(Event::new().unwrap())), None, cb("wait"))
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(lp.run_ready(), Err(LoopError::Os(libc::EBADF)));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(lp.pending(), 3);

        lp.abort_all();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "call:operation aborted",
                "timer:operation aborted",
                "wait:operation aborted"
            ]
        );
    }

    #[test]
    fn test_unschedulable_delay_is_an_error() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        assert_eq!(lp.call_after(Duration::MAX, cb("timer")), Err(LoopError::InvalidDelay));
        assert_eq!(
            lp.wait_one(Arc::new(Event::new().unwrap()), Some(Duration::MAX), cb("wait")),
            Err(LoopError::InvalidDelay)
        );
        assert_eq!(lp.pending(), 0);
        lp.abort_all();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_park_with_unrepresentable_limit() {
        let lp = SyncLoop::new();
        let wake = Event::new().unwrap();
        wake.signal().unwrap();
        lp.park(&wake, Some(Duration::MAX)).unwrap();
        assert!(!wake.is_signaled().unwrap());
    }

    #[test]
    fn test_park_returns_on_wake_and_consumes_it() {
        let lp = SyncLoop::new();
        let wake = Arc::new(Event::new().unwrap());
        let w = Arc::clone(&wake);
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            w.signal().unwrap();
        });
        let start = Instant::now();
        lp.park(wake.as_ref(), Some(Duration::from_secs(5))).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!wake.is_signaled().unwrap());
        t.join().unwrap();
    }

    #[test]
    fn test_park_respects_limit() {
        let lp = SyncLoop::new();
        let wake = Event::new().unwrap();
        let start = Instant::now();
        lp.park(&wake, Some(Duration::from_millis(25))).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_abort_all_and_closed() {
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        lp.call_after(Duration::from_secs(60), cb("timer")).unwrap();
        lp.wait_one(Arc::new(Event::new().unwrap()), None, cb("wait")).unwrap();
        lp.abort_all();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["timer:operation aborted", "wait:operation aborted"]
        );
        assert_eq!(lp.call(cb("late")), Err(LoopError::Aborted));
    }

    #[test]
    fn test_drop_aborts_outstanding() {
        let (log, cb) = recorder();
        {
            let lp = SyncLoop::new();
            lp.call_after(Duration::from_secs(60), cb("t")).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["t:operation aborted"]);
    }

    #[test]
    fn test_panicking_loop_callback_is_contained() {
        coworker_core::kprint::set_log_level(coworker_core::kprint::LogLevel::Off);
        let lp = SyncLoop::new();
        let (log, cb) = recorder();
        lp.call(Box::new(|_: LoopResult<()>| panic!("loop cb"))).unwrap();
        lp.call(cb("after")).unwrap();
        lp.run_ready().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }
}
