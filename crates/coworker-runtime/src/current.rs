//! Thread-local worker context
//!
//! While a worker's run body executes, its thread carries a context with the
//! worker's submission handle and its cooperative loop. Callbacks use it to
//! reach "their" worker without capturing anything:
//!
//! ```ignore
//! worker.enqueue_callback(|| {
//!     coworker::current::with_loop(|lp| {
//!         lp.call_after(Duration::from_millis(10), Box::new(|_| kinfo!("tick")))
//!     });
//! });
//! ```
//!
//! The loop never leaves the worker thread: it is held in an `Rc` and only
//! lent out by reference.

use crate::worker::WorkerHandle;

use coworker_core::traits::CoopLoop;

use std::cell::RefCell;
use std::rc::Rc;

struct Context {
    handle: WorkerHandle,
    lp: Rc<dyn CoopLoop + Send>,
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Clears the context when the run body leaves.
pub(crate) struct ContextGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let ctx = CURRENT.with(|c| c.borrow_mut().take());
        drop(ctx);
    }
}

/// Install the worker context on this thread.
pub(crate) fn enter(handle: WorkerHandle, lp: Rc<dyn CoopLoop + Send>) -> ContextGuard {
    CURRENT.with(|c| *c.borrow_mut() = Some(Context { handle, lp }));
    ContextGuard {
        _not_send: std::marker::PhantomData,
    }
}

/// True on a worker thread while its run body executes.
pub fn is_worker_thread() -> bool {
    CURRENT.with(|c| c.borrow().is_some())
}

/// Name of the worker running on this thread.
pub fn name() -> Option<String> {
    CURRENT.with(|c| c.borrow().as_ref().map(|ctx| ctx.handle.name().to_string()))
}

/// Submission handle of the worker running on this thread.
pub fn handle() -> Option<WorkerHandle> {
    CURRENT.with(|c| c.borrow().as_ref().map(|ctx| ctx.handle.clone()))
}

/// Run `f` against this worker's cooperative loop. `None` off-worker.
///
/// The thread-local borrow is released before `f` runs, so `f` may itself
/// call back into `current`.
pub fn with_loop<R, F>(f: F) -> Option<R>
where
    F: FnOnce(&dyn CoopLoop) -> R,
{
    let lp = CURRENT.with(|c| c.borrow().as_ref().map(|ctx| Rc::clone(&ctx.lp)))?;
    Some(f(&*lp))
}
