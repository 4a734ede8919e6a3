//! The cooperative worker
//!
//! One dedicated OS thread that runs submitted callbacks and drives a
//! cooperative loop, with deterministic ordering on that thread and safe
//! submission from any thread.
//!
//! ```text
//!  any thread                         worker thread
//!  ──────────                         ─────────────
//!  enqueue_callback(cb)               loop {
//!    lock { pending.push(cb) }          lock { swap(pending, next); kill? }
//!    signal_transact ───────────┐       run every cb in next, in order
//!                               │       loop.run_ready()   (matured async ops)
//!  kill()                       │       if kill: break
//!    lock { kill = true }       │       if idle: loop.park(signal_transact)
//!    signal_transact ───────────┤     }
//!                               └───▶ abort loop ops, drop leftovers
//!  wait_for_shutdown()                  state = Ended
//!    wait(signal_ended) ◀────────────── signal_ended
//! ```
//!
//! The lock covers the pending queue and the kill flag only. `next` and the
//! loop belong to the worker thread and are never shared.

use crate::config::WorkerOptions;
use crate::current;
use crate::event::Event;
use crate::sync_loop::SyncLoop;

use coworker_core::callback::{invoke_contained, Callback};
use coworker_core::error::{WorkerError, WorkerResult};
use coworker_core::kprint;
use coworker_core::state::{AtomicWorkerState, WorkerState};
use coworker_core::traits::{CoopLoop, LoopStatus, WaitHandle};
use coworker_core::{kdebug, kerror, kwarn};

use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Builds the worker's cooperative loop. Called by `start()` on the
/// caller's thread; the loop is then moved onto the worker thread.
pub type LoopFactory = Box<dyn Fn() -> WorkerResult<Box<dyn CoopLoop + Send>> + Send + Sync>;

/// State touched from both sides of the worker. Guarded by one lock.
struct Inbox {
    pending: Vec<Callback>,
    kill: bool,
    /// Set once the run body has exited; later submissions are dropped.
    closed: bool,
}

struct Shared {
    name: String,
    inbox: Mutex<Inbox>,
    signal_transact: Event,
    signal_ended: Event,
    state: AtomicWorkerState,
    last_error: Mutex<Option<WorkerError>>,
}

// Callbacks never run under these locks, so a poisoned lock still holds
// consistent data.
fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn enqueue(&self, callback: Callback) {
        let rejected = {
            let mut inbox = relock(&self.inbox);
            if inbox.closed {
                Some(callback)
            } else {
                inbox.pending.push(callback);
                None
            }
        };
        if let Some(callback) = rejected {
            kdebug!("worker {}: ended, dropping submitted callback", self.name);
            drop(callback);
            return;
        }
        if let Err(e) = self.signal_transact.signal() {
            kerror!("worker {}: transact signal failed: {}", self.name, e);
        }
    }

    fn kill(&self) {
        relock(&self.inbox).kill = true;
        self.state.transition(WorkerState::Started, WorkerState::Stopping);
        if let Err(e) = self.signal_transact.signal() {
            kerror!("worker {}: transact signal failed: {}", self.name, e);
        }
    }

    /// Keep the first fatal error only.
    fn record(&self, err: WorkerError) {
        let mut last = relock(&self.last_error);
        if last.is_none() {
            *last = Some(err);
        }
    }

    /// Record the first fatal error and move to `Stopping`.
    fn fail(&self, err: WorkerError) {
        kerror!("worker {}: fatal: {}", self.name, err);
        self.record(err);
        self.state.transition(WorkerState::Started, WorkerState::Stopping);
    }
}

/// Cheap, cloneable submission handle for a worker.
///
/// Safe to move to other threads and to capture in callbacks, including
/// callbacks running on the same worker.
#[derive(Clone)]
pub struct WorkerHandle {
    shared: Arc<Shared>,
}

impl WorkerHandle {
    /// Queue `f` to run on the worker thread. Never waits for the worker;
    /// only contends briefly for the queue lock.
    ///
    /// Callbacks queued after `kill()` are accepted but may never run.
    /// Once the worker has ended they are dropped on the spot.
    pub fn enqueue_callback<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue(Box::new(f));
    }

    /// Request shutdown. Idempotent.
    pub fn kill(&self) {
        self.shared.kill();
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    fn is(&self, shared: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state.load())
            .finish()
    }
}

/// Single-thread cooperative worker.
///
/// Lifecycle: `new` → `start` → (`enqueue_callback`)* → `kill` →
/// `wait_for_shutdown`. Single-use: once ended it cannot be restarted.
///
/// # Preconditions
///
/// - `wait_for_shutdown()` must not be called from the worker's own
///   thread; doing so panics instead of deadlocking.
/// - Dropping a running worker kills it and waits for the thread to exit.
pub struct Worker {
    options: WorkerOptions,
    shared: Arc<Shared>,
    factory: LoopFactory,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Worker driving the default `SyncLoop`.
    pub fn new(options: WorkerOptions) -> WorkerResult<Self> {
        Self::with_loop(options, || Ok(SyncLoop::new()))
    }

    /// Worker driving a loop built by `factory` at `start()`.
    pub fn with_loop<L, F>(options: WorkerOptions, factory: F) -> WorkerResult<Self>
    where
        L: CoopLoop + Send + 'static,
        F: Fn() -> WorkerResult<L> + Send + Sync + 'static,
    {
        options.validate()?;
        let shared = Arc::new(Shared {
            name: options.name.clone(),
            inbox: Mutex::new(Inbox {
                pending: Vec::new(),
                kill: false,
                closed: false,
            }),
            signal_transact: Event::new()?,
            signal_ended: Event::new()?,
            state: AtomicWorkerState::new(WorkerState::Created),
            last_error: Mutex::new(None),
        });
        let factory: LoopFactory =
            Box::new(move || factory().map(|lp| Box::new(lp) as Box<dyn CoopLoop + Send>));
        Ok(Self {
            options,
            shared,
            factory,
            thread: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// Fatal error that ended the run body early, if any.
    ///
    /// Meaningful once `wait_for_shutdown()` has returned.
    pub fn last_error(&self) -> Option<WorkerError> {
        relock(&self.shared.last_error).clone()
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Build the loop and spawn the worker thread.
    ///
    /// Returns once the thread exists, not once it is running. On failure
    /// the worker stays in `Created` and may be started again or dropped.
    pub fn start(&self) -> WorkerResult<()> {
        if !self
            .shared
            .state
            .transition(WorkerState::Created, WorkerState::Started)
        {
            return Err(WorkerError::AlreadyStarted);
        }

        let lp = match (self.factory)() {
            Ok(lp) => lp,
            Err(e) => {
                self.shared.state.store(WorkerState::Created);
                return Err(e);
            }
        };

        let mut builder = thread::Builder::new().name(self.options.thread_name());
        if let Some(size) = self.options.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = self.handle();
        let park_timeout = self.options.park_timeout;
        match builder.spawn(move || run(handle, lp, park_timeout)) {
            Ok(join) => {
                *relock(&self.thread) = Some(join);
                kdebug!("worker {}: started", self.shared.name);
                Ok(())
            }
            Err(e) => {
                self.shared.state.store(WorkerState::Created);
                kerror!("worker {}: spawn failed: {}", self.shared.name, e);
                Err(WorkerError::SpawnFailed(e.kind()))
            }
        }
    }

    /// Request shutdown. Idempotent, safe before `start` and after the
    /// worker ended. Does not wait.
    pub fn kill(&self) {
        self.shared.kill();
    }

    /// Queue `f` to run on the worker thread. See
    /// [`WorkerHandle::enqueue_callback`].
    pub fn enqueue_callback<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue(Box::new(f));
    }

    /// Block until the worker thread has fully exited.
    ///
    /// Returns immediately if the worker was never started. There is no
    /// timeout; pair with `kill()` to bound it.
    ///
    /// # Panics
    ///
    /// When called from the worker's own thread.
    pub fn wait_for_shutdown(&self) {
        if self.state() == WorkerState::Created {
            kwarn!("worker {}: wait_for_shutdown() before start()", self.shared.name);
            return;
        }
        assert!(
            !self.on_worker_thread(),
            "worker {}: wait_for_shutdown() called from the worker thread",
            self.shared.name
        );

        // Manual-reset: put the signal back for any other waiter.
        match self.shared.signal_ended.wait(None) {
            Ok(_) => {
                let _ = self.shared.signal_ended.signal();
            }
            Err(e) => {
                kerror!("worker {}: ended wait failed, joining: {}", self.shared.name, e);
            }
        }

        let join = relock(&self.thread).take();
        if let Some(join) = join {
            if join.join().is_err() {
                self.shared.record(WorkerError::Panicked);
            }
        }
    }

    fn on_worker_thread(&self) -> bool {
        current::handle().is_some_and(|h| h.is(&self.shared))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !self.state().is_running() {
            return;
        }
        self.kill();
        if self.on_worker_thread() {
            kwarn!("worker {}: dropped on its own thread, not waiting", self.shared.name);
            return;
        }
        self.wait_for_shutdown();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state.load())
            .finish()
    }
}

/// Raises the ended signal exactly once when the run body leaves, on
/// normal exit, fatal error, or unwind.
struct EndedGuard {
    shared: Arc<Shared>,
}

impl Drop for EndedGuard {
    fn drop(&mut self) {
        self.shared.state.store(WorkerState::Ended);
        if let Err(e) = self.shared.signal_ended.signal() {
            kerror!("worker {}: ended signal failed: {}", self.shared.name, e);
        }
        kprint::clear_context_name();
    }
}

/// Worker thread entry point.
fn run(handle: WorkerHandle, lp: Box<dyn CoopLoop + Send>, park_timeout: Option<Duration>) {
    let shared = Arc::clone(&handle.shared);
    let _ended = EndedGuard {
        shared: Arc::clone(&shared),
    };
    kprint::set_context_name(&shared.name);
    kdebug!(
        "run body on pthread {:#x}",
        nix::sys::pthread::pthread_self() as usize
    );

    let lp: Rc<dyn CoopLoop + Send> = Rc::from(lp);
    let guard = current::enter(handle, Rc::clone(&lp));

    let mut next: Vec<Callback> = Vec::new();
    let mut batches: u64 = 0;
    let mut executed: u64 = 0;

    loop {
        // Swap, not copy: `next` is empty here and hands its capacity back.
        let kill = {
            let mut inbox = relock(&shared.inbox);
            std::mem::swap(&mut inbox.pending, &mut next);
            inbox.kill
        };

        let batch = next.len();
        if batch > 0 {
            batches += 1;
            executed += batch as u64;
        }
        for callback in next.drain(..) {
            invoke_contained("callback", callback);
        }

        let status = match lp.run_ready() {
            Ok(status) => status,
            Err(e) => {
                shared.fail(e.into());
                break;
            }
        };

        if kill {
            break;
        }

        if batch == 0 && status != LoopStatus::Ready {
            if let Err(e) = lp.park(&shared.signal_transact, park_timeout) {
                shared.fail(e.into());
                break;
            }
        }
    }

    kdebug!("leaving: {} callbacks in {} batches", executed, batches);

    lp.abort_all();
    drop(guard);
    drop(lp);

    // Leftovers are dropped outside the lock; their captures may run
    // arbitrary Drop code.
    let leftovers = {
        let mut inbox = relock(&shared.inbox);
        inbox.closed = true;
        std::mem::take(&mut inbox.pending)
    };
    if !leftovers.is_empty() {
        kdebug!("dropping {} callback(s) queued after kill", leftovers.len());
    }
    drop(leftovers);
}
