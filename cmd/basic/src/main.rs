//! Basic coworker example
//!
//! Submits callbacks from the main thread, arms a timer and waits on an
//! event from inside the worker, then shuts down.
//!
//! # Environment Variables
//!
//! - `CWK_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `CWK_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `CWK_PARK_TIMEOUT_MS=50` - Bound on one idle park

use coworker::{current, Event, LoopResult, WaitHandle, Worker, WorkerOptions};
use coworker::{kinfo, kdebug, kwarn};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
// CWK_LOG_LEVEL=debug CWK_FLUSH_EPRINT=1 cargo run -p coworker-basic
fn main() {
    println!("=== Coworker Basic Example ===\n");

    // Initialize logging (reads CWK_FLUSH_EPRINT and CWK_LOG_LEVEL env vars)
    coworker::init_logging();

    let options = WorkerOptions::from_env("basic");
    options.print();

    let worker = match Worker::new(options) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to create worker: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = worker.start() {
        eprintln!("Failed to start worker: {}", e);
        std::process::exit(1);
    }

    // Plain callbacks, run in submission order
    for i in 1..=3 {
        worker.enqueue_callback(move || {
            println!("callback {} on {:?}", i, current::name());
        });
    }

    // A timer armed from inside the worker
    let (timer_tx, timer_rx) = mpsc::channel();
    worker.enqueue_callback(move || {
        current::with_loop(|lp| {
            lp.call_after(
                Duration::from_millis(20),
                Box::new(move |status: LoopResult<()>| {
                    kdebug!("timer fired: {:?}", status);
                    let _ = timer_tx.send(status);
                }),
            )
        });
    });

    // A wait on an event signaled from this thread
    let device = match Event::new() {
        Ok(e) => Arc::new(e),
        Err(e) => {
            eprintln!("Failed to create event: {}", e);
            std::process::exit(1);
        }
    };
    let (wait_tx, wait_rx) = mpsc::channel();
    let d = Arc::clone(&device);
    worker.enqueue_callback(move || {
        current::with_loop(|lp| {
            lp.wait_one(
                d,
                Some(Duration::from_secs(5)),
                Box::new(move |status: LoopResult<()>| {
                    let _ = wait_tx.send(status);
                }),
            )
        });
    });

    std::thread::sleep(Duration::from_millis(10));
    if let Err(e) = device.signal() {
        kwarn!("signal failed: {}", e);
    }

    let timeout = Duration::from_secs(10);
    println!("timer:  {:?}", timer_rx.recv_timeout(timeout));
    println!("wait:   {:?}", wait_rx.recv_timeout(timeout));

    worker.kill();
    worker.wait_for_shutdown();
    kinfo!("worker ended, state={}", worker.state());
    if let Some(e) = worker.last_error() {
        println!("last error: {}", e);
    }

    println!("\n=== Example Complete ===");
}
