//! Stress test - many producers, one worker
//!
//! Hammers a single worker with callbacks from several threads and checks
//! that every callback ran exactly once.

use coworker::{Worker, WorkerOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

fn main() {
    println!("=== Coworker Stress Test ===\n");

    coworker::init_logging();

    let per_producer: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);
    let producers: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let total = per_producer * producers;

    println!("{} producers x {} callbacks...", producers, per_producer);

    let worker = match coworker::start(WorkerOptions::from_env("stress")) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            eprintln!("Failed to start worker: {}", e);
            std::process::exit(1);
        }
    };

    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let threads: Vec<_> = (0..producers)
        .map(|_| {
            let handle = worker.handle();
            let completed = Arc::clone(&completed);
            std::thread::spawn(move || {
                for _ in 0..per_producer {
                    let completed = Arc::clone(&completed);
                    handle.enqueue_callback(move || {
                        completed.fetch_add(1, Ordering::Relaxed);
                    });
                }
            })
        })
        .collect();
    for t in threads {
        let _ = t.join();
    }

    let submit_time = start.elapsed();
    println!("\nSubmit time: {:?}", submit_time);
    println!("Submit rate: {:.0} callbacks/sec",
        total as f64 / submit_time.as_secs_f64());

    // Wait for completion
    println!("\nWaiting for completion...");
    let (tx, rx) = mpsc::channel();
    worker.enqueue_callback(move || {
        let _ = tx.send(());
    });
    if rx.recv_timeout(Duration::from_secs(30)).is_err() {
        println!("Timeout! Only {}/{} completed", completed.load(Ordering::Relaxed), total);
    }

    let total_time = start.elapsed();
    worker.kill();
    worker.wait_for_shutdown();

    let done = completed.load(Ordering::Relaxed) as usize;
    println!("\n=== Results ===");
    println!("Total callbacks: {}", total);
    println!("Completed:       {}", done);
    println!("Total time:      {:?}", total_time);
    println!("Throughput:      {:.0} callbacks/sec",
        total as f64 / total_time.as_secs_f64());

    if done != total {
        eprintln!("FAILED: {} callbacks lost", total - done);
        std::process::exit(1);
    }
    println!("\n=== Stress Test Complete ===");
}
