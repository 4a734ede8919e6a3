//! Submission and round-trip cost of the worker queue.

use coworker_runtime::{Worker, WorkerOptions};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

fn started(name: &str) -> Worker {
    let w = Worker::new(WorkerOptions::new(name)).expect("worker");
    w.start().expect("start");
    w
}

fn bench_enqueue(c: &mut Criterion) {
    let w = started("bench-enqueue");
    let counter = Arc::new(AtomicUsize::new(0));

    c.bench_function("enqueue_callback", |b| {
        b.iter(|| {
            let counter = Arc::clone(&counter);
            w.enqueue_callback(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        })
    });

    w.kill();
    w.wait_for_shutdown();
}

/// Submission cost with a backlog already queued. The worker is never
/// started, so the pending queue only grows.
fn bench_enqueue_at_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_at_depth");
    for depth in [0usize, 1_000, 100_000] {
        let w = Worker::new(WorkerOptions::new("bench-depth")).expect("worker");
        for _ in 0..depth {
            w.enqueue_callback(|| {});
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| w.enqueue_callback(|| {}))
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let w = started("bench-rtt");

    c.bench_function("enqueue_round_trip", |b| {
        b.iter(|| {
            let (tx, rx) = mpsc::channel();
            w.enqueue_callback(move || {
                let _ = tx.send(());
            });
            rx.recv().expect("worker alive");
        })
    });

    c.bench_function("batch_1000_round_trip", |b| {
        b.iter_batched(
            || Arc::new(AtomicUsize::new(0)),
            |counter| {
                for _ in 0..1000 {
                    let counter = Arc::clone(&counter);
                    w.enqueue_callback(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
                let (tx, rx) = mpsc::channel();
                w.enqueue_callback(move || {
                    let _ = tx.send(());
                });
                rx.recv().expect("worker alive");
                assert_eq!(counter.load(Ordering::Relaxed), 1000);
            },
            BatchSize::SmallInput,
        )
    });

    w.kill();
    w.wait_for_shutdown();
}

criterion_group!(benches, bench_enqueue, bench_enqueue_at_depth, bench_round_trip);
criterion_main!(benches);
