//! # Rate Limiter Benchmarks
//!
//! Hot-path costs of the bucket and the refill scheduler.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use pacer::{BlockingBucket, Per, RateLimit, RefillScheduler, SchedulerConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Uncontended try_consume on a bucket that never runs dry
fn bench_try_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_consume");

    for n in [1u64, 10, 100] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let bucket = BlockingBucket::new(1.0, u64::MAX / 2).unwrap();
            b.iter(|| std::hint::black_box(bucket.try_consume(n)));
        });
    }

    group.finish();
}

/// A consume that succeeds immediately, through the blocking path
fn bench_consume_available(c: &mut Criterion) {
    c.bench_function("consume_available", |b| {
        let bucket = BlockingBucket::new(1.0, u64::MAX / 2).unwrap();
        b.iter(|| std::hint::black_box(bucket.consume(1, Some(Duration::ZERO))));
    });
}

/// fill with and without parked waiters to wake
fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill");

    group.bench_function("full_bucket", |b| {
        let bucket = BlockingBucket::new(1.0, 100).unwrap();
        b.iter(|| bucket.fill(1));
    });

    group.bench_function("drained_bucket", |b| {
        b.iter_batched(
            || {
                let bucket = BlockingBucket::new(1.0, 100).unwrap();
                assert!(bucket.try_consume(100));
                bucket
            },
            |bucket| bucket.fill(1),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Contended try_wait from several threads on one limit
fn bench_concurrent_try_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_try_wait");
    let scheduler = RefillScheduler::new();

    for num_threads in [2, 4, 8] {
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_threads", num_threads)),
            &num_threads,
            |b, &num_threads| {
                let limit = RateLimit::new(Per::second(1_000_000), u64::MAX / 2, &scheduler)
                    .unwrap();

                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let limit = limit.clone();
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    std::hint::black_box(limit.try_wait(1));
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Registering buckets with a running scheduler
fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");

    for buckets in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(buckets as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(buckets),
            &buckets,
            |b, &buckets| {
                b.iter_batched(
                    || {
                        let scheduler = RefillScheduler::with_config(
                            SchedulerConfig::default().with_thread_name("bench-refill"),
                        );
                        let pool: Vec<_> = (0..buckets)
                            .map(|_| Arc::new(BlockingBucket::new(1.0, 1).unwrap()))
                            .collect();
                        (scheduler, pool)
                    },
                    |(scheduler, pool)| {
                        for bucket in &pool {
                            scheduler.register(bucket).unwrap();
                        }
                        (scheduler, pool)
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_try_consume,
    bench_consume_available,
    bench_fill,
    bench_concurrent_try_wait,
    bench_register
);
criterion_main!(benches);
