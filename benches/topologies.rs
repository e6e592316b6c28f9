//! Broadcast, merge and worker pool throughput
//!
//! Each iteration runs one full stop cycle of `ELEMENTS` sequences through
//! the topology, so coordinators are reused across iterations exactly as a
//! long-running service would reuse them.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use ringcond::{
    build_broadcast, build_merger, build_worker_pool, Consumer, CoordinatorConfig, SpinThenYield,
    ACQUIRE_STOP_REQUEST,
};

const BUFFER_SIZE: usize = 1024;
const ELEMENTS: u64 = 10_000;

fn drain<C: Consumer>(consumer: &mut C) -> u64 {
    let mut count = 0;
    loop {
        let available = consumer.available_to();
        if available == ACQUIRE_STOP_REQUEST {
            return count;
        }
        count += (available - consumer.batch_start() + 1) as u64;
        consumer.notify_processed();
    }
}

fn broadcast_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(ELEMENTS));

    for consumer_count in [1usize, 3] {
        let config = CoordinatorConfig::with_buffer_size(BUFFER_SIZE);
        let (mut producer, mut consumers) =
            build_broadcast(&config, consumer_count, SpinThenYield::default()).unwrap();

        group.bench_function(BenchmarkId::new("consumers", consumer_count), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    thread::scope(|s| {
                        for consumer in consumers.iter_mut() {
                            s.spawn(move || assert_eq!(drain(consumer), ELEMENTS));
                        }
                        for _ in 0..ELEMENTS {
                            let sequence = producer.claim(1);
                            producer.publish(sequence);
                        }
                        producer.publish_stop();
                    });
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

fn merger_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("merger");
    group.measurement_time(Duration::from_secs(5));

    for producer_count in [2usize, 4] {
        let config = CoordinatorConfig::with_buffer_size(BUFFER_SIZE);
        let (mut merger, mut producers) =
            build_merger(&config, producer_count, SpinThenYield::default()).unwrap();

        group.throughput(Throughput::Elements(ELEMENTS * producer_count as u64));
        group.bench_function(BenchmarkId::new("producers", producer_count), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    thread::scope(|s| {
                        for producer in producers.iter_mut() {
                            s.spawn(move || {
                                for _ in 0..ELEMENTS {
                                    let sequence = producer.claim(1);
                                    producer.publish(sequence);
                                }
                                producer.publish_stop();
                            });
                        }
                        assert_eq!(drain(&mut merger), ELEMENTS * producer_count as u64);
                    });
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

fn worker_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(ELEMENTS));

    for worker_count in [1usize, 4] {
        let config = CoordinatorConfig::with_buffer_size(BUFFER_SIZE);
        let mut pool = build_worker_pool(&config, SpinThenYield::default()).unwrap();
        let mut workers: Vec<_> = (0..worker_count).map(|_| pool.new_worker()).collect();
        let processed = AtomicU64::new(0);

        group.bench_function(BenchmarkId::new("workers", worker_count), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    processed.store(0, Ordering::Relaxed);
                    thread::scope(|s| {
                        for worker in workers.iter_mut() {
                            let processed = &processed;
                            s.spawn(move || {
                                processed.fetch_add(drain(worker), Ordering::Relaxed);
                            });
                        }
                        for _ in 0..ELEMENTS {
                            let sequence = pool.next();
                            pool.publish(sequence);
                        }
                        pool.publish_stop();
                    });
                    assert_eq!(processed.load(Ordering::Relaxed), ELEMENTS);
                }
                start.elapsed()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    broadcast_benchmark,
    merger_benchmark,
    worker_pool_benchmark
);
criterion_main!(benches);
