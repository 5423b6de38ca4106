//! Throughput benchmarks: scalar push/pop round-trips, bulk draining, and
//! pushes under a concurrent draining consumer.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use byteq::Queue;

const PAYLOAD: &[u8] = b"0123456789abcdef";

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop");
    group.throughput(Throughput::Bytes(PAYLOAD.len() as u64));

    group.bench_function("scalar", |b| {
        let queue: Queue<u64, 1024, 16384> = Queue::new();
        let mut buf = [0u8; 64];
        b.iter(|| {
            queue.try_push(black_box(PAYLOAD)).unwrap();
            let n = queue.try_pop(&mut buf).unwrap();
            black_box(&buf[..n]);
        });
    });

    group.finish();
}

fn bench_bulk_drain(c: &mut Criterion) {
    const BATCH: usize = 64;

    let mut group = c.benchmark_group("bulk_drain");
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("pop_bulk", |b| {
        let queue: Queue<u64, 1024, 16384> = Queue::new();
        let mut buf = [0u8; 64];
        b.iter(|| {
            for _ in 0..BATCH {
                queue.try_push(PAYLOAD).unwrap();
            }
            let mut bulk = queue.pop_bulk();
            while let Ok(n) = bulk.pop(&mut buf) {
                black_box(&buf[..n]);
            }
        });
    });

    group.bench_function("scalar_drain", |b| {
        let queue: Queue<u64, 1024, 16384> = Queue::new();
        let mut buf = [0u8; 64];
        b.iter(|| {
            for _ in 0..BATCH {
                queue.try_push(PAYLOAD).unwrap();
            }
            while let Ok(n) = queue.try_pop(&mut buf) {
                black_box(&buf[..n]);
            }
        });
    });

    group.finish();
}

fn bench_contended_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_push");
    group.throughput(Throughput::Elements(1));

    group.bench_function("one_draining_consumer", |b| {
        let queue: Arc<Queue<u64, 1024, 16384>> = Arc::new(Queue::new());
        let stop = Arc::new(AtomicBool::new(false));

        let drain_queue = Arc::clone(&queue);
        let drain_stop = Arc::clone(&stop);
        let consumer = thread::spawn(move || {
            let mut buf = [0u8; 64];
            while !drain_stop.load(Ordering::Relaxed) {
                if drain_queue.try_pop(&mut buf).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        b.iter(|| {
            while queue.try_push(black_box(PAYLOAD)).is_err() {
                std::hint::spin_loop();
            }
        });

        stop.store(true, Ordering::Relaxed);
        consumer.join().unwrap();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_bulk_drain,
    bench_contended_push
);
criterion_main!(benches);
