//! Throughput benchmarks for the DriftKV storage engine.

use chrono::TimeDelta;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use driftkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

fn bench_put(c: &mut Criterion) {
    let engine = StorageEngine::new();

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.put(format!("key:{}", i), "small_value").unwrap();
            i += 1;
        });
    });

    group.bench_function("put_1kb", |b| {
        let value = "x".repeat(1024);
        let mut i = 0u64;
        b.iter(|| {
            engine.put(format!("key:{}", i), value.as_str()).unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = StorageEngine::new();
    for i in 0..100_000 {
        engine.put(format!("key:{}", i), format!("value:{}", i)).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let _ = black_box(engine.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let _ = black_box(engine.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// 80% reads, 20% writes
fn bench_mixed(c: &mut Criterion) {
    let engine = StorageEngine::new();
    for i in 0..10_000 {
        engine.put(format!("key:{}", i), format!("value:{}", i)).unwrap();
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                engine.put(format!("new:{}", i), "value").unwrap();
            } else {
                let _ = black_box(engine.get(&format!("key:{}", i % 10_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            engine.put(key.as_str(), "value").unwrap();
                            let _ = engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// TTL writes pay for keeping the expiry index sorted.
fn bench_expiry(c: &mut Criterion) {
    let engine = StorageEngine::new();

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            // Spread deadlines so inserts land all over the index
            let ttl = TimeDelta::seconds(3600 + (i % 997) as i64);
            engine.put_with_ttl(format!("ttl:{}", i), "value", ttl).unwrap();
            i += 1;
        });
    });

    for i in 0..10_000 {
        engine.put(format!("expire:{}", i), "value").unwrap();
    }
    group.bench_function("set_ttl_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine
                .set_ttl(&format!("expire:{}", i % 10_000), TimeDelta::seconds(3600))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// A sweep that removes 1,000 of 10,000 indexed keys.
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    group.bench_function("sweep_1k_of_10k", |b| {
        b.iter_batched(
            || {
                let engine = StorageEngine::new();
                for i in 0..10_000 {
                    let ttl = if i % 10 == 0 {
                        TimeDelta::seconds(-1)
                    } else {
                        TimeDelta::seconds(3600)
                    };
                    engine.put_with_ttl(format!("key:{}", i), "value", ttl).unwrap();
                }
                engine
            },
            |engine| black_box(engine.sweep_expired()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
    bench_sweep,
);

criterion_main!(benches);
