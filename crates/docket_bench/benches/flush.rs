//! Lazy batch flush benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use docket_bench::{connect, seeded_server, user_key};
use docket_client::IndexQuery;
use docket_server::ServerConfig;
use serde_json::{json, Value};

/// Benchmark flushing batches of loads.
fn bench_flush_loads(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_loads");

    for count in [1usize, 10, 100] {
        let server = seeded_server(count, ServerConfig::default());
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let session = connect(&server);
                    let handles: Vec<_> = (0..count)
                        .map(|i| session.lazily().load::<Value>(&user_key(i)))
                        .collect();
                    (session, handles)
                },
                |(session, handles)| {
                    let report = session.execute_all_pending_lazy_operations().unwrap();
                    black_box((report, handles));
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark a query batch that needs one stale retry.
fn bench_stale_retry(c: &mut Criterion) {
    let mut group = c.benchmark_group("stale_retry");
    let server = seeded_server(100, ServerConfig::default().with_stale_reads_before_catch_up(1));

    group.bench_function("query_100", |b| {
        b.iter_batched(
            || {
                // A fresh write leaves the index one stale read behind
                server.put("users/new", json!({"name": "new", "role": "admin"})).unwrap();
                let session = connect(&server);
                let lazy = session.lazily().query::<Value>(
                    "users",
                    IndexQuery::new("role:admin").wait_for_non_stale_results(),
                );
                (session, lazy)
            },
            |(session, lazy)| {
                let results = session.value(&lazy).unwrap();
                black_box(results);
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark loads answered from the session tracker.
fn bench_tracked_loads(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracked_loads");
    let server = seeded_server(100, ServerConfig::default());
    let session = connect(&server);
    let keys: Vec<String> = (0..100).map(user_key).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let warm = session.lazily().load_many::<Value>(&key_refs);
    session.value(&warm).unwrap();

    group.bench_function("load_100", |b| {
        b.iter(|| {
            for key in &keys {
                let lazy = session.lazily().load::<Value>(key);
                black_box(session.value(&lazy).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_flush_loads, bench_stale_retry, bench_tracked_loads);
criterion_main!(benches);
