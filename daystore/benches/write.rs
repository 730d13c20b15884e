//! Microbenchmarks for the append and point-query paths.
//!
//! Run with: `cargo bench -p daystore -- write`

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{
    BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use daystore::config::EngineConfig;
use daystore::{DayBoundary, Engine, Registry};
use tempfile::tempdir;

/// 2023-11-14T00:00:00Z
const BASE_DAY: i64 = 1_699_920_000;

/// Seconds between successive writes; keeps each day file well below the
/// u32 offset limit on long runs.
const SECOND_STEP: i64 = 97;

/// Opens an engine over a fresh temp directory with a realistic payload.
fn setup_engine() -> (Engine<Vec<u8>>, Arc<Registry>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let registry = Registry::new(Duration::from_secs(3600)).unwrap();
    let config = EngineConfig::new(temp_dir.path().join("bench_store"))
        .with_day_boundary(DayBoundary::Utc)
        .with_retention(daystore::config::HUNDRED_YEARS);
    let engine = Engine::open_in(&registry, config).unwrap();
    (engine, registry, temp_dir)
}

/// A ~200 byte process snapshot payload.
fn payload(i: usize) -> Vec<u8> {
    format!(
        r#"{{"pid":{i},"name":"worker-{i}","state":"S","cpu":0.42,"rss":104857600,"threads":12,"cmdline":"/usr/bin/worker --id {i} --queue default"}}"#
    )
    .into_bytes()
}

fn bench_write_single(c: &mut Criterion) {
    let (engine, _registry, _dir) = setup_engine();
    let record = vec![payload(1)];
    let mut ts = BASE_DAY;

    c.bench_function("write/single_record", |b| {
        b.iter(|| {
            ts += SECOND_STEP;
            engine
                .write_unix(black_box(ts), black_box(&record))
                .unwrap();
        });
    });
}

fn bench_write_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("write/batch_size");

    for size in [1usize, 10, 50] {
        let (engine, _registry, _dir) = setup_engine();
        let batch: Vec<Vec<u8>> = (0..size).map(payload).collect();
        let mut ts = BASE_DAY;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                ts += SECOND_STEP;
                engine
                    .write_unix(black_box(ts), black_box(&batch))
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_query_at(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_at/chain_length");

    for length in [1usize, 10, 100] {
        let (engine, _registry, _dir) = setup_engine();
        for second in 0..3600 {
            let batch: Vec<Vec<u8>> = (0..length).map(payload).collect();
            engine.write_unix(BASE_DAY + second, &batch).unwrap();
        }
        let mut second = 0i64;

        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| {
                second = (second + 1) % 3600;
                let records = engine.query_at_unix(black_box(BASE_DAY + second)).unwrap();
                black_box(records);
            });
        });
    }

    group.finish();
}

fn bench_query_range_hour(c: &mut Criterion) {
    let (engine, _registry, _dir) = setup_engine();
    for second in (0..3600).step_by(5) {
        engine.write_unix(BASE_DAY + second, &[payload(0), payload(1)]).unwrap();
    }

    c.bench_function("query_range/one_hour", |b| {
        b.iter(|| {
            let range: BTreeMap<i64, Vec<Vec<u8>>> = engine
                .query_range_unix(black_box(BASE_DAY), black_box(BASE_DAY + 3599))
                .unwrap();
            black_box(range);
        });
    });
}

criterion_group!(
    benches,
    bench_write_single,
    bench_write_batch,
    bench_query_at,
    bench_query_range_hour,
);
criterion_main!(benches);
