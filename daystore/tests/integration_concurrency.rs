//! Integration tests for concurrent use of one engine from many threads.

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use daystore::config::EngineConfig;
use daystore::{DayBoundary, Engine, Registry};
use tempfile::tempdir;

/// 2023-01-01T00:00:00Z
const JAN_1: i64 = 1_672_531_200;

fn open(dir: &std::path::Path) -> (Arc<Registry>, Arc<Engine<String>>) {
    let registry = Registry::new(Duration::from_secs(3600)).unwrap();
    let config = EngineConfig::new(dir).with_day_boundary(DayBoundary::Utc);
    let engine = Engine::open_in(&registry, config).unwrap();
    (registry, Arc::new(engine))
}

#[test]
fn test_concurrent_writes_to_same_second() {
    let temp_dir = tempdir().unwrap();
    let (_registry, engine) = open(temp_dir.path());

    let threads = 8;
    let batches_per_thread = 50;
    let batch_size = 3;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for b in 0..batches_per_thread {
                    let batch: Vec<String> =
                        (0..batch_size).map(|i| format!("{t}:{b}:{i}")).collect();
                    engine.write_unix(JAN_1 + 30, &batch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let records = engine.query_at_unix(JAN_1 + 30).unwrap();
    assert_eq!(records.len(), threads * batches_per_thread * batch_size);

    // Each batch stays contiguous and in submission order.
    for chunk in records.chunks(batch_size) {
        let prefix = chunk[0].rsplit_once(':').unwrap().0;
        for (i, record) in chunk.iter().enumerate() {
            assert_eq!(*record, format!("{prefix}:{i}"));
        }
    }

    // Per thread, batches appear in the order that thread wrote them.
    let mut last_batch: BTreeMap<usize, usize> = BTreeMap::new();
    for chunk in records.chunks(batch_size) {
        let mut parts = chunk[0].split(':');
        let t: usize = parts.next().unwrap().parse().unwrap();
        let b: usize = parts.next().unwrap().parse().unwrap();
        if let Some(prev) = last_batch.insert(t, b) {
            assert!(b > prev);
        }
    }

    let frames = engine.frames(JAN_1 + 30).unwrap();
    assert_eq!(frames.len(), records.len());
    assert_eq!(frames.last().unwrap().next, 0);
}

#[test]
fn test_concurrent_writers_and_readers_across_days() {
    let temp_dir = tempdir().unwrap();
    let (_registry, engine) = open(temp_dir.path());

    let writers: Vec<_> = (0..4i64)
        .map(|day| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for s in 0..200 {
                    let second = JAN_1 + day * 86_400 + s * 7;
                    engine.write_unix(second, &[format!("{day}-{s}")]).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..20 {
                    let range: BTreeMap<i64, Vec<String>> = engine
                        .query_range_unix(JAN_1, JAN_1 + 4 * 86_400)
                        .unwrap();
                    // Entries are never empty, even mid-write.
                    assert!(range.values().all(|records| records.len() == 1));
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let range: BTreeMap<i64, Vec<String>> = engine
        .query_range_unix(JAN_1, JAN_1 + 4 * 86_400)
        .unwrap();
    assert_eq!(range.len(), 4 * 200);
    assert_eq!(engine.day_files().unwrap().len(), 4);
}

#[test]
fn test_delete_races_with_writes() {
    let temp_dir = tempdir().unwrap();
    let (_registry, engine) = open(temp_dir.path());

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..500 {
                engine.write_unix(JAN_1 + (i % 60), &[format!("{i}")]).unwrap();
            }
        })
    };
    let deleter = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for _ in 0..50 {
                match engine.delete_day_unix(JAN_1) {
                    Ok(()) => {}
                    Err(e) => assert!(e.is_not_found(), "unexpected error: {e}"),
                }
                thread::yield_now();
            }
        })
    };

    writer.join().unwrap();
    deleter.join().unwrap();

    // Whatever survived is a readable, well-formed day.
    for s in 0..60 {
        let frames = engine.frames(JAN_1 + s).unwrap();
        if let Some(last) = frames.last() {
            assert_eq!(last.next, 0);
        }
        assert_eq!(engine.query_at_unix(JAN_1 + s).unwrap().len(), frames.len());
    }
}

#[test]
fn test_many_writers_and_deleters_on_one_day() {
    let temp_dir = tempdir().unwrap();
    let (_registry, engine) = open(temp_dir.path());

    let writers = 4;
    let deleters = 4;
    let barrier = Arc::new(Barrier::new(writers + deleters));

    let writer_handles: Vec<_> = (0..writers)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut failures = Vec::new();
                for i in 0..2_000i64 {
                    let second = JAN_1 + (i % 120);
                    if let Err(e) = engine.write_unix(second, &[format!("{t}:{i}")]) {
                        failures.push(e.to_string());
                    }
                    if let Err(e) = engine.query_at_unix(second) {
                        failures.push(e.to_string());
                    }
                }
                failures
            })
        })
        .collect();

    let deleter_handles: Vec<_> = (0..deleters)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut failures = Vec::new();
                for _ in 0..500 {
                    match engine.delete_day_unix(JAN_1) {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {}
                        Err(e) => failures.push(e.to_string()),
                    }
                }
                failures
            })
        })
        .collect();

    let failures: Vec<String> = writer_handles
        .into_iter()
        .chain(deleter_handles)
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert!(failures.is_empty(), "unexpected errors: {failures:?}");

    // A single live handle serves the day after the storm.
    engine.write_unix(JAN_1 + 500, &["after".to_string()]).unwrap();
    assert_eq!(
        engine.query_at_unix(JAN_1 + 500).unwrap().last(),
        Some(&"after".to_string())
    );
    assert_eq!(engine.day_files().unwrap(), vec![JAN_1]);
}

#[test]
fn test_dispose_while_writing() {
    let temp_dir = tempdir().unwrap();
    let (_registry, engine) = open(temp_dir.path());

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut written = 0usize;
            for i in 0..10_000 {
                match engine.write_unix(JAN_1 + (i % 600), &[format!("{i}")]) {
                    Ok(()) => written += 1,
                    Err(e) => {
                        assert!(e.is_disposed(), "unexpected error: {e}");
                        break;
                    }
                }
            }
            written
        })
    };

    thread::sleep(Duration::from_millis(5));
    engine.dispose();
    let written = writer.join().unwrap();

    assert!(engine.is_disposed());
    assert!(written <= 10_000);
    assert!(engine.write_unix(JAN_1, &["late".to_string()]).unwrap_err().is_disposed());
}
