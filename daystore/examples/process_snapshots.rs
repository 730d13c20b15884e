//! Example recording process snapshots once per second.
//!
//! This example shows how to:
//! - Store serde types through the `Json` codec
//! - Write one batch of snapshots per second
//! - Read back a single second and a time range
//! - Trigger a retention sweep by hand

use std::collections::BTreeMap;
use std::time::Duration;

use daystore::config::FOURTEEN_DAYS;
use daystore::timeline::now_unix;
use daystore::{DayBoundary, Engine, EngineConfig, Json, Registry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProcSnapshot {
    pid: u32,
    name: String,
    cpu_percent: f64,
    rss_bytes: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber_init();
    println!("daystore process snapshot example");

    let dir = std::env::temp_dir().join("daystore_example_proc");
    let _ = std::fs::remove_dir_all(&dir);

    // An isolated registry sweeping once a minute
    let registry = Registry::new(Duration::from_secs(60))?;
    let config = EngineConfig::new(&dir)
        .with_retention(FOURTEEN_DAYS)
        .with_key_format("%H:%M:%S")
        .with_day_boundary(DayBoundary::Utc);
    let engine: Engine<Json<ProcSnapshot>> = Engine::open_in(&registry, config)?;

    // Ten seconds of fake snapshots for three processes
    let start = now_unix() - 10;
    for tick in 0..10u32 {
        let batch: Vec<_> = [(1, "init"), (412, "sshd"), (9001, "postgres")]
            .into_iter()
            .map(|(pid, name)| {
                Json(ProcSnapshot {
                    pid,
                    name: name.to_string(),
                    cpu_percent: f64::from(tick) * 1.5,
                    rss_bytes: u64::from(pid) * 4096,
                })
            })
            .collect();
        engine.write_unix(start + i64::from(tick), &batch)?;
    }

    println!("\nSnapshots at {}:", start + 3);
    for Json(snap) in engine.query_at_unix(start + 3)? {
        println!("  {:>5} {:<10} cpu={:.1}% rss={}", snap.pid, snap.name, snap.cpu_percent, snap.rss_bytes);
    }

    let history: BTreeMap<String, Vec<Json<ProcSnapshot>>> =
        engine.query_range_unix(start, start + 9)?;
    println!("\nHistory ({} seconds):", history.len());
    for (time, snaps) in &history {
        let busiest = snaps
            .iter()
            .map(|s| &s.0)
            .max_by(|a, b| a.cpu_percent.total_cmp(&b.cpu_percent));
        if let Some(busiest) = busiest {
            println!("  {time}: {} processes, busiest {}", snaps.len(), busiest.name);
        }
    }

    println!("\nDay files: {:?}", engine.day_files()?);
    println!("Evicted by manual sweep: {}", registry.sweep_now());

    engine.dispose();
    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

/// Routes engine logs to stderr, filtered by `RUST_LOG`.
fn tracing_subscriber_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
