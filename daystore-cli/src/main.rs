//! CLI for the daystore record engine.
//!
//! Provides commands for writing, querying, inspecting, and sweeping a
//! daystore storage directory. Payloads are handled as raw bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use daystore::config::HUNDRED_YEARS;
use daystore::timeline::{self, DayBoundary};
use daystore::{Engine, EngineConfig, KeyFormatter};
use tracing_subscriber::EnvFilter;

/// daystore — Embedded day-partitioned record store CLI.
#[derive(Parser)]
#[command(name = "daystore", version, about)]
struct Cli {
    /// Partition days at UTC midnight instead of local midnight.
    #[arg(long, global = true)]
    utc: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List day files, their sizes, and populated seconds.
    Info {
        /// Path to the storage directory.
        dir: PathBuf,
    },

    /// Append one batch of records under a single second.
    Write {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Timestamp: unix seconds, RFC 3339, or "YYYY-MM-DD HH:MM:SS".
        #[arg(long)]
        at: String,

        /// Require every payload to be valid JSON.
        #[arg(long)]
        json: bool,

        /// Record payloads, written in order.
        #[arg(required = true)]
        payloads: Vec<String>,
    },

    /// Print the records written at one second.
    Query {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Timestamp: unix seconds, RFC 3339, or "YYYY-MM-DD HH:MM:SS".
        #[arg(long)]
        at: String,

        /// Print payloads as parsed JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print every populated second in a time range.
    Range {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Range start (inclusive).
        #[arg(long)]
        begin: String,

        /// Range end (inclusive).
        #[arg(long)]
        end: String,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Print payloads as parsed JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the day file containing a timestamp.
    Delete {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Any timestamp within the day to delete.
        #[arg(long)]
        day: String,
    },

    /// Remove day files older than a retention (e.g., "7d", "12h").
    Sweep {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Maximum age of a day file, measured from its midnight.
        #[arg(long, default_value = "7d")]
        retention: String,
    },

    /// Print the on-disk chain frames of one second.
    Inspect {
        /// Path to the storage directory.
        dir: PathBuf,

        /// Timestamp: unix seconds, RFC 3339, or "YYYY-MM-DD HH:MM:SS".
        #[arg(long)]
        at: String,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of distinct seconds to write.
        #[arg(long, default_value = "86400")]
        seconds: u32,

        /// Records per batch.
        #[arg(long, default_value = "10")]
        batch: u32,
    },
}

/// Output format for range results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let boundary = if cli.utc {
        DayBoundary::Utc
    } else {
        DayBoundary::Local
    };

    let result = match cli.command {
        Commands::Info { dir } => cmd_info(&dir, boundary),
        Commands::Write {
            dir,
            at,
            json,
            payloads,
        } => cmd_write(&dir, boundary, &at, json, &payloads),
        Commands::Query { dir, at, json } => cmd_query(&dir, boundary, &at, json),
        Commands::Range {
            dir,
            begin,
            end,
            format,
            json,
        } => cmd_range(&dir, boundary, &begin, &end, &format, json),
        Commands::Delete { dir, day } => cmd_delete(&dir, boundary, &day),
        Commands::Sweep { dir, retention } => cmd_sweep(&dir, boundary, &retention),
        Commands::Inspect { dir, at } => cmd_inspect(&dir, boundary, &at),
        Commands::Bench { seconds, batch } => cmd_bench(seconds, batch),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Opens an engine that never expires anything on its own.
fn open_engine(dir: &Path, boundary: DayBoundary) -> CliResult<Engine<Vec<u8>>> {
    let config = EngineConfig::new(dir)
        .with_retention(HUNDRED_YEARS)
        .with_day_boundary(boundary);
    tracing::debug!(dir = %dir.display(), ?boundary, "opening engine");
    Ok(Engine::open(config)?)
}

/// Fails unless `dir` is an existing directory.
///
/// Only `write` may create a store; every other command reads or prunes one
/// that must already be there.
fn require_dir(dir: &Path) -> CliResult<()> {
    if !dir.is_dir() {
        return Err(format!("No storage directory at '{}'", dir.display()).into());
    }
    Ok(())
}

/// Opens the engine of an existing store.
fn open_existing(dir: &Path, boundary: DayBoundary) -> CliResult<Engine<Vec<u8>>> {
    require_dir(dir)?;
    open_engine(dir, boundary)
}

/// Implements `daystore info <dir>`.
fn cmd_info(dir: &Path, boundary: DayBoundary) -> CliResult<()> {
    let engine = open_existing(dir, boundary)?;
    let formatter = KeyFormatter::new(engine.config().key_format.clone(), boundary);

    println!("Storage: {}", engine.storage_directory().display());
    println!();

    let days = engine.day_files()?;
    println!("Day files: {}", days.len());
    for baseline in &days {
        let path = engine.storage_directory().join(timeline::file_name(*baseline));
        let size = std::fs::metadata(&path)?.len();
        let populated = engine.populated_seconds(*baseline)?;

        println!("  {} ({})", timeline::file_name(*baseline), formatter.render(*baseline)?);
        println!("    Size: {} ({size} bytes)", format_bytes(size));
        println!("    Populated seconds: {}", populated.len());
        if let (Some(first), Some(last)) = (populated.first(), populated.last()) {
            println!(
                "    First/last: {} .. {}",
                formatter.render(*first)?,
                formatter.render(*last)?
            );
        }
    }

    println!();
    let total_size = dir_size(engine.storage_directory())?;
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));

    Ok(())
}

/// Implements `daystore write <dir> --at <ts> <payload>...`.
fn cmd_write(
    dir: &Path,
    boundary: DayBoundary,
    at: &str,
    json: bool,
    payloads: &[String],
) -> CliResult<()> {
    let second = parse_timestamp(at, boundary)?;
    if json {
        for payload in payloads {
            serde_json::from_str::<serde_json::Value>(payload)
                .map_err(|e| format!("payload is not valid JSON ({e}): {payload}"))?;
        }
    }

    let engine = open_engine(dir, boundary)?;
    let records: Vec<Vec<u8>> = payloads.iter().map(|p| p.as_bytes().to_vec()).collect();
    engine.write_unix(second, &records)?;

    println!("Wrote {} record(s) at {second}", records.len());
    Ok(())
}

/// Implements `daystore query <dir> --at <ts>`.
fn cmd_query(dir: &Path, boundary: DayBoundary, at: &str, json: bool) -> CliResult<()> {
    let second = parse_timestamp(at, boundary)?;
    let engine = open_existing(dir, boundary)?;

    let records = engine.query_at_unix(second)?;
    println!("# second={second}, records={}", records.len());
    for record in &records {
        println!("{}", render_payload(record, json)?);
    }
    Ok(())
}

/// Implements `daystore range <dir> --begin <ts> --end <ts>`.
fn cmd_range(
    dir: &Path,
    boundary: DayBoundary,
    begin: &str,
    end: &str,
    format: &OutputFormat,
    json: bool,
) -> CliResult<()> {
    let begin = parse_timestamp(begin, boundary)?;
    let end = parse_timestamp(end, boundary)?;
    let engine = open_existing(dir, boundary)?;
    let formatter = KeyFormatter::new(engine.config().key_format.clone(), boundary);

    let range: BTreeMap<i64, Vec<Vec<u8>>> = engine.query_range_unix(begin, end)?;
    let total: usize = range.values().map(Vec::len).sum();

    match format {
        OutputFormat::Csv => {
            println!("# begin={begin}, end={end}, seconds={}, records={total}", range.len());
            println!("second,time,index,payload");
            for (second, records) in &range {
                let time = formatter.render(*second)?;
                for (i, record) in records.iter().enumerate() {
                    println!("{second},{time},{i},{}", csv_field(&render_payload(record, json)?));
                }
            }
        }
        OutputFormat::Json => {
            let mut entries = Vec::with_capacity(range.len());
            for (second, records) in &range {
                let records = records
                    .iter()
                    .map(|r| payload_value(r, json))
                    .collect::<CliResult<Vec<_>>>()?;
                entries.push(serde_json::json!({
                    "second": second,
                    "time": formatter.render(*second)?,
                    "records": records,
                }));
            }

            let output = serde_json::json!({
                "begin": begin,
                "end": end,
                "count": total,
                "data": entries,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `daystore delete <dir> --day <ts>`.
fn cmd_delete(dir: &Path, boundary: DayBoundary, day: &str) -> CliResult<()> {
    let second = parse_timestamp(day, boundary)?;
    let baseline = boundary.day_baseline(second)?;
    let engine = open_existing(dir, boundary)?;

    engine.delete_day_unix(second)?;
    println!("Deleted {}", timeline::file_name(baseline));
    Ok(())
}

/// Implements `daystore sweep <dir> --retention <duration>`.
fn cmd_sweep(dir: &Path, boundary: DayBoundary, retention: &str) -> CliResult<()> {
    let retention = parse_duration(retention)?;
    let before = open_existing(dir, boundary)?.day_files()?;

    // Opening an engine sweeps its directory once with the given retention.
    let config = EngineConfig::new(dir)
        .with_retention(retention)
        .with_day_boundary(boundary);
    let engine: Engine<Vec<u8>> = Engine::open(config)?;
    let after = engine.day_files()?;

    let removed: Vec<i64> = before.into_iter().filter(|b| !after.contains(b)).collect();
    println!(
        "Removed {} day file(s) older than {}",
        removed.len(),
        format_duration_secs(retention.as_secs())
    );
    for baseline in &removed {
        println!("  - {}", timeline::file_name(*baseline));
    }
    println!("Remaining: {}", after.len());
    Ok(())
}

/// Implements `daystore inspect <dir> --at <ts>`.
fn cmd_inspect(dir: &Path, boundary: DayBoundary, at: &str) -> CliResult<()> {
    let second = parse_timestamp(at, boundary)?;
    let baseline = boundary.day_baseline(second)?;
    let engine = open_existing(dir, boundary)?;

    let frames = engine.frames(second)?;
    println!(
        "# file={}, second={second}, slot={}, frames={}",
        timeline::file_name(baseline),
        second - baseline,
        frames.len()
    );
    println!("offset,timestamp,next,len");
    for frame in &frames {
        println!("{},{},{},{}", frame.offset, frame.timestamp, frame.next, frame.len);
    }
    Ok(())
}

/// Implements `daystore bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(seconds: u32, batch: u32) -> CliResult<()> {
    println!("daystore write-path benchmark");
    println!("  Seconds: {seconds}");
    println!("  Batch: {batch}");
    println!();

    let temp_dir = std::env::temp_dir().join("daystore_bench");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let engine = open_engine(&temp_dir, DayBoundary::Utc)?;
    let records: Vec<Vec<u8>> = (0..batch)
        .map(|i| format!(r#"{{"pid":{i},"name":"worker-{i}","cpu":0.42,"rss":104857600}}"#).into_bytes())
        .collect();

    println!("Writing {} records across {seconds} seconds...", u64::from(seconds) * u64::from(batch));

    let base = 1_700_000_000i64;
    let start = Instant::now();
    for s in 0..seconds {
        engine.write_unix(base + i64::from(s), &records)?;
    }
    let write_elapsed = start.elapsed();

    let start = Instant::now();
    let mut read = 0usize;
    for s in 0..seconds {
        read += engine.query_at_unix(base + i64::from(s))?.len();
    }
    let read_elapsed = start.elapsed();

    let total_writes = u64::from(seconds) * u64::from(batch);
    let ns_per_batch = write_elapsed.as_nanos() as f64 / f64::from(seconds.max(1));
    let writes_per_sec = total_writes as f64 / write_elapsed.as_secs_f64();
    let ns_per_query = read_elapsed.as_nanos() as f64 / f64::from(seconds.max(1));

    println!();
    println!("Results:");
    println!("  Total records: {total_writes}");
    println!("  Day files: {}", engine.day_files()?.len());
    println!("  Write elapsed: {write_elapsed:.3?}");
    println!("  Avg latency: {ns_per_batch:.1} ns/batch");
    println!("  Throughput: {writes_per_sec:.0} records/sec");
    println!("  Query elapsed: {read_elapsed:.3?} ({read} records read)");
    println!("  Avg query latency: {ns_per_query:.1} ns/second");
    println!("  Disk usage: {}", format_bytes(dir_size(&temp_dir)?));
    println!();

    // Clean up
    engine.dispose();
    let _ = std::fs::remove_dir_all(&temp_dir);

    Ok(())
}

/// Parses unix seconds, RFC 3339, or a naive "YYYY-MM-DD HH:MM:SS" (also with
/// a `T` separator) read in the zone of `boundary`.
fn parse_timestamp(s: &str, boundary: DayBoundary) -> CliResult<i64> {
    let s = s.trim();
    if let Ok(second) = s.parse::<i64>() {
        return Ok(second);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.timestamp());
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .ok_or_else(|| format!("Unrecognized timestamp: '{s}'"))?;

    let at = match boundary {
        DayBoundary::Utc => Some(Utc.from_utc_datetime(&naive).timestamp()),
        DayBoundary::Local => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|at| at.timestamp()),
    };
    at.ok_or_else(|| format!("Timestamp does not exist in the local time zone: '{s}'").into())
}

/// Parses a human-readable duration string (e.g., "12h", "30m", "7d").
fn parse_duration(s: &str) -> CliResult<Duration> {
    let s = s.trim();
    let Some((split, unit)) = s.char_indices().last() else {
        return Err("Empty duration string".into());
    };
    let num: u64 = s[..split].parse()?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };
    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Duration too large: '{s}'"))?;

    Ok(Duration::from_secs(secs))
}

/// Renders a payload as UTF-8 text, or as compact JSON when `json` is set.
fn render_payload(bytes: &[u8], json: bool) -> CliResult<String> {
    if json {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        return Ok(value.to_string());
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Converts a payload to a JSON value: parsed when `json` is set, else a string.
fn payload_value(bytes: &[u8], json: bool) -> CliResult<serde_json::Value> {
    if json {
        return Ok(serde_json::from_slice(bytes)?);
    }
    Ok(serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Quotes a CSV field when it contains separators or quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Recursively calculates directory size.
fn dir_size(path: &Path) -> CliResult<u64> {
    let mut total = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
