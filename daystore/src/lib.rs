//! # daystore
//!
//! Embedded day-partitioned record store.
//!
//! daystore keeps second-granular records (process snapshots, periodic
//! probes, audit events) in one fixed-layout binary file per calendar day.
//! Every second of the day has an index slot pointing at a linked chain of
//! records, so a point lookup is one index read plus a chain walk, and a
//! range query only touches the days it spans. Day files older than the
//! configured retention are evicted by a background sweeper.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - O(1) access to the head of any second's records
//! - Batches are linked on disk before they become reachable
//! - Whole-file retention: expired days are deleted, never rewritten
//! - Typed records through [`RecordCodec`]; payloads are opaque bytes on disk
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//!
//! use daystore::{Engine, EngineConfig, Json};
//! use daystore::config::FOURTEEN_DAYS;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct ProcSnapshot {
//!     pid: u32,
//!     cpu: f64,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new("./snapsdata/proc").with_retention(FOURTEEN_DAYS);
//! let engine: Engine<Json<ProcSnapshot>> = Engine::open(config)?;
//!
//! // Record two snapshots taken in the same second
//! let now = chrono::Local::now();
//! engine.write(&now, &[
//!     Json(ProcSnapshot { pid: 1, cpu: 0.5 }),
//!     Json(ProcSnapshot { pid: 42, cpu: 12.0 }),
//! ])?;
//!
//! // Read them back, then everything from the last hour
//! let snaps = engine.query_at(&now)?;
//! assert_eq!(snaps.len(), 2);
//!
//! let hour_ago = now - chrono::Duration::hours(1);
//! let history: BTreeMap<String, Vec<Json<ProcSnapshot>>> =
//!     engine.query_range(&hour_ago, &now)?;
//! for (second, snaps) in &history {
//!     println!("{second}: {} snapshot(s)", snaps.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Engine`] — Owns a storage directory; write, point query, range query, delete
//! - [`DayFile`] — One day on disk: header, index table, record chains
//! - [`Registry`] — Live engines per directory and the retention sweeper
//! - [`RecordCodec`] — Turns records into payload bytes and back
//!
//! ## Modules
//!
//! - [`engine`] — Engine lifecycle and queries
//! - [`dayfile`] — Day file format and chain algorithms
//! - [`registry`] — Directory ownership and periodic sweeps
//! - [`sweeper`] — Stoppable background tick thread
//! - [`config`] — Engine configuration and retention constants
//! - [`codec`] — Record encoding
//! - [`key`] — Range query key types
//! - [`timeline`] — Day baselines and file names
//! - [`error`] — Error types

pub mod codec;
pub mod config;
pub mod dayfile;
pub mod engine;
pub mod error;
pub mod key;
pub mod registry;
pub mod sweeper;
pub mod timeline;

// Re-export primary API types at crate root for convenience.
pub use codec::{Json, RecordCodec};
pub use config::EngineConfig;
pub use dayfile::{DayFile, FrameHeader, SecondSlot};
pub use engine::Engine;
pub use error::{DayStoreError, Result};
pub use key::{KeyFormatter, SecondKey};
pub use registry::Registry;
pub use timeline::DayBoundary;
