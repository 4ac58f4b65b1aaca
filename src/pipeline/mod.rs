//! # Location pipeline
//!
//! Coalescing aggregator that keeps the latest known position per device and
//! persists only what changed, on a fixed cadence.
//!
//! ## Architecture
//!
//! ```text
//!  source ──► ingestion ──update──► StateStore ◄──drain── FlushLoop ──► RowSink (CSV)
//!                 │                                          │
//!                 └──── shutdown (watch) ────────────────────┘──► LatencyTracker
//! ```
//!
//! **Key Principle:** event arrival rate and output I/O rate are decoupled.
//! Ingestion only touches the in-memory table; the flush loop only touches
//! the table for the instant it takes to swap out the dirty set.
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (LocationEvent, EntityState, OutputRow)
//! - `state` - Latest-value table with dirty tracking
//! - `flush` - Timer-driven drain + batched write
//! - `latency` - End-to-end latency samples
//! - `csv_line` - Field splitting/quoting for the CSV files
//! - `sink` - Append-only output writer trait and CSV backend
//! - `clock` - Wall clock / sleep abstraction
//! - `backoff` - Bounded exponential backoff for sink retries
//! - `source` - Raw CSV loader
//! - `ingestion` - Paced replay into the state store
//! - `query` - Read-side latest-at lookup over the output file
//! - `config` - Environment configuration
//! - `runtime` - End-to-end wiring

pub mod backoff;
pub mod clock;
pub mod config;
pub mod csv_line;
pub mod error;
pub mod flush;
pub mod ingestion;
pub mod latency;
pub mod query;
pub mod runtime;
pub mod sink;
pub mod source;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EqualTimestampPolicy, PipelineConfig};
pub use error::{ConfigError, FlushError, PipelineError, QueryError, SinkError, SourceError};
pub use flush::{FlushLoop, FlushPhase, FlushReport, FlushSettings};
pub use ingestion::{IngestReport, ReplaySettings};
pub use latency::{LatencySummary, LatencyTracker};
pub use runtime::{run_pipeline, RunReport};
pub use sink::{CsvSink, RowSink};
pub use state::{StateStore, UpdateOutcome};
pub use types::{EntitySnapshot, EntityState, FlushBatch, LocationEvent, OutputRow, SourceRecord};
