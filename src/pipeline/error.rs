//! Error types for the location pipeline
//!
//! Only sink, source-file and configuration failures are fatal. Malformed
//! and stale events are counted and skipped by the ingestion path.

use std::path::PathBuf;

/// Why a single event was skipped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedEvent {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("device id is empty")]
    EmptyDeviceId,

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("{path} header lacks required column {column:?}")]
    MissingColumn { path: PathBuf, column: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// Batches kept failing; the affected keys are still dirty in the store
    #[error("sink unavailable after {failed_cycles} failed flush cycles ({pending_keys} keys pending): {last_error}")]
    SinkUnavailable {
        failed_cycles: u32,
        pending_keys: usize,
        last_error: SinkError,
    },

    #[error("final drain failed ({pending_keys} keys pending): {last_error}")]
    FinalDrain {
        pending_keys: usize,
        last_error: SinkError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a locflow output file (bad header)")]
    BadHeader { path: PathBuf },

    #[error("{path} line {line}: {reason}")]
    BadRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to initialise output: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error("flush task panicked: {0}")]
    FlushTask(String),
}
