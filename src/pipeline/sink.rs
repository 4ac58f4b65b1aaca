//! Append-only output sink
//!
//! Defines the interface the flush loop writes batches through, plus the
//! CSV file backend used in production.

use super::csv_line::join_record;
use super::error::SinkError;
use super::types::{format_timestamp, OutputRow};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Backend trait for persisting flushed rows
///
/// One call corresponds to one flush cycle. Implementations must either
/// persist the whole batch or return an error; the caller retries and
/// re-queues on error.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append_rows(&self, rows: &[OutputRow]) -> Result<(), SinkError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// CSV file sink with a fixed header
pub struct CsvSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvSink {
    /// Create (or truncate) the output file and write the header row
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, format!("{}\n", OutputRow::HEADER.join(",")))?;

        let file = OpenOptions::new().append(true).open(path)?;

        log::info!("📝 Writing flushed device state to: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

/// Render one row in header column order
pub fn encode_row(row: &OutputRow) -> String {
    join_record([
        format_timestamp(&row.time),
        row.device_id.clone(),
        row.lat.to_string(),
        row.lon.to_string(),
        row.speed.to_string(),
        format_timestamp(&row.event_time),
    ])
}

#[async_trait]
impl RowSink for CsvSink {
    async fn append_rows(&self, rows: &[OutputRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = String::with_capacity(rows.len() * 96);
        for row in rows {
            buf.push_str(&encode_row(row));
            buf.push('\n');
        }

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = file.write_all(buf.as_bytes()).and_then(|_| file.flush()) {
            log::error!("❌ Append of {} rows to {} failed: {}", rows.len(), self.path.display(), e);
            return Err(e.into());
        }
        log::debug!("📝 Appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "CSV"
    }
}
