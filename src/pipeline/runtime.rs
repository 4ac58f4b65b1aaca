//! End-to-end wiring: source → ingestion ∥ flush loop → sink
//!
//! Ingestion runs on the calling task, the flush loop on a spawned task.
//! They share only the [`StateStore`]. Once ingestion raises the shutdown
//! signal the flush loop is given `shutdown_grace` to finish its final drain.

use super::clock::{Clock, SystemClock};
use super::config::PipelineConfig;
use super::error::PipelineError;
use super::flush::{FlushLoop, FlushReport, FlushSettings};
use super::ingestion::{self, IngestReport, ReplaySettings};
use super::latency::{LatencySummary, LatencyTracker};
use super::sink::{CsvSink, RowSink};
use super::source;
use super::state::StateStore;
use super::types::SourceRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Rows the source loader could not parse
    pub source_malformed: usize,
    pub ingest: IngestReport,
    /// `None` when the flush loop missed the shutdown grace period
    pub flush: Option<FlushReport>,
    /// `None` when nothing was flushed
    pub latency: Option<LatencySummary>,
    pub shutdown_timed_out: bool,
    /// Devices whose latest state may not have reached the sink
    pub unflushed_keys: usize,
}

/// Run the full pipeline described by `config` against the real clock
pub async fn run_pipeline(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    config.validate()?;

    // Header goes out before anything else, replacing any previous run
    let sink: Arc<dyn RowSink> = Arc::new(CsvSink::create(&config.output_path)?);
    let loaded = source::load_events(&config.input_path)?;

    let mut report = run_with(loaded.records, sink, Arc::new(SystemClock), config).await?;
    report.source_malformed = loaded.malformed;
    Ok(report)
}

/// Run ingestion and the flush loop over pre-loaded records
pub async fn run_with(
    records: Vec<SourceRecord>,
    sink: Arc<dyn RowSink>,
    clock: Arc<dyn Clock>,
    config: &PipelineConfig,
) -> Result<RunReport, PipelineError> {
    let store = Arc::new(StateStore::new(config.equal_timestamp_policy));
    let latency = Arc::new(LatencyTracker::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flush = FlushLoop::new(
        store.clone(),
        sink,
        latency.clone(),
        clock.clone(),
        FlushSettings::from_config(config),
    );
    let mut flush_handle = tokio::spawn(flush.run(shutdown_rx));
    log::info!("   └─ ✅ Flush task spawned");

    let replay_settings = ReplaySettings {
        max_sleep: config.max_replay_sleep,
    };
    let ingest_fut = ingestion::replay(records, &store, clock.as_ref(), replay_settings, &shutdown_tx);
    tokio::pin!(ingest_fut);

    // The flush loop only ends on its own when the sink is gone for good
    let ingest = tokio::select! {
        ingest = &mut ingest_fut => ingest,
        joined = &mut flush_handle => {
            let err = match joined {
                Ok(Err(e)) => PipelineError::Flush(e),
                Ok(Ok(_)) => PipelineError::FlushTask("flush loop stopped before ingestion finished".to_string()),
                Err(e) => PipelineError::FlushTask(e.to_string()),
            };
            log::error!("❌ Aborting ingestion: {}", err);
            return Err(err);
        }
    };

    if let Some(mean) = ingest.mean_processing {
        log::info!("⏱️  Average per-record processing time: {:.3} ms", mean.as_secs_f64() * 1000.0);
    }

    let (flush_report, shutdown_timed_out) =
        match tokio::time::timeout(config.shutdown_grace, &mut flush_handle).await {
            Ok(Ok(Ok(report))) => (Some(report), false),
            Ok(Ok(Err(e))) => {
                log::error!("❌ Final flush failed: {}", e);
                return Err(e.into());
            }
            Ok(Err(e)) => return Err(PipelineError::FlushTask(e.to_string())),
            Err(_) => {
                flush_handle.abort();
                // Wait for the cancellation so no write can acknowledge afterwards
                let _ = flush_handle.await;
                let abandoned = store.requeue_in_flight();
                log::warn!(
                    "⚠️  Flush loop did not finish within {}ms; {} devices may be unflushed ({} from the abandoned write)",
                    config.shutdown_grace.as_millis(),
                    store.dirty_len(),
                    abandoned
                );
                (None, true)
            }
        };

    let summary = latency.summary();
    match &summary {
        Some(s) => log::info!("📈 Average end-to-end latency: {:.3} s over {} updates", s.mean_secs, s.samples),
        None => log::info!("📈 End-to-end latency: no data"),
    }

    Ok(RunReport {
        source_malformed: 0,
        ingest,
        flush: flush_report,
        latency: summary,
        shutdown_timed_out,
        unflushed_keys: store.dirty_len(),
    })
}
