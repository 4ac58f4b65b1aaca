//! Timer-driven flush loop
//!
//! Wakes on a fixed interval, drains the dirty devices from the
//! [`StateStore`] and appends them to the sink in a single write. The loop
//! never touches ingestion: its only contact with the store is the drain
//! (and a re-queue when a batch cannot be written).
//!
//! Lifecycle: `Idle → Running → Draining → Stopped`. A tick's drain-and-write
//! always completes before the shutdown signal is looked at again.

use super::backoff::{ExponentialBackoff, RetryPolicy};
use super::clock::Clock;
use super::config::PipelineConfig;
use super::error::{FlushError, SinkError};
use super::latency::LatencyTracker;
use super::sink::RowSink;
use super::state::StateStore;
use super::types::{FlushBatch, OutputRow};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushPhase {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct FlushSettings {
    pub interval: Duration,
    pub retry: RetryPolicy,
    /// Consecutive cycles whose batch could not be written before giving up
    pub max_failed_cycles: u32,
}

impl FlushSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            interval: config.flush_interval,
            retry: RetryPolicy {
                max_attempts: config.sink_retry_attempts,
                initial_delay: config.sink_retry_initial,
                max_delay: config.sink_retry_max,
            },
            max_failed_cycles: config.max_failed_flush_cycles,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    /// Timer ticks handled while running
    pub ticks: u64,
    /// Non-empty batches persisted (final drain included)
    pub batches_written: u64,
    pub rows_written: u64,
    /// Batches whose retries were exhausted and whose keys were re-queued
    pub failed_batches: u64,
    /// Rows written by the shutdown drain
    pub final_rows: usize,
    pub phase: FlushPhase,
}

impl Default for FlushReport {
    fn default() -> Self {
        Self {
            ticks: 0,
            batches_written: 0,
            rows_written: 0,
            failed_batches: 0,
            final_rows: 0,
            phase: FlushPhase::Idle,
        }
    }
}

pub struct FlushLoop {
    store: Arc<StateStore>,
    sink: Arc<dyn RowSink>,
    latency: Arc<LatencyTracker>,
    clock: Arc<dyn Clock>,
    settings: FlushSettings,
    consecutive_failures: u32,
    report: FlushReport,
}

impl FlushLoop {
    pub fn new(
        store: Arc<StateStore>,
        sink: Arc<dyn RowSink>,
        latency: Arc<LatencyTracker>,
        clock: Arc<dyn Clock>,
        settings: FlushSettings,
    ) -> Self {
        Self {
            store,
            sink,
            latency,
            clock,
            settings,
            consecutive_failures: 0,
            report: FlushReport::default(),
        }
    }

    pub fn phase(&self) -> FlushPhase {
        self.report.phase
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped), then
    /// perform one final drain and stop
    ///
    /// Returns an error when the sink stays unavailable for
    /// `max_failed_cycles` consecutive cycles or the final drain cannot be
    /// written. In both cases the unwritten keys remain dirty in the store.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<FlushReport, FlushError> {
        let period = self.settings.interval;
        self.report.phase = FlushPhase::Running;

        log::info!("⏰ Starting flush loop (interval: {}ms, sink: {})",
            period.as_millis(), self.sink.backend_type());

        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        log::warn!("⚠️  Shutdown sender dropped, draining");
                        break;
                    }
                }

                _ = timer.tick() => {
                    self.report.ticks += 1;
                    if let Err(e) = self.flush_cycle().await {
                        self.report.phase = FlushPhase::Stopped;
                        return Err(e);
                    }
                }
            }
        }

        self.report.phase = FlushPhase::Draining;
        log::info!("🔄 Performing final flush...");

        let result = self.final_drain().await;
        self.report.phase = FlushPhase::Stopped;

        let final_rows = result?;
        self.report.final_rows = final_rows;
        log::info!("✅ Final flush complete ({} devices)", final_rows);

        Ok(self.report)
    }

    /// One periodic cycle. Sink failures are absorbed (keys re-queued) until
    /// they have happened `max_failed_cycles` times in a row.
    async fn flush_cycle(&mut self) -> Result<usize, FlushError> {
        let batch = self.store.drain_dirty();
        if batch.is_empty() {
            return Ok(0);
        }

        let flush_start = std::time::Instant::now();
        match self.write_batch(&batch).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                log::info!("📊 Flushed {} updated devices | {}ms",
                    batch.len(), flush_start.elapsed().as_millis());
                Ok(batch.len())
            }
            Err(last_error) => {
                self.consecutive_failures += 1;
                let pending_keys = self.store.dirty_len();

                log::error!("❌ Failed to write {} devices ({} of {} tolerated failures): {}",
                    batch.len(), self.consecutive_failures,
                    self.settings.max_failed_cycles, last_error);

                if self.consecutive_failures >= self.settings.max_failed_cycles {
                    return Err(FlushError::SinkUnavailable {
                        failed_cycles: self.consecutive_failures,
                        pending_keys,
                        last_error,
                    });
                }
                Ok(0)
            }
        }
    }

    async fn final_drain(&mut self) -> Result<usize, FlushError> {
        let batch = self.store.drain_dirty();
        if batch.is_empty() {
            return Ok(0);
        }

        match self.write_batch(&batch).await {
            Ok(()) => Ok(batch.len()),
            Err(last_error) => Err(FlushError::FinalDrain {
                pending_keys: self.store.dirty_len(),
                last_error,
            }),
        }
    }

    /// Write with retries; on success record latency, on failure re-queue
    async fn write_batch(&mut self, batch: &FlushBatch) -> Result<(), SinkError> {
        // Tick time, taken right after the drain: every arrival precedes it
        // and retry sleeps do not count as latency
        let flush_time = self.clock.now();
        let rows = batch.to_rows();

        if let Err(e) = self.write_with_retry(&rows).await {
            self.report.failed_batches += 1;
            let requeued = self.store.requeue(batch.keys());
            log::warn!("🔁 Re-queued {} devices for the next cycle", requeued);
            return Err(e);
        }

        self.store.acknowledge(batch.keys());
        for snapshot in batch.iter() {
            self.latency.record(snapshot.state.arrival_time, flush_time);
        }

        self.report.batches_written += 1;
        self.report.rows_written += rows.len() as u64;
        Ok(())
    }

    async fn write_with_retry(&self, rows: &[OutputRow]) -> Result<(), SinkError> {
        let mut backoff = ExponentialBackoff::new(self.settings.retry);

        loop {
            match self.sink.append_rows(rows).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("⚠️  {} write of {} rows failed: {}",
                        self.sink.backend_type(), rows.len(), e);
                    if backoff.sleep(self.clock.as_ref()).await.is_err() {
                        return Err(e);
                    }
                }
            }
        }
    }
}
