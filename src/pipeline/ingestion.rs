//! Paced replay of the raw feed into the state store
//!
//! Emulates a live feed: before each record the replay waits for the gap
//! between consecutive schedule timestamps, capped at `max_sleep` so total
//! run time stays bounded. Each record is stamped with its arrival time,
//! validated and offered to the [`StateStore`]. When the records run out the
//! shutdown signal is raised for the flush loop.

use super::clock::Clock;
use super::state::{StateStore, UpdateOutcome};
use super::types::SourceRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy)]
pub struct ReplaySettings {
    /// Upper bound on any single pacing wait
    pub max_sleep: Duration,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            max_sleep: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub events_seen: u64,
    pub accepted: u64,
    /// Not newer than the stored state; dropped
    pub stale: u64,
    /// Failed validation; skipped
    pub malformed: u64,
    /// Mean time spent inside `StateStore::update`
    pub mean_processing: Option<Duration>,
}

/// Wait time before a record: the schedule gap, clamped to `[0, max_sleep]`
pub fn pacing_delay(
    prev: Option<DateTime<Utc>>,
    current: DateTime<Utc>,
    max_sleep: Duration,
) -> Duration {
    let Some(prev) = prev else {
        return Duration::ZERO;
    };
    (current - prev)
        .to_std()
        .map(|gap| gap.min(max_sleep))
        .unwrap_or(Duration::ZERO)
}

/// Replay `records` (already ordered by schedule time) into `store`
///
/// Never fails: bad records are counted and skipped. `shutdown` is set to
/// `true` once the last record has been offered.
pub async fn replay<I>(
    records: I,
    store: &StateStore,
    clock: &dyn Clock,
    settings: ReplaySettings,
    shutdown: &watch::Sender<bool>,
) -> IngestReport
where
    I: IntoIterator<Item = SourceRecord>,
{
    log::info!("🚀 Starting replay (max pacing sleep: {}ms)", settings.max_sleep.as_millis());

    let mut report = IngestReport::default();
    let mut prev_schedule: Option<DateTime<Utc>> = None;
    let mut processing_total = Duration::ZERO;
    let mut processed = 0u32;
    let mut last_log_time = Instant::now();

    for record in records {
        let delay = pacing_delay(prev_schedule, record.received_at, settings.max_sleep);
        clock.sleep(delay).await;
        prev_schedule = Some(record.received_at);

        report.events_seen += 1;
        let event = record.into_event(clock.now());

        if let Err(e) = event.validate() {
            report.malformed += 1;
            log::warn!("⚠️  Skipping malformed event for device '{}': {}", event.device_id, e);
            continue;
        }

        let started = Instant::now();
        let outcome = store.update(&event);
        processing_total += started.elapsed();
        processed += 1;

        match outcome {
            UpdateOutcome::Accepted => report.accepted += 1,
            UpdateOutcome::Stale => {
                report.stale += 1;
                log::debug!("Dropped stale event for {} at {}", event.device_id, event.event_time);
            }
        }

        // Log throughput every 10 seconds
        if last_log_time.elapsed().as_secs() >= 10 {
            log::info!("📊 Ingested {} events ({} accepted, {} stale)",
                report.events_seen, report.accepted, report.stale);
            last_log_time = Instant::now();
        }
    }

    if processed > 0 {
        report.mean_processing = Some(processing_total / processed);
    }

    log::info!("✅ Finished ingesting {} events ({} accepted, {} stale, {} malformed)",
        report.events_seen, report.accepted, report.stale, report.malformed);

    // Tell the flusher to stop
    shutdown.send_replace(true);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::config::EqualTimestampPolicy;
    use chrono::TimeZone;

    fn at(sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 10, 23, 12, 0, 0).unwrap() + chrono::Duration::seconds(sec)
    }

    fn record(device: &str, event_sec: i64, schedule_sec: i64, lat: f64) -> SourceRecord {
        SourceRecord {
            device_id: device.to_string(),
            lat,
            lon: 72.8,
            speed: 5.0,
            event_time: at(event_sec),
            received_at: at(schedule_sec),
        }
    }

    #[test]
    fn test_pacing_delay_is_capped() {
        let cap = Duration::from_secs(2);
        assert_eq!(pacing_delay(None, at(0), cap), Duration::ZERO);
        assert_eq!(pacing_delay(Some(at(0)), at(1), cap), Duration::from_secs(1));
        assert_eq!(pacing_delay(Some(at(0)), at(3600), cap), cap);
        assert_eq!(pacing_delay(Some(at(5)), at(0), cap), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_replay_counts_and_signals_shutdown() {
        let store = StateStore::new(EqualTimestampPolicy::Reject);
        let clock = ManualClock::new(at(1000));
        let (tx, rx) = watch::channel(false);

        let records = vec![
            record("K1", 0, 0, 1.0),
            record("K1", 120, 1, 2.0),
            record("K1", 60, 10, 3.0),  // late: older than stored
            record("K2", 0, 11, 95.0),  // bad latitude
            record("K2", 5, 12, 4.0),
        ];

        let report = replay(records, &store, &clock, ReplaySettings::default(), &tx).await;

        assert_eq!(report.events_seen, 5);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.stale, 1);
        assert_eq!(report.malformed, 1);
        assert!(report.mean_processing.is_some());
        assert!(*rx.borrow());

        assert_eq!(store.get("K1").unwrap().lat, 2.0);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ]
        );
    }

    #[tokio::test]
    async fn test_arrival_time_comes_from_clock() {
        let store = StateStore::new(EqualTimestampPolicy::Reject);
        let clock = ManualClock::new(at(1000));
        let (tx, _rx) = watch::channel(false);

        replay(
            vec![record("K1", 0, 0, 1.0), record("K1", 1, 1, 1.0)],
            &store,
            &clock,
            ReplaySettings::default(),
            &tx,
        )
        .await;

        // Second record waited one second on the manual clock
        assert_eq!(store.get("K1").unwrap().arrival_time, at(1001));
        assert_eq!(store.get("K1").unwrap().updated_at, at(1));
    }

    #[tokio::test]
    async fn test_empty_stream_still_signals() {
        let store = StateStore::new(EqualTimestampPolicy::Reject);
        let clock = ManualClock::new(at(0));
        let (tx, rx) = watch::channel(false);

        let report = replay(Vec::new(), &store, &clock, ReplaySettings::default(), &tx).await;
        assert_eq!(report.events_seen, 0);
        assert!(report.mean_processing.is_none());
        assert!(*rx.borrow());
    }
}
