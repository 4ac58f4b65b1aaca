//! Core data structures for the location pipeline

use super::error::MalformedEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Identifier of a tracked device (`device_fk_id` in the raw feed)
pub type DeviceId = String;

/// One row of the raw feed, before it is handed to the state store
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub device_id: DeviceId,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    /// Logical observation time (`time_stamp`)
    pub event_time: DateTime<Utc>,
    /// Source-arrival schedule time (`sts`), drives replay pacing
    pub received_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Stamp the record with the instant it entered the pipeline
    pub fn into_event(self, arrival_time: DateTime<Utc>) -> LocationEvent {
        LocationEvent {
            device_id: self.device_id,
            lat: self.lat,
            lon: self.lon,
            speed: self.speed,
            event_time: self.event_time,
            received_at: self.received_at,
            arrival_time,
        }
    }
}

/// A single observation for one device as seen by the state store
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub device_id: DeviceId,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub event_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Wall-clock instant the event was ingested
    pub arrival_time: DateTime<Utc>,
}

impl LocationEvent {
    /// Reject events that would poison the table or the output file
    pub fn validate(&self) -> Result<(), MalformedEvent> {
        if self.device_id.trim().is_empty() {
            return Err(MalformedEvent::EmptyDeviceId);
        }

        for (field, value) in [("lat", self.lat), ("lon", self.lon), ("speed", self.speed)] {
            if !value.is_finite() {
                return Err(MalformedEvent::NonFinite { field });
            }
        }

        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(MalformedEvent::OutOfRange { field: "lat", value: self.lat });
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(MalformedEvent::OutOfRange { field: "lon", value: self.lon });
        }

        Ok(())
    }
}

/// Latest accepted observation for one device
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub event_time: DateTime<Utc>,
    /// Feed clock at which this state was observed; written as the `time` column
    pub updated_at: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
}

impl EntityState {
    pub fn from_event(event: &LocationEvent) -> Self {
        Self {
            lat: event.lat,
            lon: event.lon,
            speed: event.speed,
            event_time: event.event_time,
            updated_at: event.received_at,
            arrival_time: event.arrival_time,
        }
    }
}

/// A device's state as copied out of the store during a drain
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub device_id: DeviceId,
    pub state: EntityState,
}

/// Snapshots produced by one drain, ordered by device id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushBatch {
    snapshots: Vec<EntitySnapshot>,
}

impl FlushBatch {
    pub fn new(snapshots: Vec<EntitySnapshot>) -> Self {
        Self { snapshots }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.snapshots.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DeviceId> {
        self.snapshots.iter().map(|s| &s.device_id)
    }

    pub fn to_rows(&self) -> Vec<OutputRow> {
        self.snapshots.iter().map(OutputRow::from).collect()
    }
}

/// One line of the output file
///
/// Column order is fixed: `time, device_id, lat, lon, speed, event_time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub time: DateTime<Utc>,
    pub device_id: DeviceId,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub event_time: DateTime<Utc>,
}

impl OutputRow {
    pub const HEADER: [&'static str; 6] = ["time", "device_id", "lat", "lon", "speed", "event_time"];
}

impl From<&EntitySnapshot> for OutputRow {
    fn from(snapshot: &EntitySnapshot) -> Self {
        Self {
            time: snapshot.state.updated_at,
            device_id: snapshot.device_id.clone(),
            lat: snapshot.state.lat,
            lon: snapshot.state.lon,
            speed: snapshot.state.speed,
            event_time: snapshot.state.event_time,
        }
    }
}

/// Canonical timestamp rendering for the output file
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
