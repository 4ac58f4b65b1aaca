//! Raw feed loader
//!
//! Reads the device CSV, maps columns by header name, skips rows that cannot
//! be parsed and returns the remainder ordered by their schedule timestamp.

use super::csv_line::split_record;
use super::error::{MalformedEvent, SourceError};
use super::types::SourceRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

pub const COL_DEVICE: &str = "device_fk_id";
pub const COL_LAT: &str = "latitude";
pub const COL_LON: &str = "longitude";
pub const COL_SPEED: &str = "speed";
pub const COL_EVENT_TIME: &str = "time_stamp";
pub const COL_SCHEDULE: &str = "sts";

#[derive(Debug, Default)]
pub struct LoadedEvents {
    /// Parsed records, stable-sorted by `received_at`
    pub records: Vec<SourceRecord>,
    /// Data rows skipped because a field was missing or unparseable
    pub malformed: usize,
}

struct Columns {
    device: usize,
    lat: usize,
    lon: usize,
    speed: usize,
    event_time: usize,
    schedule: usize,
}

impl Columns {
    fn from_header(header: &[String], path: &Path) -> Result<Self, SourceError> {
        let find = |column: &'static str| {
            header
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column))
                .ok_or_else(|| SourceError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                })
        };

        Ok(Self {
            device: find(COL_DEVICE)?,
            lat: find(COL_LAT)?,
            lon: find(COL_LON)?,
            speed: find(COL_SPEED)?,
            event_time: find(COL_EVENT_TIME)?,
            schedule: find(COL_SCHEDULE)?,
        })
    }
}

/// Load and order the raw feed
pub fn load_events(path: impl AsRef<Path>) -> Result<LoadedEvents, SourceError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let loaded = parse_events(&contents, path)?;
    log::info!("📖 Loaded {} events from {} ({} malformed rows skipped)",
        loaded.records.len(), path.display(), loaded.malformed);
    Ok(loaded)
}

/// Parse CSV text; `path` is only used for error messages
pub fn parse_events(contents: &str, path: &Path) -> Result<LoadedEvents, SourceError> {
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or_else(|| SourceError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let header = split_record(header_line.trim_start_matches('\u{feff}'));
    let columns = Columns::from_header(&header, path)?;

    let mut loaded = LoadedEvents::default();
    for (idx, line) in lines {
        match parse_row(&split_record(line), &columns) {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                loaded.malformed += 1;
                log::warn!("⚠️  Skipping malformed row {} in {}: {}", idx + 1, path.display(), e);
            }
        }
    }

    // Stable: rows sharing a schedule time keep file order
    loaded.records.sort_by_key(|r| r.received_at);
    Ok(loaded)
}

fn parse_row(fields: &[String], columns: &Columns) -> Result<SourceRecord, MalformedEvent> {
    let field = |idx: usize, name: &'static str| -> Result<&str, MalformedEvent> {
        match fields.get(idx).map(String::as_str) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(MalformedEvent::MissingField(name)),
        }
    };

    let number = |idx: usize, name: &'static str| -> Result<f64, MalformedEvent> {
        let raw = field(idx, name)?;
        raw.parse::<f64>().map_err(|_| MalformedEvent::InvalidField {
            field: name,
            value: raw.to_string(),
        })
    };

    let timestamp = |idx: usize, name: &'static str| -> Result<DateTime<Utc>, MalformedEvent> {
        let raw = field(idx, name)?;
        parse_timestamp(raw).ok_or_else(|| MalformedEvent::InvalidField {
            field: name,
            value: raw.to_string(),
        })
    };

    Ok(SourceRecord {
        device_id: normalize_device_id(field(columns.device, COL_DEVICE)?),
        lat: number(columns.lat, COL_LAT)?,
        lon: number(columns.lon, COL_LON)?,
        speed: number(columns.speed, COL_SPEED)?,
        event_time: timestamp(columns.event_time, COL_EVENT_TIME)?,
        received_at: timestamp(columns.schedule, COL_SCHEDULE)?,
    })
}

/// Exports sometimes render integer ids as floats (`25029.0`)
fn normalize_device_id(raw: &str) -> String {
    match raw.strip_suffix(".0") {
        Some(int) if !int.is_empty() && int.bytes().all(|b| b.is_ascii_digit()) => int.to_string(),
        _ => raw.to_string(),
    }
}

/// Parse a timestamp as UTC
///
/// Accepts RFC 3339 (`2021-10-23T12:32:45Z`), the space-separated form with
/// an offset (`2021-10-23 12:32:45+00:00`), and naive forms which are taken
/// to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HEADER: &str = "id,device_fk_id,latitude,longitude,speed,time_stamp,sts";

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 10, 23, 12, 32, 45).unwrap();
        assert_eq!(parse_timestamp("2021-10-23T12:32:45Z"), Some(expected));
        assert_eq!(parse_timestamp("2021-10-23 12:32:45+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-10-23 14:32:45+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-10-23 12:32:45"), Some(expected));
        assert_eq!(
            parse_timestamp("2021-10-23 12:32:45.250"),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_rows_sorted_by_schedule_time() {
        let csv = format!(
            "{HEADER}\n\
             1,25029,19.1,72.8,10,2021-10-23 12:00:05+00:00,2021-10-23 12:00:10+00:00\n\
             2,7,19.2,72.9,0,2021-10-23 12:00:00+00:00,2021-10-23 12:00:01+00:00\n\
             3,25029.0,19.3,72.7,12,2021-10-23 12:00:06+00:00,2021-10-23 12:00:10+00:00\n"
        );

        let loaded = parse_events(&csv, Path::new("raw.csv")).unwrap();
        assert_eq!(loaded.malformed, 0);

        let ids: Vec<&str> = loaded.records.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["7", "25029", "25029"]);
        // Ties keep file order
        assert_eq!(loaded.records[1].lat, 19.1);
        assert_eq!(loaded.records[2].lat, 19.3);
    }

    #[test]
    fn test_malformed_rows_are_counted_not_fatal() {
        let csv = format!(
            "{HEADER}\n\
             1,25029,not-a-number,72.8,10,2021-10-23 12:00:05,2021-10-23 12:00:10\n\
             2,,19.2,72.9,0,2021-10-23 12:00:00,2021-10-23 12:00:01\n\
             3,25029,19.3,72.7,12,garbage,2021-10-23 12:00:10\n\
             4,25029,19.3,72.7\n\
             5,8,19.3,72.7,12,2021-10-23 12:00:06,2021-10-23 12:00:10\n"
        );

        let loaded = parse_events(&csv, Path::new("raw.csv")).unwrap();
        assert_eq!(loaded.malformed, 4);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].device_id, "8");
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let err = parse_events("device_fk_id,latitude\n1,2\n", Path::new("raw.csv")).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { column: "longitude", .. }));

        assert!(matches!(
            parse_events("", Path::new("raw.csv")),
            Err(SourceError::MissingHeader { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_events("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
