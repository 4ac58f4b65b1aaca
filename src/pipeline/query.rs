//! Read-side lookup: latest known state of a device as of a given time
//!
//! Scans the whole output file. Correct because the flush loop only ever
//! appends a device's rows in non-decreasing `event_time` order and always
//! writes the state that was current at flush time.

use super::csv_line::split_record;
use super::error::QueryError;
use super::source::parse_timestamp;
use super::types::OutputRow;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Row for `device_id` with the greatest `time <= query_time`
///
/// Rows with equal `time` resolve to the one written last.
pub fn latest_at(
    path: impl AsRef<Path>,
    device_id: &str,
    query_time: DateTime<Utc>,
) -> Result<Option<OutputRow>, QueryError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| QueryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    latest_in(&contents, path, device_id, query_time)
}

/// Same as [`latest_at`] over already-loaded file contents
pub fn latest_in(
    contents: &str,
    path: &Path,
    device_id: &str,
    query_time: DateTime<Utc>,
) -> Result<Option<OutputRow>, QueryError> {
    let mut lines = contents.lines().enumerate();

    let header_ok = lines
        .next()
        .map(|(_, line)| split_record(line) == OutputRow::HEADER)
        .unwrap_or(false);
    if !header_ok {
        return Err(QueryError::BadHeader {
            path: path.to_path_buf(),
        });
    }

    let mut best: Option<OutputRow> = None;
    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(line);
        // Cheap key filter before parsing the rest of the row
        if fields.get(1).map(String::as_str) != Some(device_id) {
            continue;
        }

        let row = decode_row(&fields).map_err(|reason| QueryError::BadRow {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        })?;

        if row.time <= query_time && best.as_ref().map_or(true, |b| row.time >= b.time) {
            best = Some(row);
        }
    }

    Ok(best)
}

fn decode_row(fields: &[String]) -> Result<OutputRow, String> {
    if fields.len() != OutputRow::HEADER.len() {
        return Err(format!("expected {} fields, got {}", OutputRow::HEADER.len(), fields.len()));
    }

    let ts = |i: usize| parse_timestamp(&fields[i]).ok_or_else(|| format!("bad timestamp {:?}", fields[i]));
    let num = |i: usize| {
        fields[i]
            .parse::<f64>()
            .map_err(|_| format!("bad number {:?}", fields[i]))
    };

    Ok(OutputRow {
        time: ts(0)?,
        device_id: fields[1].clone(),
        lat: num(2)?,
        lon: num(3)?,
        speed: num(4)?,
        event_time: ts(5)?,
    })
}
