//! Integration tests for the full replay → state → flush → CSV pipeline
//!
//! Key integration points tested:
//! - Stale events never produce rows
//! - The final accepted state of every device reaches the output file
//! - Latency samples match flushed updates one-for-one
//! - Empty input yields a header-only file and no latency data
//! - Query lookups over a finished run are stable

#[cfg(test)]
mod pipeline_integration_tests {
    use chrono::{DateTime, TimeZone, Utc};
    use locflow::pipeline::{
        clock::ManualClock,
        config::PipelineConfig,
        query::latest_at,
        runtime::{run_pipeline, run_with},
        sink::{CsvSink, RowSink},
        types::SourceRecord,
    };
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    const HEADER: &str = "time,device_id,lat,lon,speed,event_time";

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 10, 23, h, m, s).unwrap()
    }

    fn record(device: &str, event_time: DateTime<Utc>, received_at: DateTime<Utc>, lat: f64) -> SourceRecord {
        SourceRecord {
            device_id: device.to_string(),
            lat,
            lon: 72.8,
            speed: 4.0,
            event_time,
            received_at,
        }
    }

    fn config_for(output: &Path) -> PipelineConfig {
        PipelineConfig {
            output_path: output.to_path_buf(),
            flush_interval: Duration::from_millis(5),
            max_replay_sleep: Duration::ZERO,
            shutdown_grace: Duration::from_secs(5),
            ..PipelineConfig::default()
        }
    }

    /// Output rows keyed by device, in file order
    fn rows_by_device(path: &Path) -> HashMap<String, Vec<Vec<String>>> {
        let contents = std::fs::read_to_string(path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(HEADER));

        let mut by_device: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        for line in lines {
            let fields: Vec<String> = line.split(',').map(str::to_string).collect();
            by_device.entry(fields[1].clone()).or_default().push(fields);
        }
        by_device
    }

    #[tokio::test]
    async fn test_late_event_rejected_and_latest_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let config = config_for(&path);
        let sink: Arc<dyn RowSink> = Arc::new(CsvSink::create(&path).unwrap());
        let clock = Arc::new(ManualClock::new(at(11, 0, 0)));

        let records = vec![
            record("K1", at(10, 0, 0), at(10, 0, 1), 1.0),
            record("K1", at(10, 2, 0), at(10, 2, 1), 2.0),
            record("K1", at(10, 5, 0), at(10, 5, 1), 5.0),
            // Arrives after 10:05 but describes 10:03
            record("K1", at(10, 3, 0), at(10, 5, 2), 3.0),
        ];

        let report = run_with(records, sink, clock, &config).await.unwrap();
        assert_eq!(report.ingest.accepted, 3);
        assert_eq!(report.ingest.stale, 1);
        assert_eq!(report.unflushed_keys, 0);

        let rows = rows_by_device(&path);
        let k1 = &rows["K1"];
        let last = k1.last().unwrap();
        assert_eq!(last[5], "2021-10-23T10:05:00Z");
        assert_eq!(last[0], "2021-10-23T10:05:01Z");
        assert!(k1.iter().all(|r| r[5] != "2021-10-23T10:03:00Z"));
        assert!(k1.iter().all(|r| r[2] != "3"));
    }

    #[tokio::test]
    async fn test_no_lost_final_update_and_latency_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let config = config_for(&path);
        let sink: Arc<dyn RowSink> = Arc::new(CsvSink::create(&path).unwrap());
        let clock = Arc::new(ManualClock::new(at(12, 0, 0)));

        let devices = 20;
        let mut records = Vec::new();
        for step in 0..50u32 {
            for d in 0..devices {
                let t = at(12, 0, 0) + chrono::Duration::seconds(i64::from(step));
                records.push(record(&format!("dev{}", d), t, t, f64::from(step) / 10.0));
            }
        }

        let report = run_with(records, sink, clock, &config).await.unwrap();
        let flush = report.flush.expect("flush loop finished in time");
        let latency = report.latency.expect("latency data");

        assert_eq!(report.ingest.accepted, 1000);
        // One sample per flushed row, never negative
        assert_eq!(latency.samples as u64, flush.rows_written);
        assert!(latency.min_secs >= 0.0);

        let rows = rows_by_device(&path);
        assert_eq!(rows.len(), devices);
        let final_event_time = "2021-10-23T12:00:49Z";
        for (device, device_rows) in &rows {
            assert!(
                device_rows.iter().any(|r| r[5] == final_event_time),
                "device {} missing its final update",
                device
            );
            // Per-device rows move forward in event time
            let times: Vec<&String> = device_rows.iter().map(|r| &r[5]).collect();
            let mut sorted = times.clone();
            sorted.sort();
            assert_eq!(times, sorted);
        }
    }

    #[tokio::test]
    async fn test_empty_input_file_gives_header_only_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw_data.csv");
        let output = dir.path().join("output/output_stream.csv");
        std::fs::write(&input, "device_fk_id,latitude,longitude,speed,time_stamp,sts\n").unwrap();

        let config = PipelineConfig {
            input_path: input,
            ..config_for(&output)
        };

        let report = run_pipeline(&config).await.unwrap();
        assert!(report.latency.is_none());
        assert_eq!(report.ingest.events_seen, 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), format!("{}\n", HEADER));
    }

    #[tokio::test]
    async fn test_run_from_file_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw_data.csv");
        let output = dir.path().join("output_stream.csv");
        std::fs::write(
            &input,
            "device_fk_id,latitude,longitude,speed,time_stamp,sts\n\
             25029,19.10,72.80,10,2021-10-23 12:30:00+00:00,2021-10-23 12:30:02+00:00\n\
             25029,19.20,72.90,12,2021-10-23 12:32:40+00:00,2021-10-23 12:32:42+00:00\n\
             25029,not,a,row,at,all\n\
             25029,19.30,73.00,14,2021-10-23 12:40:00+00:00,2021-10-23 12:40:02+00:00\n\
             7,18.00,72.00,0,2021-10-23 12:31:00+00:00,2021-10-23 12:31:01+00:00\n",
        )
        .unwrap();

        let config = PipelineConfig {
            input_path: input,
            ..config_for(&output)
        };

        let report = run_pipeline(&config).await.unwrap();
        assert_eq!(report.source_malformed, 1);
        assert_eq!(report.ingest.accepted, 4);
        assert!(!report.shutdown_timed_out);

        let query_time = at(12, 32, 45);
        // Fast replay may coalesce the early fixes away; either way the
        // answer must be stable and never from the future
        let first = latest_at(&output, "25029", query_time).unwrap();
        let second = latest_at(&output, "25029", query_time).unwrap();
        assert_eq!(first, second);
        if let Some(row) = &first {
            assert!(row.time <= query_time);
        }

        let last = latest_at(&output, "25029", at(13, 0, 0)).unwrap().unwrap();
        assert_eq!(last.event_time, at(12, 40, 0));
        assert!(latest_at(&output, "7", at(12, 0, 0)).unwrap().is_none());
    }
}
