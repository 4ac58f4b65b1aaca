//! Latest known location of a device at a point in time.
//!
//! Usage:
//!   locflow_query 25029 2021-10-23T12:32:45Z [--output statics/output/output_stream.csv]

use clap::Parser;
use locflow::pipeline::{query::latest_at, source::parse_timestamp};
use std::path::PathBuf;
use std::time::Instant;

/// Look up the latest flushed row for a device at or before a time.
#[derive(Debug, Parser)]
#[command(name = "locflow_query")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Device id as written in the output file.
    device_id: String,

    /// Query time (RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC).
    query_time: String,

    /// Output CSV produced by `locflow`.
    #[arg(long, env = "LOCFLOW_OUTPUT_PATH", default_value = "statics/output/output_stream.csv")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let query_time = parse_timestamp(&cli.query_time)
        .ok_or_else(|| format!("invalid query time: {:?}", cli.query_time))?;

    let started = Instant::now();
    let result = latest_at(&cli.output, &cli.device_id, query_time)?;
    eprintln!("time taken to get latest data: {:?}", started.elapsed());

    match result {
        Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
        None => println!("not found"),
    }
    Ok(())
}
