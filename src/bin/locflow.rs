//! locflow runtime
//!
//! Replays the raw device feed, keeps the latest position per device and
//! flushes changed devices to the output CSV on a fixed interval.
//!
//! Usage:
//!   cargo run --release --bin locflow
//!
//! Environment variables:
//!   LOCFLOW_INPUT_PATH - raw feed CSV (default: statics/input/raw_data.csv)
//!   LOCFLOW_OUTPUT_PATH - output CSV (default: statics/output/output_stream.csv)
//!   FLUSH_INTERVAL_MS - flush interval (default: 1000)
//!   MAX_REPLAY_SLEEP_MS - cap on replay pacing sleeps (default: 2000)
//!   SHUTDOWN_GRACE_MS - wait for the final flush (default: 1500)
//!   See `PipelineConfig::from_env` for the rest.

use dotenv::dotenv;
use log::{error, info, warn};
use locflow::pipeline::{config::PipelineConfig, runtime::run_pipeline};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting locflow");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("📊 Configuration:");
    info!("   ├─ Input: {}", config.input_path.display());
    info!("   ├─ Output: {}", config.output_path.display());
    info!("   ├─ Flush interval: {}ms", config.flush_interval.as_millis());
    info!("   ├─ Max replay sleep: {}ms", config.max_replay_sleep.as_millis());
    info!("   ├─ Shutdown grace: {}ms", config.shutdown_grace.as_millis());
    info!("   └─ Equal timestamps: {:?}", config.equal_timestamp_policy);

    match run_pipeline(&config).await {
        Ok(report) => {
            if report.shutdown_timed_out {
                warn!("⚠️  Run finished with {} possibly unflushed devices", report.unflushed_keys);
            }
            info!("✅ All done. Output file: {}", config.output_path.display());
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("⚠️  Could not render run report: {}", e),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
