//! Pipeline configuration from environment variables

use super::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What to do with an event whose `event_time` equals the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqualTimestampPolicy {
    /// Keep the stored state; only strictly newer events win
    #[default]
    Reject,
    /// Last writer wins on ties
    Accept,
}

impl FromStr for EqualTimestampPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "accept" => Ok(Self::Accept),
            other => Err(format!("expected 'reject' or 'accept', got '{}'", other)),
        }
    }
}

/// Configuration for pipeline runtime
///
/// Loaded from environment variables with sensible defaults. Unlike unset
/// variables, values that are present but unparseable are a hard error.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw event CSV
    pub input_path: PathBuf,

    /// Output CSV (truncated and re-headed on start)
    pub output_path: PathBuf,

    /// Flush cadence
    pub flush_interval: Duration,

    /// Upper bound on any single replay pacing sleep
    pub max_replay_sleep: Duration,

    /// How long to wait for the final drain after ingestion ends
    pub shutdown_grace: Duration,

    pub equal_timestamp_policy: EqualTimestampPolicy,

    /// Write attempts per flush cycle (first try included)
    pub sink_retry_attempts: u32,

    pub sink_retry_initial: Duration,

    pub sink_retry_max: Duration,

    /// Consecutive failed cycles tolerated before the run aborts
    pub max_failed_flush_cycles: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("statics/input/raw_data.csv"),
            output_path: PathBuf::from("statics/output/output_stream.csv"),
            flush_interval: Duration::from_millis(1_000),
            max_replay_sleep: Duration::from_millis(2_000),
            shutdown_grace: Duration::from_millis(1_500),
            equal_timestamp_policy: EqualTimestampPolicy::Reject,
            sink_retry_attempts: 3,
            sink_retry_initial: Duration::from_millis(100),
            sink_retry_max: Duration::from_millis(2_000),
            max_failed_flush_cycles: 5,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LOCFLOW_INPUT_PATH` (default: statics/input/raw_data.csv)
    /// - `LOCFLOW_OUTPUT_PATH` (default: statics/output/output_stream.csv)
    /// - `FLUSH_INTERVAL_MS` (default: 1000)
    /// - `MAX_REPLAY_SLEEP_MS` (default: 2000)
    /// - `SHUTDOWN_GRACE_MS` (default: 1500)
    /// - `EQUAL_TIMESTAMP_POLICY` (default: reject)
    /// - `SINK_RETRY_ATTEMPTS` (default: 3)
    /// - `SINK_RETRY_INITIAL_MS` (default: 100)
    /// - `SINK_RETRY_MAX_MS` (default: 2000)
    /// - `MAX_FAILED_FLUSH_CYCLES` (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            input_path: lookup("LOCFLOW_INPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_path),

            output_path: lookup("LOCFLOW_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),

            flush_interval: millis(&lookup, "FLUSH_INTERVAL_MS")?
                .unwrap_or(defaults.flush_interval),

            max_replay_sleep: millis(&lookup, "MAX_REPLAY_SLEEP_MS")?
                .unwrap_or(defaults.max_replay_sleep),

            shutdown_grace: millis(&lookup, "SHUTDOWN_GRACE_MS")?
                .unwrap_or(defaults.shutdown_grace),

            equal_timestamp_policy: parsed(&lookup, "EQUAL_TIMESTAMP_POLICY")?
                .unwrap_or(defaults.equal_timestamp_policy),

            sink_retry_attempts: parsed(&lookup, "SINK_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.sink_retry_attempts),

            sink_retry_initial: millis(&lookup, "SINK_RETRY_INITIAL_MS")?
                .unwrap_or(defaults.sink_retry_initial),

            sink_retry_max: millis(&lookup, "SINK_RETRY_MAX_MS")?
                .unwrap_or(defaults.sink_retry_max),

            max_failed_flush_cycles: parsed(&lookup, "MAX_FAILED_FLUSH_CYCLES")?
                .unwrap_or(defaults.max_failed_flush_cycles),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "FLUSH_INTERVAL_MS",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "SHUTDOWN_GRACE_MS",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.sink_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SINK_RETRY_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_failed_flush_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_FAILED_FLUSH_CYCLES",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sink_retry_max < self.sink_retry_initial {
            return Err(ConfigError::InvalidValue {
                key: "SINK_RETRY_MAX_MS",
                reason: "must not be below SINK_RETRY_INITIAL_MS".to_string(),
            });
        }
        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                reason: format!("'{}': {}", raw, e),
            }),
    }
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parsed::<F, u64>(lookup, key)?.map(Duration::from_millis))
}
