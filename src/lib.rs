//! # locflow
//!
//! Latest-state aggregator for device location feeds.
//!
//! An ingestion path replays timestamped location events into a per-device
//! latest-value table while an independent timer-driven flush loop drains only
//! the devices that changed and appends them to a CSV file in one batched
//! write per cycle.
//!
//! See [`pipeline`] for the moving parts and [`pipeline::runtime`] for the
//! wiring used by the `locflow` binary.

pub mod pipeline;
