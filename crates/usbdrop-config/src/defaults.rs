//! Reference values used when the environment leaves a setting unset.
//!
//! # Design
//! - Keep every tunable default in one place so operators can audit them.
//! - Durations are expressed in seconds to match the environment surface.

/// Per-message payload ceiling of the messaging transport (48 MiB).
pub const MAX_PART_BYTES: u64 = 48 * 1024 * 1024;
/// Number of delivery jobs allowed to run at the same time.
pub const GATE_CAPACITY: usize = 20;
/// Interval between two reaper sweeps, in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 30 * 60;
/// Age after which archive artifacts become eligible for reaping, in seconds.
pub const RETENTION_SECS: u64 = 60 * 60;
/// Log level used when neither the environment nor `RUST_LOG` provide one.
pub const LOG_LEVEL: &str = "info";
