//! Typed configuration models for the delivery pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime settings consumed by the delivery pipeline and its host binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Mounted volume whose contents may be enumerated and delivered.
    pub root: PathBuf,
    /// Long-lived directory holding staged artifacts swept by the reaper.
    pub artifact_dir: PathBuf,
    /// Parent directory for job-scoped working directories.
    pub temp_root: PathBuf,
    /// Per-message payload ceiling of the transport, in bytes.
    pub max_part_bytes: u64,
    /// Maximum number of delivery jobs admitted at once.
    pub gate_capacity: usize,
    /// Interval between reaper sweeps.
    pub sweep_interval: Duration,
    /// Age after which artifacts are reaped.
    pub retention: Duration,
    /// Optional upper bound on the duration of one job.
    pub job_timeout: Option<Duration>,
    /// Users permitted to request deliveries.
    pub allowed_users: AllowList,
    /// Log level directive handed to the tracing subscriber.
    pub log_level: String,
    /// Explicit log format, when the operator set one.
    pub log_format: Option<LogFormatKind>,
}

/// Comma-separated list of user identifiers allowed to use the transport.
///
/// An empty list admits everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList(Vec<String>);

impl AllowList {
    /// Parse a raw comma-separated value, trimming whitespace and skipping blanks.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether the given user identifier may issue requests.
    #[must_use]
    pub fn is_allowed(&self, user_id: impl fmt::Display) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let user_id = user_id.to_string();
        self.0.contains(&user_id)
    }

    /// Number of explicit entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list admits everyone.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output format requested for structured logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatKind {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl FromStr for LogFormatKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(ConfigError::invalid("log_format", "unknown_format", s)),
        }
    }
}

impl LogFormatKind {
    #[must_use]
    /// Render the format as its lowercase string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}
