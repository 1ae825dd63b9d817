//! Environment loader for [`DeliveryConfig`].
//!
//! # Design
//! - Read every setting through a lookup closure so tests never touch the process environment.
//! - Fall back to the values in `defaults.rs` for anything optional.
//! - Validate eagerly; a config that loads is a config the pipeline can run with.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AllowList, DeliveryConfig, LogFormatKind};
use crate::validate::{
    ensure_directory, parse_duration_secs, parse_log_level, parse_positive_u64,
    parse_positive_usize,
};

/// Environment variable naming the mounted volume root.
pub const ENV_MOUNT_PATH: &str = "USBDROP_MOUNT_PATH";
/// Environment variable naming the long-lived artifact directory.
pub const ENV_OUTBOX_DIR: &str = "USBDROP_OUTBOX_DIR";
/// Environment variable naming the parent of job-scoped directories.
pub const ENV_TEMP_ROOT: &str = "USBDROP_TEMP_ROOT";
/// Environment variable carrying the transport payload ceiling.
pub const ENV_MAX_PART_BYTES: &str = "USBDROP_MAX_PART_BYTES";
/// Environment variable carrying the concurrency gate capacity.
pub const ENV_GATE_CAPACITY: &str = "USBDROP_GATE_CAPACITY";
/// Environment variable carrying the reaper interval in seconds.
pub const ENV_SWEEP_INTERVAL_SECS: &str = "USBDROP_SWEEP_INTERVAL_SECS";
/// Environment variable carrying the artifact retention in seconds.
pub const ENV_RETENTION_SECS: &str = "USBDROP_RETENTION_SECS";
/// Environment variable carrying the optional per-job timeout in seconds.
pub const ENV_JOB_TIMEOUT_SECS: &str = "USBDROP_JOB_TIMEOUT_SECS";
/// Environment variable carrying the comma-separated user allow-list.
pub const ENV_FILTERED_USERS: &str = "USBDROP_FILTERED_USERS";
/// Environment variable carrying the log level.
pub const ENV_LOG_LEVEL: &str = "USBDROP_LOG_LEVEL";
/// Environment variable carrying the log format.
pub const ENV_LOG_FORMAT: &str = "USBDROP_LOG_FORMAT";

impl DeliveryConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing, a value fails to
    /// parse, or the configured root is not a directory.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing, a value fails to
    /// parse, or the configured root is not a directory.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let root = get(ENV_MOUNT_PATH).map(PathBuf::from).ok_or(ConfigError::MissingEnv {
            name: ENV_MOUNT_PATH,
        })?;
        ensure_directory("root", &root)?;

        let artifact_dir = get(ENV_OUTBOX_DIR).map_or_else(|| root.clone(), PathBuf::from);
        let temp_root = get(ENV_TEMP_ROOT).map_or_else(env::temp_dir, PathBuf::from);

        let max_part_bytes = get(ENV_MAX_PART_BYTES)
            .map(|value| parse_positive_u64("max_part_bytes", &value))
            .transpose()?
            .unwrap_or(defaults::MAX_PART_BYTES);
        let gate_capacity = get(ENV_GATE_CAPACITY)
            .map(|value| parse_positive_usize("gate_capacity", &value))
            .transpose()?
            .unwrap_or(defaults::GATE_CAPACITY);
        let sweep_interval = get(ENV_SWEEP_INTERVAL_SECS)
            .map(|value| parse_duration_secs("sweep_interval", &value))
            .transpose()?
            .unwrap_or(Duration::from_secs(defaults::SWEEP_INTERVAL_SECS));
        let retention = get(ENV_RETENTION_SECS)
            .map(|value| parse_duration_secs("retention", &value))
            .transpose()?
            .unwrap_or(Duration::from_secs(defaults::RETENTION_SECS));
        let job_timeout = get(ENV_JOB_TIMEOUT_SECS)
            .map(|value| parse_duration_secs("job_timeout", &value))
            .transpose()?;

        let allowed_users = get(ENV_FILTERED_USERS)
            .map(|value| AllowList::parse(&value))
            .unwrap_or_default();
        let log_level = get(ENV_LOG_LEVEL)
            .map(|value| parse_log_level(&value))
            .transpose()?
            .unwrap_or_else(|| defaults::LOG_LEVEL.to_string());
        let log_format = get(ENV_LOG_FORMAT)
            .map(|value| value.parse::<LogFormatKind>())
            .transpose()?;

        debug!(
            root = %root.display(),
            artifact_dir = %artifact_dir.display(),
            max_part_bytes,
            gate_capacity,
            "delivery configuration loaded"
        );

        Ok(Self {
            root,
            artifact_dir,
            temp_root,
            max_part_bytes,
            gate_capacity,
            sweep_interval,
            retention,
            job_timeout,
            allowed_users,
            log_level,
            log_format,
        })
    }
}
