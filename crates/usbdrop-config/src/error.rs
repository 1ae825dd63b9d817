//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// File system inspection of a configured path failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path being inspected.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn config_error_messages_are_constant() {
        let missing = ConfigError::MissingEnv {
            name: "USBDROP_MOUNT_PATH",
        };
        assert_eq!(missing.to_string(), "missing environment configuration");

        let invalid = ConfigError::invalid("gate_capacity", "not_positive", "0");
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(matches!(
            invalid,
            ConfigError::InvalidField {
                field: "gate_capacity",
                reason: "not_positive",
                value: Some(ref value),
            } if value == "0"
        ));

        let io = ConfigError::Io {
            operation: "root.metadata",
            path: PathBuf::from("/mnt/usb"),
            source: io::Error::other("gone"),
        };
        assert!(io.source().is_some());
    }
}
