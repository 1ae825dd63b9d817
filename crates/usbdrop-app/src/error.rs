//! # Design
//!
//! - Centralize application-level errors for bootstrap and command handling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: usbdrop_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: usbdrop_telemetry::TelemetryError,
    },
    /// Filesystem operations failed.
    #[error("filesystem operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: usbdrop_fsops::FsOpsError,
    },
    /// A delivery job ended without completing.
    #[error("delivery failed")]
    Delivery {
        /// Operation identifier.
        operation: &'static str,
        /// Source delivery error.
        source: usbdrop_delivery::DeliveryError,
    },
    /// The requester is not on the configured allow-list.
    #[error("requester not allowed")]
    Forbidden {
        /// Requester as supplied, if any.
        requester: Option<String>,
    },
    /// Rendering command output failed.
    #[error("output rendering failed")]
    Render {
        /// Operation identifier.
        operation: &'static str,
        /// Source serialization error.
        source: serde_json::Error,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// A background task could not be joined.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: usbdrop_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: usbdrop_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn fsops(operation: &'static str, source: usbdrop_fsops::FsOpsError) -> Self {
        Self::FsOps { operation, source }
    }

    pub(crate) const fn delivery(
        operation: &'static str,
        source: usbdrop_delivery::DeliveryError,
    ) -> Self {
        Self::Delivery { operation, source }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: None,
            source,
        }
    }
}
