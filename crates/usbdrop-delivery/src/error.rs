//! # Design
//!
//! - One variant per failure class a delivery job can surface.
//! - Item and part failures travel inside outcomes; batch failures end the job.
//! - Constant messages; paths and sources are carried as fields.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use usbdrop_fsops::FsOpsError;

use crate::sink::SinkError;

/// Result alias for delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors raised while handling a delivery request.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The requested path resolves outside the configured root.
    #[error("path escapes the delivery root")]
    PathUnsafe {
        /// Path as requested.
        path: PathBuf,
    },
    /// The path passed validation earlier but is no longer a readable file.
    #[error("file unavailable")]
    FileUnavailable {
        /// Path as requested.
        path: PathBuf,
        /// Underlying IO error, when one was observed.
        #[source]
        source: Option<io::Error>,
    },
    /// Packaging the validated files failed.
    #[error("archive construction failed")]
    Archive {
        /// Underlying filesystem error.
        source: FsOpsError,
    },
    /// Splitting the archive into parts failed.
    #[error("archive split failed")]
    Split {
        /// Underlying filesystem error.
        source: FsOpsError,
    },
    /// The transport sink rejected one part.
    #[error("part send failed")]
    Send {
        /// Part that could not be sent.
        part: PathBuf,
        /// Underlying sink error.
        source: SinkError,
    },
    /// No requested item survived validation.
    #[error("nothing to deliver")]
    NothingToDeliver,
    /// The job-scoped working directory could not be prepared.
    #[error("job workspace unavailable")]
    Workspace {
        /// Directory involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The job exceeded its configured time budget.
    #[error("job timed out")]
    Timeout {
        /// Budget that elapsed.
        after: Duration,
    },
    /// The concurrency gate stopped admitting jobs.
    #[error("concurrency gate closed")]
    GateClosed,
    /// A blocking filesystem task could not be joined.
    #[error("background task failed")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl DeliveryError {
    /// Machine-readable label used for metrics and event payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PathUnsafe { .. } => "path_unsafe",
            Self::FileUnavailable { .. } => "file_unavailable",
            Self::Archive { .. } => "archive_error",
            Self::Split { .. } => "split_error",
            Self::Send { .. } => "send_error",
            Self::NothingToDeliver => "nothing_to_deliver",
            Self::Workspace { .. } => "workspace_error",
            Self::Timeout { .. } => "timeout",
            Self::GateClosed => "gate_closed",
            Self::Join { .. } => "join_error",
        }
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: Option<io::Error>) -> Self {
        Self::FileUnavailable {
            path: path.into(),
            source,
        }
    }
}
