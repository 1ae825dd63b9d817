//! # Design
//!
//! - Provide structured error variants with constant messages.
//! - Capture operation context and paths as fields, not formatted strings.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors raised by the filesystem side of the delivery pipeline.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failure while touching the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory traversal failed.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation identifier.
        operation: &'static str,
        /// Path being traversed.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Archive encoding failed.
    #[error("fsops zip failure")]
    Zip {
        /// Operation identifier.
        operation: &'static str,
        /// Archive path involved in the failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// Glob pattern compilation failed.
    #[error("fsops glob failure")]
    Glob {
        /// Operation identifier.
        operation: &'static str,
        /// Pattern that failed to compile.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// Input validation failed.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field name tied to the failure.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// A background task could not be joined.
    #[error("fsops task join failure")]
    Join {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Identifier of the operation that failed, when recorded.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Io { operation, .. }
            | Self::Walkdir { operation, .. }
            | Self::Zip { operation, .. }
            | Self::Glob { operation, .. }
            | Self::Join { operation, .. } => Some(*operation),
            Self::InvalidInput { .. } => None,
        }
    }
}
