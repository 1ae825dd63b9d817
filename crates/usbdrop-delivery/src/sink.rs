//! Transport-facing seam that accepts the parts of a delivery job.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// One byte-bearing item handed to the transport, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundPart {
    /// Job the part belongs to.
    pub job_id: Uuid,
    /// Location of the bytes to send.
    pub path: PathBuf,
    /// File name presented to the recipient.
    pub file_name: String,
    /// Zero-based position within the job.
    pub sequence_index: u32,
    /// Number of parts emitted by the job.
    pub total_parts: u32,
    /// Size of the part in bytes.
    pub size_bytes: u64,
}

/// Errors a sink reports for a single part.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Reading or writing the part failed.
    #[error("sink io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The outbox destination is the part itself.
    #[error("part would overwrite itself")]
    SameFile {
        /// Path shared by the part and its destination.
        path: PathBuf,
    },
    /// The transport refused the part.
    #[error("transport rejected part")]
    Rejected {
        /// Reason reported by the transport.
        reason: String,
    },
}

/// Destination for the parts of a delivery job.
///
/// Implementations must be safe to share between concurrently running jobs.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one part. Failures affect only this part.
    async fn send(&self, part: &OutboundPart) -> Result<(), SinkError>;
}

/// Sink that copies every part into an outbox directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    outbox: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing into `outbox`; the directory is created on first use.
    #[must_use]
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    /// Directory receiving the parts.
    #[must_use]
    pub fn outbox(&self) -> &Path {
        &self.outbox
    }
}

#[async_trait]
impl DeliverySink for DirectorySink {
    async fn send(&self, part: &OutboundPart) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.outbox)
            .await
            .map_err(|source| SinkError::Io {
                operation: "directory_sink.create_outbox",
                path: self.outbox.clone(),
                source,
            })?;
        let destination = self.outbox.join(&part.file_name);
        if same_file(&part.path, &destination).await {
            return Err(SinkError::SameFile {
                path: part.path.clone(),
            });
        }
        tokio::fs::copy(&part.path, &destination)
            .await
            .map_err(|source| SinkError::Io {
                operation: "directory_sink.copy",
                path: part.path.clone(),
                source,
            })?;
        debug!(
            part = %part.path.display(),
            destination = %destination.display(),
            "part copied to outbox"
        );
        Ok(())
    }
}

async fn same_file(source: &Path, destination: &Path) -> bool {
    match (
        tokio::fs::canonicalize(source).await,
        tokio::fs::canonicalize(destination).await,
    ) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbdrop_test_support::fixtures::write_file;

    fn outbound(path: PathBuf) -> OutboundPart {
        OutboundPart {
            job_id: Uuid::nil(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
            sequence_index: 0,
            total_parts: 1,
            size_bytes: 3,
        }
    }

    #[tokio::test]
    async fn directory_sink_copies_into_outbox() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = write_file(temp.path(), "src/batch.zip.part0", b"abc")?;
        let sink = DirectorySink::new(temp.path().join("outbox"));

        sink.send(&outbound(source)).await?;
        let copied = tokio::fs::read(sink.outbox().join("batch.zip.part0")).await?;
        assert_eq!(copied, b"abc");
        Ok(())
    }

    #[tokio::test]
    async fn directory_sink_refuses_to_copy_a_part_onto_itself() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = write_file(temp.path(), "a.txt", b"precious data")?;
        let sink = DirectorySink::new(temp.path());

        let result = sink.send(&outbound(source.clone())).await;
        assert!(matches!(result, Err(SinkError::SameFile { .. })));
        assert_eq!(tokio::fs::read(&source).await?, b"precious data");

        let aliased = DirectorySink::new(temp.path().join("sub").join(".."));
        std::fs::create_dir_all(temp.path().join("sub"))?;
        let result = aliased.send(&outbound(source.clone())).await;
        assert!(matches!(result, Err(SinkError::SameFile { .. })));
        assert_eq!(tokio::fs::read(&source).await?, b"precious data");
        Ok(())
    }

    #[tokio::test]
    async fn directory_sink_reports_missing_source() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let sink = DirectorySink::new(temp.path().join("outbox"));
        let result = sink.send(&outbound(temp.path().join("gone.zip"))).await;
        assert!(matches!(
            result,
            Err(SinkError::Io {
                operation: "directory_sink.copy",
                ..
            })
        ));
        Ok(())
    }
}
