//! Request, outcome, and job types exchanged with the transport layer.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryResult};

/// Files the transport asked for, plus a label used for status and naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Requested files in order; relative paths resolve against the root.
    pub target_paths: Vec<PathBuf>,
    /// Human-readable label; also names the archive.
    pub label: String,
    /// Package even a single small file.
    pub archive: bool,
    /// Copy emitted archive parts into the artifact directory after sending.
    pub stage_artifacts: bool,
    /// Identifier of the requesting user, recorded in the download audit log.
    pub requester: Option<String>,
}

impl DeliveryRequest {
    /// Request `target_paths` under `label` with default options.
    #[must_use]
    pub fn new(target_paths: Vec<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            target_paths,
            label: label.into(),
            archive: false,
            stage_artifacts: false,
            requester: None,
        }
    }

    /// Force packaging even for a single small file.
    #[must_use]
    pub const fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Keep emitted archive parts in the artifact directory after sending.
    #[must_use]
    pub const fn with_staging(mut self, stage: bool) -> Self {
        self.stage_artifacts = stage;
        self
    }

    /// Attribute the request to a user.
    #[must_use]
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

/// Shape of a request, decided once when the job starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// One file that may be sent as-is when it fits the transport.
    SingleFile(PathBuf),
    /// Several files, always packaged into one archive.
    FileSet(Vec<PathBuf>),
}

impl DeliveryTarget {
    /// Classify `paths`: one path without forced archiving is a single file.
    #[must_use]
    pub fn resolve(mut paths: Vec<PathBuf>, archive: bool) -> Self {
        if paths.len() == 1
            && !archive
            && let Some(path) = paths.pop()
        {
            return Self::SingleFile(path);
        }
        Self::FileSet(paths)
    }

    /// Same shape over the paths that passed validation, or `None` when none did.
    ///
    /// A file set stays a file set even when a single member survives.
    #[must_use]
    pub fn narrow(&self, mut accepted: Vec<PathBuf>) -> Option<Self> {
        match self {
            Self::SingleFile(_) => accepted.pop().map(Self::SingleFile),
            Self::FileSet(_) if accepted.is_empty() => None,
            Self::FileSet(_) => Some(Self::FileSet(accepted)),
        }
    }

    /// Paths covered by the target.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::SingleFile(path) => std::slice::from_ref(path),
            Self::FileSet(paths) => paths,
        }
    }
}

/// Result for one emitted part or one rejected item.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The part reached the sink.
    Delivered {
        /// Path of the delivered part.
        part_path: PathBuf,
        /// Zero-based position of the part.
        sequence_index: u32,
    },
    /// The item or part did not reach the sink.
    Failed {
        /// Identifier of the item or part as requested or emitted.
        item: String,
        /// Cause of the failure.
        error: DeliveryError,
    },
}

impl DeliveryOutcome {
    /// Whether the outcome is a successful delivery.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Terminal state of a job.
#[derive(Debug)]
pub enum BatchStatus {
    /// Every producible part was attempted.
    Complete,
    /// Packaging could not finish; no further parts were attempted.
    Failed(DeliveryError),
}

/// Everything a job reports back to its caller.
#[derive(Debug)]
pub struct DeliveryReport {
    /// Job identifier.
    pub job_id: Uuid,
    /// Label of the request.
    pub label: String,
    /// Per-item and per-part outcomes in the order they occurred.
    pub outcomes: Vec<DeliveryOutcome>,
    /// Artifacts copied into the artifact directory.
    pub staged: Vec<PathBuf>,
    /// Terminal state.
    pub status: BatchStatus,
}

impl DeliveryReport {
    /// Number of parts that reached the sink.
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_delivered())
            .count()
    }

    /// Number of items or parts that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    /// Whether the job ran to completion.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.status, BatchStatus::Complete)
    }
}

/// Packaging work for one job, rooted in a private scratch directory.
///
/// Dropping the job removes the directory and everything in it.
#[derive(Debug)]
pub struct ArchiveJob {
    /// Files to package.
    pub sources: Vec<PathBuf>,
    /// Destination of the archive inside the scratch directory.
    pub archive_path: PathBuf,
    work_dir: TempDir,
}

impl ArchiveJob {
    /// Create `<temp_root>/<job_id>/` and plan `<archive_name>` inside it.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Workspace`] when the directory cannot be created.
    pub fn create(
        temp_root: &Path,
        job_id: Uuid,
        archive_name: &str,
        sources: Vec<PathBuf>,
    ) -> DeliveryResult<Self> {
        fs::create_dir_all(temp_root).map_err(|source| DeliveryError::Workspace {
            path: temp_root.to_path_buf(),
            source,
        })?;
        let work_dir = tempfile::Builder::new()
            .prefix(&job_id.to_string())
            .rand_bytes(0)
            .tempdir_in(temp_root)
            .map_err(|source| DeliveryError::Workspace {
                path: temp_root.join(job_id.to_string()),
                source,
            })?;
        let archive_path = work_dir.path().join(archive_name);
        Ok(Self {
            sources,
            archive_path,
            work_dir,
        })
    }

    /// Scratch directory owned by the job.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_path_without_archive_is_a_single_file() {
        let target = DeliveryTarget::resolve(vec![PathBuf::from("a.mp3")], false);
        assert_eq!(target, DeliveryTarget::SingleFile(PathBuf::from("a.mp3")));
        assert_eq!(target.paths(), [PathBuf::from("a.mp3")]);
    }

    #[test]
    fn forced_archive_or_many_paths_make_a_file_set() {
        let forced = DeliveryTarget::resolve(vec![PathBuf::from("a.mp3")], true);
        assert!(matches!(forced, DeliveryTarget::FileSet(ref paths) if paths.len() == 1));

        let many = DeliveryTarget::resolve(
            vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")],
            false,
        );
        assert_eq!(many.paths().len(), 2);
        assert!(matches!(many, DeliveryTarget::FileSet(_)));
    }

    #[test]
    fn narrowing_keeps_the_requested_shape() {
        let group = DeliveryTarget::resolve(
            vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")],
            false,
        );
        assert_eq!(
            group.narrow(vec![PathBuf::from("b.mp3")]),
            Some(DeliveryTarget::FileSet(vec![PathBuf::from("b.mp3")]))
        );
        assert_eq!(group.narrow(Vec::new()), None);

        let single = DeliveryTarget::resolve(vec![PathBuf::from("a.mp3")], false);
        assert_eq!(
            single.narrow(vec![PathBuf::from("/mnt/usb/a.mp3")]),
            Some(DeliveryTarget::SingleFile(PathBuf::from("/mnt/usb/a.mp3")))
        );
        assert_eq!(single.narrow(Vec::new()), None);
    }

    #[test]
    fn request_builders_set_options() {
        let request = DeliveryRequest::new(vec![PathBuf::from("x")], "today")
            .with_archive(true)
            .with_staging(true)
            .with_requester("42");
        assert!(request.archive);
        assert!(request.stage_artifacts);
        assert_eq!(request.requester.as_deref(), Some("42"));
    }

    #[test]
    fn archive_job_directory_is_named_after_the_job_and_removed_on_drop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let job_id = Uuid::new_v4();
        let job = ArchiveJob::create(&temp.path().join("jobs"), job_id, "batch.zip", Vec::new())?;

        let work_dir = job.work_dir().to_path_buf();
        assert_eq!(work_dir, temp.path().join("jobs").join(job_id.to_string()));
        assert_eq!(job.archive_path, work_dir.join("batch.zip"));
        assert!(work_dir.is_dir());

        drop(job);
        assert!(!work_dir.exists());
        Ok(())
    }

    #[test]
    fn report_counts_outcomes() {
        let report = DeliveryReport {
            job_id: Uuid::nil(),
            label: "x".into(),
            outcomes: vec![
                DeliveryOutcome::Delivered {
                    part_path: PathBuf::from("x.zip"),
                    sequence_index: 0,
                },
                DeliveryOutcome::Failed {
                    item: "y".into(),
                    error: DeliveryError::NothingToDeliver,
                },
            ],
            staged: Vec::new(),
            status: BatchStatus::Complete,
        };
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.is_complete());
    }
}
