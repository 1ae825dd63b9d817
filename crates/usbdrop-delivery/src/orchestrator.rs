//! Delivery job pipeline.
//!
//! A job is admitted by the gate, validates every requested path, packages the
//! survivors into a job-scoped archive when needed, splits it to the transport
//! ceiling, and hands the parts to the sink in sequence order. The job-scoped
//! directory is removed when the job ends, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, warn};
use usbdrop_events::Event;
use usbdrop_fsops::{Part, archive_file_name, build_archive, is_accessible, is_safe, split};
use uuid::Uuid;

use crate::context::DeliveryContext;
use crate::error::{DeliveryError, DeliveryResult};
use crate::model::{
    ArchiveJob, BatchStatus, DeliveryOutcome, DeliveryReport, DeliveryRequest, DeliveryTarget,
};
use crate::sink::{DeliverySink, OutboundPart};

/// Runs delivery jobs against a shared context and sink.
#[derive(Clone)]
pub struct DeliveryOrchestrator {
    context: Arc<DeliveryContext>,
    sink: Arc<dyn DeliverySink>,
}

type Prepared = (ArchiveJob, Vec<Part>);

#[derive(Default)]
struct JobLog {
    outcomes: Vec<DeliveryOutcome>,
    staged: Vec<PathBuf>,
    packaging: Option<JoinHandle<DeliveryResult<Prepared>>>,
}

impl DeliveryOrchestrator {
    /// Construct an orchestrator over `context` that delivers through `sink`.
    #[must_use]
    pub fn new(context: DeliveryContext, sink: Arc<dyn DeliverySink>) -> Self {
        Self {
            context: Arc::new(context),
            sink,
        }
    }

    /// Shared dependencies used by every job.
    #[must_use]
    pub fn context(&self) -> &DeliveryContext {
        &self.context
    }

    /// Run one job to completion and report every outcome.
    ///
    /// Item and part failures are recorded in the report; packaging failures,
    /// timeouts, and an empty validated set end the job with a failed status.
    pub async fn deliver(&self, request: DeliveryRequest) -> DeliveryReport {
        let job_id = Uuid::new_v4();
        let span = info_span!("delivery_job", job_id = %job_id, label = %request.label);
        self.run_job(job_id, request).instrument(span).await
    }

    /// Run [`Self::deliver`] as an independent task.
    #[must_use]
    pub fn spawn_delivery(&self, request: DeliveryRequest) -> JoinHandle<DeliveryReport> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.deliver(request).await })
    }

    async fn run_job(&self, job_id: Uuid, request: DeliveryRequest) -> DeliveryReport {
        let mut log = JobLog::default();
        let result = match self.context.gate.acquire().await {
            Ok(permit) => {
                let result = self.bounded(job_id, &request, &mut log).await;
                settle_packaging(&mut log).await;
                permit.release();
                result
            }
            Err(err) => Err(err),
        };
        self.finish(job_id, request, log, result)
    }

    async fn bounded(
        &self,
        job_id: Uuid,
        request: &DeliveryRequest,
        log: &mut JobLog,
    ) -> DeliveryResult<()> {
        let work = self.execute(job_id, request, log);
        match self.context.job_timeout {
            Some(after) => match tokio::time::timeout(after, work).await {
                Ok(result) => result,
                Err(_elapsed) => Err(DeliveryError::Timeout { after }),
            },
            None => work.await,
        }
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: &DeliveryRequest,
        log: &mut JobLog,
    ) -> DeliveryResult<()> {
        info!(
            items = request.target_paths.len(),
            requester = request.requester.as_deref().unwrap_or("unknown"),
            "delivery job started"
        );
        self.context.events.publish(Event::JobStarted {
            job_id,
            label: request.label.clone(),
            items: request.target_paths.len(),
        });

        let requested = DeliveryTarget::resolve(request.target_paths.clone(), request.archive);
        let accepted = self.validate_all(job_id, requested.paths(), log).await?;
        let Some(target) = requested.narrow(accepted) else {
            return Err(DeliveryError::NothingToDeliver);
        };

        let sources = match target {
            DeliveryTarget::SingleFile(path) => {
                let size = match tokio::fs::metadata(&path).await {
                    Ok(metadata) => metadata.len(),
                    Err(err) => {
                        self.context.metrics.inc_item_rejected("file_unavailable");
                        self.report_failure(
                            job_id,
                            log,
                            path.display().to_string(),
                            DeliveryError::unavailable(&path, Some(err)),
                        );
                        return Err(DeliveryError::NothingToDeliver);
                    }
                };
                if size <= self.context.max_part_bytes {
                    let part = Part {
                        path,
                        sequence_index: 0,
                        size_bytes: size,
                    };
                    self.send_parts(job_id, request, &[part], log).await;
                    return Ok(());
                }
                vec![path]
            }
            DeliveryTarget::FileSet(paths) => paths,
        };

        let (job, parts) = self.package(job_id, &request.label, sources, log).await?;
        let delivered = self.send_parts(job_id, request, &parts, log).await;
        if request.stage_artifacts {
            self.stage(&delivered, log).await;
        }
        debug!(work_dir = %job.work_dir().display(), "removing job workspace");
        drop(job);
        Ok(())
    }

    async fn validate_all(
        &self,
        job_id: Uuid,
        requested: &[PathBuf],
        log: &mut JobLog,
    ) -> DeliveryResult<Vec<PathBuf>> {
        let root = self.context.root.clone();
        let requested = requested.to_vec();
        let verdicts = tokio::task::spawn_blocking(move || {
            requested
                .into_iter()
                .map(|path| {
                    let verdict = validate(&root, &path);
                    (path, verdict)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(join_error("delivery.validate"))?;

        let mut accepted = Vec::with_capacity(verdicts.len());
        for (requested, verdict) in verdicts {
            match verdict {
                Ok(path) => accepted.push(path),
                Err(err) => {
                    self.context.metrics.inc_item_rejected(err.kind());
                    self.report_failure(job_id, log, requested.display().to_string(), err);
                }
            }
        }
        Ok(accepted)
    }

    /// Build and split the archive on the blocking pool.
    ///
    /// The task handle lives in `log` while it runs so an interrupted job can
    /// still wait for it before giving up its gate slot.
    async fn package(
        &self,
        job_id: Uuid,
        label: &str,
        sources: Vec<PathBuf>,
        log: &mut JobLog,
    ) -> DeliveryResult<Prepared> {
        let temp_root = self.context.temp_root.clone();
        let archive_name = archive_file_name(label);
        let max_part_bytes = self.context.max_part_bytes;
        let pending = log.packaging.insert(tokio::task::spawn_blocking(move || {
            prepare(&temp_root, job_id, &archive_name, sources, max_part_bytes)
        }));
        let prepared = pending.await;
        log.packaging = None;

        let (job, parts) = prepared.map_err(join_error("delivery.package"))??;
        debug!(parts = parts.len(), "archive prepared");
        Ok((job, parts))
    }

    async fn send_parts(
        &self,
        job_id: Uuid,
        request: &DeliveryRequest,
        parts: &[Part],
        log: &mut JobLog,
    ) -> Vec<PathBuf> {
        let total_parts = u32::try_from(parts.len()).unwrap_or(u32::MAX);
        let requester = request.requester.as_deref().unwrap_or("unknown");
        let mut delivered = Vec::with_capacity(parts.len());

        for part in parts {
            let outbound = OutboundPart {
                job_id,
                path: part.path.clone(),
                file_name: part.path.file_name().map_or_else(
                    || archive_file_name(&request.label),
                    |name| name.to_string_lossy().into_owned(),
                ),
                sequence_index: part.sequence_index,
                total_parts,
                size_bytes: part.size_bytes,
            };
            match self.sink.send(&outbound).await {
                Ok(()) => {
                    self.context.metrics.inc_part("delivered");
                    info!(
                        requester,
                        path = %part.path.display(),
                        sequence_index = part.sequence_index,
                        total_parts,
                        size_bytes = part.size_bytes,
                        "part delivered"
                    );
                    self.context.events.publish(Event::Delivered {
                        job_id,
                        part_path: part.path.display().to_string(),
                        sequence_index: part.sequence_index,
                    });
                    log.outcomes.push(DeliveryOutcome::Delivered {
                        part_path: part.path.clone(),
                        sequence_index: part.sequence_index,
                    });
                    delivered.push(part.path.clone());
                }
                Err(source) => {
                    self.context.metrics.inc_part("failed");
                    self.report_failure(
                        job_id,
                        log,
                        part.path.display().to_string(),
                        DeliveryError::Send {
                            part: part.path.clone(),
                            source,
                        },
                    );
                }
            }
        }
        delivered
    }

    async fn stage(&self, parts: &[PathBuf], log: &mut JobLog) {
        let artifact_dir = &self.context.artifact_dir;
        if let Err(err) = tokio::fs::create_dir_all(artifact_dir).await {
            warn!(
                directory = %artifact_dir.display(),
                error = %err,
                "failed to prepare artifact directory; skipping staging"
            );
            return;
        }
        for part in parts {
            let Some(name) = part.file_name() else {
                continue;
            };
            let destination = artifact_dir.join(name);
            match tokio::fs::copy(part, &destination).await {
                Ok(_) => {
                    debug!(artifact = %destination.display(), "artifact staged");
                    log.staged.push(destination);
                }
                Err(err) => warn!(
                    part = %part.display(),
                    destination = %destination.display(),
                    error = %err,
                    "failed to stage artifact"
                ),
            }
        }
    }

    fn report_failure(&self, job_id: Uuid, log: &mut JobLog, item: String, error: DeliveryError) {
        warn!(
            item = %item,
            kind = error.kind(),
            error = %error,
            detail = ?error,
            "delivery item failed"
        );
        self.context.events.publish(Event::Failed {
            job_id,
            item: item.clone(),
            reason: error.to_string(),
        });
        log.outcomes.push(DeliveryOutcome::Failed { item, error });
    }

    fn finish(
        &self,
        job_id: Uuid,
        request: DeliveryRequest,
        log: JobLog,
        result: DeliveryResult<()>,
    ) -> DeliveryReport {
        let JobLog { outcomes, staged, .. } = log;
        let delivered = outcomes.iter().filter(|outcome| outcome.is_delivered()).count();
        let failed = outcomes.len() - delivered;

        let status = match result {
            Ok(()) => {
                self.context.metrics.inc_job("complete");
                info!(delivered, failed, "delivery job complete");
                self.context.events.publish(Event::BatchComplete {
                    job_id,
                    delivered,
                    failed,
                });
                BatchStatus::Complete
            }
            Err(err) => {
                self.context.metrics.inc_job("failed");
                error!(
                    kind = err.kind(),
                    error = %err,
                    detail = ?err,
                    delivered,
                    failed,
                    "delivery job failed"
                );
                self.context.events.publish(Event::BatchFailed {
                    job_id,
                    reason: err.to_string(),
                });
                BatchStatus::Failed(err)
            }
        };

        DeliveryReport {
            job_id,
            label: request.label,
            outcomes,
            staged,
            status,
        }
    }
}

/// Create the job workspace, write the archive into it, and split it.
///
/// Any failure drops the workspace before returning.
fn prepare(
    temp_root: &Path,
    job_id: Uuid,
    archive_name: &str,
    sources: Vec<PathBuf>,
    max_part_bytes: u64,
) -> DeliveryResult<Prepared> {
    let job = ArchiveJob::create(temp_root, job_id, archive_name, sources)?;
    let archive = build_archive(&job.sources, &job.archive_path)
        .map_err(|source| DeliveryError::Archive { source })?;
    let parts = split(&archive, max_part_bytes).map_err(|source| DeliveryError::Split { source })?;
    Ok((job, parts))
}

/// Wait out packaging left running by a timed-out job, then drop its workspace.
async fn settle_packaging(log: &mut JobLog) {
    let Some(pending) = log.packaging.take() else {
        return;
    };
    debug!("waiting for interrupted packaging to finish");
    match pending.await {
        Ok(Ok((job, _parts))) => {
            debug!(work_dir = %job.work_dir().display(), "removing job workspace");
            drop(job);
        }
        Ok(Err(err)) => debug!(error = %err, "interrupted packaging failed"),
        Err(err) => warn!(error = %err, "interrupted packaging task failed"),
    }
}

/// Resolve `requested` against `root` and confirm it is a readable file inside it.
fn validate(root: &Path, requested: &Path) -> DeliveryResult<PathBuf> {
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    if !is_safe(root, &candidate) {
        return match candidate.try_exists() {
            Ok(true) => Err(DeliveryError::PathUnsafe {
                path: requested.to_path_buf(),
            }),
            Ok(false) => Err(DeliveryError::unavailable(requested, None)),
            Err(err) => Err(DeliveryError::unavailable(requested, Some(err))),
        };
    }
    if !is_accessible(&candidate) {
        return Err(DeliveryError::unavailable(requested, None));
    }
    Ok(candidate)
}

fn join_error(operation: &'static str) -> impl FnOnce(JoinError) -> DeliveryError {
    move |source| DeliveryError::Join { operation, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;
    use std::time::Duration;
    use usbdrop_config::{AllowList, DeliveryConfig};
    use usbdrop_events::EventBus;
    use usbdrop_telemetry::Metrics;
    use usbdrop_test_support::fixtures::{tree, write_file};

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<(OutboundPart, Vec<u8>)>>,
        fail_index: Option<u32>,
        delay: Option<Duration>,
    }

    impl RecordingSink {
        fn failing_at(index: u32) -> Self {
            Self {
                fail_index: Some(index),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn received(&self) -> Vec<(OutboundPart, Vec<u8>)> {
            self.received.lock().expect("sink lock").clone()
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn send(&self, part: &OutboundPart) -> Result<(), SinkError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_index == Some(part.sequence_index) {
                return Err(SinkError::Rejected {
                    reason: "transport unavailable".to_string(),
                });
            }
            let bytes = tokio::fs::read(&part.path)
                .await
                .map_err(|source| SinkError::Io {
                    operation: "recording_sink.read",
                    path: part.path.clone(),
                    source,
                })?;
            self.received
                .lock()
                .expect("sink lock")
                .push((part.clone(), bytes));
            Ok(())
        }
    }

    fn context(
        base: &Path,
        max_part_bytes: u64,
        job_timeout: Option<Duration>,
    ) -> anyhow::Result<DeliveryContext> {
        let config = DeliveryConfig {
            root: base.join("volume"),
            artifact_dir: base.join("artifacts"),
            temp_root: base.join("jobs"),
            max_part_bytes,
            gate_capacity: 2,
            sweep_interval: Duration::from_mins(30),
            retention: Duration::from_hours(1),
            job_timeout,
            allowed_users: AllowList::default(),
            log_level: "info".to_string(),
            log_format: None,
        };
        std::fs::create_dir_all(&config.root)?;
        Ok(DeliveryContext::from_config(&config, EventBus::new(), Metrics::new()?))
    }

    fn noise(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16).to_le_bytes()[0]
            })
            .collect()
    }

    fn reassemble(received: &[(OutboundPart, Vec<u8>)]) -> Vec<u8> {
        received
            .iter()
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    fn entry_names(archive_bytes: Vec<u8>) -> anyhow::Result<Vec<String>> {
        let archive = zip::ZipArchive::new(Cursor::new(archive_bytes))?;
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        Ok(names)
    }

    fn leftover_job_dirs(base: &Path) -> anyhow::Result<usize> {
        let jobs = base.join("jobs");
        if !jobs.exists() {
            return Ok(0);
        }
        Ok(std::fs::read_dir(jobs)?.count())
    }

    #[tokio::test]
    async fn missing_item_is_reported_and_the_rest_are_archived() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024 * 1024, None)?;
        let root = context.root.clone();
        tree(&root, &[("a.txt", b"alpha"), ("b.mp3", b"bravo")])?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let request = DeliveryRequest::new(
            vec![root.join("a.txt"), PathBuf::from("b.mp3"), root.join("missing.txt")],
            "weekly batch",
        );
        let report = orchestrator.deliver(request).await;

        assert!(report.is_complete());
        assert_eq!(report.delivered_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.outcomes.iter().any(|outcome| matches!(
            outcome,
            DeliveryOutcome::Failed { item, error: DeliveryError::FileUnavailable { .. } }
                if item.ends_with("missing.txt")
        )));

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.file_name, "weekly_batch.zip");
        assert_eq!(received[0].0.total_parts, 1);
        assert_eq!(
            entry_names(received[0].1.clone())?,
            vec!["a.txt".to_string(), "b.mp3".to_string()]
        );
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn small_single_file_is_sent_without_packaging() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024, None)?;
        let file = write_file(&context.root, "notes/a.txt", b"hello")?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .spawn_delivery(
                DeliveryRequest::new(vec![file.clone()], "notes").with_requester("7"),
            )
            .await?;

        assert!(report.is_complete());
        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.path, file);
        assert_eq!(received[0].0.file_name, "a.txt");
        assert_eq!(received[0].1, b"hello");
        assert!(!temp.path().join("jobs").exists());
        Ok(())
    }

    #[tokio::test]
    async fn oversized_archive_is_split_and_sent_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1_000, None)?;
        let first = noise(4_096, 1);
        let second = noise(4_096, 2);
        tree(
            &context.root,
            &[("one.bin", first.as_slice()), ("two.bin", second.as_slice())],
        )?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("one.bin"), PathBuf::from("two.bin")],
                "bulk",
            ))
            .await;

        assert!(report.is_complete());
        let received = sink.received();
        assert!(received.len() >= 2);
        for (position, (part, bytes)) in received.iter().enumerate() {
            assert_eq!(part.sequence_index as usize, position);
            assert_eq!(part.total_parts as usize, received.len());
            assert_eq!(part.file_name, format!("bulk.zip.part{position}"));
            assert!(!bytes.is_empty() && bytes.len() <= 1_000);
        }

        let mut archive = zip::ZipArchive::new(Cursor::new(reassemble(&received)))?;
        let mut restored = Vec::new();
        archive.by_name("two.bin")?.read_to_end(&mut restored)?;
        assert_eq!(restored, second);
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_single_file_is_archived() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1_000, None)?;
        write_file(&context.root, "big.bin", &noise(3_000, 9))?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(vec![PathBuf::from("big.bin")], "big"))
            .await;

        assert!(report.is_complete());
        let received = sink.received();
        assert!(received.len() >= 3);
        assert!(received[0].0.file_name.starts_with("big.zip.part"));
        assert_eq!(
            entry_names(reassemble(&received))?,
            vec!["big.bin".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn all_items_rejected_fails_the_batch() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024, None)?;
        write_file(temp.path(), "outside.txt", b"secret")?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("../outside.txt"), PathBuf::from("gone.txt")],
                "nothing",
            ))
            .await;

        assert!(matches!(
            report.status,
            BatchStatus::Failed(DeliveryError::NothingToDeliver)
        ));
        assert!(matches!(
            report.outcomes.first(),
            Some(DeliveryOutcome::Failed {
                error: DeliveryError::PathUnsafe { .. },
                ..
            })
        ));
        assert_eq!(report.failed_count(), 2);
        assert!(sink.received().is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escaping_the_root_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024, None)?;
        let outside = write_file(temp.path(), "outside.txt", b"secret")?;
        std::os::unix::fs::symlink(&outside, context.root.join("link.txt"))?;
        write_file(&context.root, "inside.txt", b"fine")?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("link.txt"), PathBuf::from("inside.txt")],
                "mixed",
            ))
            .await;

        assert!(report.is_complete());
        assert!(report.outcomes.iter().any(|outcome| matches!(
            outcome,
            DeliveryOutcome::Failed {
                error: DeliveryError::PathUnsafe { .. },
                ..
            }
        )));
        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(
            entry_names(received[0].1.clone())?,
            vec!["inside.txt".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_part_does_not_stop_the_remaining_parts() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1_000, None)?;
        write_file(&context.root, "data.bin", &noise(3_000, 5))?;
        let sink = Arc::new(RecordingSink::failing_at(0));
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(
                DeliveryRequest::new(vec![PathBuf::from("data.bin")], "data").with_archive(true),
            )
            .await;

        assert!(report.is_complete());
        assert!(matches!(
            report.outcomes.first(),
            Some(DeliveryOutcome::Failed {
                error: DeliveryError::Send { .. },
                ..
            })
        ));
        let received = sink.received();
        assert!(!received.is_empty());
        assert_eq!(report.delivered_count(), received.len());
        assert!(received.iter().all(|(part, _)| part.sequence_index > 0));
        Ok(())
    }

    #[tokio::test]
    async fn split_failure_fails_the_batch_and_removes_the_workspace() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 0, None)?;
        tree(&context.root, &[("a.txt", b"alpha"), ("b.txt", b"bravo")])?;
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
                "broken",
            ))
            .await;

        assert!(matches!(
            report.status,
            BatchStatus::Failed(DeliveryError::Split { .. })
        ));
        assert!(report.outcomes.is_empty());
        assert!(sink.received().is_empty());
        assert!(temp.path().join("jobs").is_dir());
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        assert_eq!(
            orchestrator.context().gate.available(),
            orchestrator.context().gate.capacity()
        );
        Ok(())
    }

    #[tokio::test]
    async fn unusable_temp_root_fails_the_batch_before_sending() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024, None)?;
        write_file(temp.path(), "jobs", b"not a directory")?;
        tree(&context.root, &[("a.txt", b"alpha"), ("b.txt", b"bravo")])?;
        let sink = Arc::new(RecordingSink::default());
        let metrics = context.metrics.clone();
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
                "nowhere",
            ))
            .await;

        assert!(matches!(
            report.status,
            BatchStatus::Failed(DeliveryError::Workspace { .. })
        ));
        assert!(sink.received().is_empty());
        assert!(temp.path().join("jobs").is_file());
        assert!(metrics.render()?.contains("status=\"failed\""));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_during_packaging_holds_the_slot_until_cleanup() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 64 * 1024, Some(Duration::from_millis(1)))?;
        let blobs: Vec<(String, Vec<u8>)> = (0..8)
            .map(|index| (format!("blob{index}.bin"), noise(256 * 1024, index)))
            .collect();
        for (name, bytes) in &blobs {
            write_file(&context.root, name, bytes)?;
        }
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                blobs.iter().map(|(name, _)| PathBuf::from(name)).collect(),
                "heavy",
            ))
            .await;

        assert!(matches!(
            report.status,
            BatchStatus::Failed(DeliveryError::Timeout { .. })
        ));
        assert!(sink.received().is_empty());
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        assert_eq!(
            orchestrator.context().gate.available(),
            orchestrator.context().gate.capacity()
        );
        Ok(())
    }

    #[tokio::test]
    async fn timeout_ends_the_job_and_cleans_up() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024 * 1024, Some(Duration::from_millis(100)))?;
        tree(&context.root, &[("a.txt", b"alpha"), ("b.txt", b"bravo")])?;
        let sink = Arc::new(RecordingSink::slow(Duration::from_secs(5)));
        let orchestrator = DeliveryOrchestrator::new(context, sink.clone());

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
                "slow",
            ))
            .await;

        assert!(matches!(
            report.status,
            BatchStatus::Failed(DeliveryError::Timeout { .. })
        ));
        assert!(sink.received().is_empty());
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        assert_eq!(
            orchestrator.context().gate.available(),
            orchestrator.context().gate.capacity()
        );
        Ok(())
    }

    #[tokio::test]
    async fn staged_artifacts_survive_the_job() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024 * 1024, None)?;
        tree(&context.root, &[("a.txt", b"alpha"), ("b.txt", b"bravo")])?;
        let artifact_dir = context.artifact_dir.clone();
        let orchestrator = DeliveryOrchestrator::new(context, Arc::new(RecordingSink::default()));

        let report = orchestrator
            .deliver(
                DeliveryRequest::new(vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")], "keep")
                    .with_staging(true),
            )
            .await;

        assert!(report.is_complete());
        assert_eq!(report.staged, vec![artifact_dir.join("keep.zip")]);
        assert!(artifact_dir.join("keep.zip").is_file());
        assert_eq!(leftover_job_dirs(temp.path())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_published_on_the_event_bus() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let context = context(temp.path(), 1024, None)?;
        write_file(&context.root, "a.txt", b"alpha")?;
        let mut stream = context.events.subscribe(None);
        let metrics = context.metrics.clone();
        let orchestrator = DeliveryOrchestrator::new(context, Arc::new(RecordingSink::default()));

        let report = orchestrator
            .deliver(DeliveryRequest::new(
                vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
                "events",
            ))
            .await;

        let mut kinds = Vec::new();
        while let Ok(Some(envelope)) =
            tokio::time::timeout(Duration::from_secs(1), stream.next()).await
        {
            assert_eq!(envelope.event.job_id(), Some(report.job_id));
            kinds.push(envelope.event.kind());
            if kinds.last() == Some(&"batch_complete") {
                break;
            }
        }
        assert_eq!(
            kinds,
            vec!["job_started", "failed", "delivered", "batch_complete"]
        );

        let rendered = metrics.render()?;
        assert!(rendered.contains("delivery_jobs_total"));
        assert!(rendered.contains("delivery_items_rejected_total"));
        assert_eq!(metrics.snapshot().active_jobs, 0);
        Ok(())
    }
}
