//! Time-based removal of stale archive artifacts.
//!
//! # Design
//! - Only `*.zip` and `*.zip.part*` files directly inside the monitored
//!   directory are candidates; job-scoped directories are never visited.
//! - Per-file failures are logged and counted, never propagated.
//! - The background loop runs one sweep per tick on the blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use usbdrop_events::{Event, EventBus};
use usbdrop_telemetry::Metrics;

use crate::error::{FsOpsError, FsOpsResult};

/// File name patterns produced by the archive builder and the splitter.
pub const ARTIFACT_PATTERNS: &[&str] = &["*.zip", "*.zip.part*"];

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Artifacts that were removed.
    pub removed: Vec<PathBuf>,
    /// Artifacts that matched but could not be inspected or removed.
    pub failed: Vec<PathBuf>,
    /// Artifacts that matched and were younger than the retention window.
    pub retained: usize,
}

/// Delete artifacts in `directory` whose modification time is older than `max_age`.
///
/// A missing directory yields an empty report.
///
/// # Errors
///
/// Returns an error only when the artifact patterns cannot be compiled or the
/// directory itself cannot be listed.
pub fn sweep(directory: &Path, max_age: Duration) -> FsOpsResult<SweepReport> {
    let patterns = artifact_matcher()?;
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(
                directory = %directory.display(),
                "artifact directory missing; nothing to sweep"
            );
            return Ok(report);
        }
        Err(err) => return Err(FsOpsError::io("reaper.read_dir", directory, err)),
    };

    let now = SystemTime::now();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    directory = %directory.display(),
                    error = %err,
                    "failed to read artifact entry"
                );
                continue;
            }
        };
        let path = entry.path();
        if !patterns.is_match(entry.file_name()) {
            continue;
        }
        match reap_if_stale(&path, now, max_age) {
            Ok(true) => {
                info!(artifact = %path.display(), "stale artifact removed");
                report.removed.push(path);
            }
            Ok(false) => report.retained += 1,
            Err(err) => {
                warn!(artifact = %path.display(), error = %err, "failed to reap artifact");
                report.failed.push(path);
            }
        }
    }
    Ok(report)
}

fn reap_if_stale(path: &Path, now: SystemTime, max_age: Duration) -> io::Result<bool> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_file() {
        return Ok(false);
    }
    let modified = metadata.modified()?;
    let stale = now
        .duration_since(modified)
        .is_ok_and(|age| age > max_age);
    if stale {
        fs::remove_file(path)?;
    }
    Ok(stale)
}

fn artifact_matcher() -> FsOpsResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ARTIFACT_PATTERNS {
        let glob = Glob::new(pattern).map_err(|source| FsOpsError::Glob {
            operation: "reaper.pattern",
            pattern: (*pattern).to_string(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| FsOpsError::Glob {
        operation: "reaper.patterns",
        pattern: ARTIFACT_PATTERNS.join(","),
        source,
    })
}

/// Periodic sweeper over one long-lived artifact directory.
#[derive(Clone)]
pub struct StaleArtifactReaper {
    directory: PathBuf,
    retention: Duration,
    interval: Duration,
    events: EventBus,
    metrics: Metrics,
}

impl StaleArtifactReaper {
    /// Create a reaper for `directory` with the given retention and sweep interval.
    #[must_use]
    pub const fn new(
        directory: PathBuf,
        retention: Duration,
        interval: Duration,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            directory,
            retention,
            interval,
            events,
            metrics,
        }
    }

    /// Directory this reaper watches.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Run one sweep on the blocking pool and publish its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be listed or the sweep task
    /// cannot be joined.
    pub async fn run_once(&self) -> FsOpsResult<SweepReport> {
        let directory = self.directory.clone();
        let retention = self.retention;
        let report = tokio::task::spawn_blocking(move || sweep(&directory, retention))
            .await
            .map_err(|source| FsOpsError::Join {
                operation: "reaper.sweep",
                source,
            })??;

        for path in &report.removed {
            self.metrics.inc_reaped();
            self.events.publish(Event::ArtifactReaped {
                path: path.display().to_string(),
            });
        }
        for _ in &report.failed {
            self.metrics.inc_reaper_error();
        }
        debug!(
            directory = %self.directory.display(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            retained = report.retained,
            "artifact sweep finished"
        );
        Ok(report)
    }

    /// Spawn the background loop; the first sweep runs immediately.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    self.metrics.inc_reaper_error();
                    warn!(
                        directory = %self.directory.display(),
                        error = %err,
                        detail = ?err,
                        "artifact sweep failed"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbdrop_test_support::fixtures::{backdate, write_file};

    const HOUR: Duration = Duration::from_hours(1);

    #[test]
    fn sweep_removes_only_stale_artifacts() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let old = write_file(temp.path(), "old.zip", b"old")?;
        backdate(&old, HOUR * 2)?;
        let fresh = write_file(temp.path(), "fresh.zip", b"fresh")?;

        let report = sweep(temp.path(), HOUR)?;
        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.retained, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        Ok(())
    }

    #[test]
    fn sweep_matches_parts_and_ignores_other_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let part = write_file(temp.path(), "batch.zip.part3", b"p")?;
        let audio = write_file(temp.path(), "service.mp3", b"a")?;
        let nested = write_file(temp.path(), "job/inner.zip", b"z")?;
        for path in [&part, &audio, &nested] {
            backdate(path, HOUR * 3)?;
        }

        let report = sweep(temp.path(), HOUR)?;
        assert_eq!(report.removed, vec![part.clone()]);
        assert!(!part.exists());
        assert!(audio.exists());
        assert!(nested.exists());
        Ok(())
    }

    #[test]
    fn sweep_of_missing_directory_is_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let report = sweep(&temp.path().join("absent"), HOUR)?;
        assert_eq!(report, SweepReport::default());
        Ok(())
    }

    #[test]
    fn artifact_patterns_compile() -> anyhow::Result<()> {
        let matcher = artifact_matcher()?;
        assert!(matcher.is_match("a.zip"));
        assert!(matcher.is_match("a.zip.part0"));
        assert!(!matcher.is_match("a.zipx"));
        assert!(!matcher.is_match("a.tar"));
        Ok(())
    }

    #[tokio::test]
    async fn run_once_publishes_reaped_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let old = write_file(temp.path(), "stale.zip.part0", b"x")?;
        backdate(&old, HOUR * 2)?;

        let events = EventBus::with_capacity(8);
        let metrics = Metrics::new()?;
        let reaper = StaleArtifactReaper::new(
            temp.path().to_path_buf(),
            HOUR,
            HOUR,
            events.clone(),
            metrics.clone(),
        );
        let mut stream = events.subscribe(None);

        let report = reaper.run_once().await?;
        assert_eq!(report.removed.len(), 1);
        assert_eq!(metrics.snapshot().reaped_total, 1);

        let envelope = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("event stream closed"))?;
        assert_eq!(envelope.event.kind(), "artifact_reaped");
        Ok(())
    }

    #[tokio::test]
    async fn spawned_loop_sweeps_immediately() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let old = write_file(temp.path(), "loop.zip", b"x")?;
        backdate(&old, HOUR * 2)?;

        let events = EventBus::with_capacity(8);
        let mut stream = events.subscribe(None);
        let reaper = StaleArtifactReaper::new(
            temp.path().to_path_buf(),
            HOUR,
            HOUR,
            events,
            Metrics::new()?,
        );
        assert_eq!(reaper.directory(), temp.path());
        let handle = reaper.spawn();

        let envelope = tokio::time::timeout(Duration::from_secs(5), stream.next()).await?;
        handle.abort();
        assert!(envelope.is_some());
        assert!(!old.exists());
        Ok(())
    }
}
