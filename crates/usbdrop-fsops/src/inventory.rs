//! Fresh-on-every-call listing of the files under the mounted root.
//!
//! # Design
//! - Every call walks the filesystem again; no records are cached.
//! - Only regular files become records, and symlinks are never followed.
//! - Records are hints: callers re-validate a path before reading it.

use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Snapshot of one file taken while walking the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Base name of the file.
    pub name: String,
    /// Absolute path of the file.
    pub absolute_path: PathBuf,
    /// Size in bytes at walk time.
    pub size_bytes: u64,
    /// Creation time, or modification time where creation is not recorded.
    pub created_at: DateTime<Utc>,
}

/// Attribute used to order a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Order by base name.
    Name,
    /// Order by size in bytes.
    Size,
    /// Order by creation time.
    CreatedAt,
}

/// Direction applied to a [`SortKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest or earliest first.
    #[default]
    Ascending,
    /// Largest or latest first.
    Descending,
}

/// Aggregate figures about a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    /// Number of files listed.
    pub file_count: usize,
    /// Sum of all file sizes.
    pub total_bytes: u64,
    /// Count of files per lower-cased extension; files without one use `""`.
    pub extensions: BTreeMap<String, usize>,
    /// Most recently created file.
    pub newest: Option<FileRecord>,
}

/// Walk `root` recursively and return one record per regular file.
///
/// The walk is depth-first with siblings visited in file-name order, so
/// repeated listings of an unchanged volume agree. Entries that vanish or
/// become unreadable mid-walk are logged and skipped.
///
/// # Errors
///
/// Returns an error when `root` itself cannot be inspected or is not a directory.
pub fn list(root: &Path) -> FsOpsResult<Vec<FileRecord>> {
    let root_meta = fs::metadata(root).map_err(|err| FsOpsError::io("inventory.root", root, err))?;
    if !root_meta.is_dir() {
        return Err(FsOpsError::InvalidInput {
            field: "root",
            reason: "not_a_directory",
            value: Some(root.display().to_string()),
        });
    }
    let root = fs::canonicalize(root)
        .map_err(|err| FsOpsError::io("inventory.canonicalize", root, err))?;

    let mut records = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let err = FsOpsError::walkdir("inventory.walk", &root, err);
                warn!(error = ?err, "skipping unreadable inventory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => records.push(record_from(entry.path(), &metadata)),
            Err(err) => {
                warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "skipping inventory entry without metadata"
                );
            }
        }
    }
    Ok(records)
}

/// Resolve a bare file name to the first matching record in walk order.
///
/// # Errors
///
/// Propagates listing failures from [`list`].
pub fn find_by_name(root: &Path, name: &str) -> FsOpsResult<Option<FileRecord>> {
    Ok(list(root)?.into_iter().find(|record| record.name == name))
}

/// Sort records in place by `key` and `order`.
///
/// Ties fall back to the absolute path so the order is total.
pub fn sort_records(records: &mut [FileRecord], key: SortKey, order: SortOrder) {
    records.sort_by(|left, right| {
        let primary = match key {
            SortKey::Name => left.name.cmp(&right.name),
            SortKey::Size => left.size_bytes.cmp(&right.size_bytes),
            SortKey::CreatedAt => left.created_at.cmp(&right.created_at),
        };
        let ordering = primary.then_with(|| left.absolute_path.cmp(&right.absolute_path));
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

/// Compute totals and the extension histogram for a listing.
#[must_use]
pub fn summarize(records: &[FileRecord]) -> InventorySummary {
    let mut extensions = BTreeMap::new();
    for record in records {
        let extension = Path::new(&record.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        *extensions.entry(extension).or_insert(0) += 1;
    }
    InventorySummary {
        file_count: records.len(),
        total_bytes: records.iter().map(|record| record.size_bytes).sum(),
        extensions,
        newest: records
            .iter()
            .max_by_key(|record| record.created_at)
            .cloned(),
    }
}

/// Render a byte count with binary units and two decimals.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}

fn record_from(path: &Path, metadata: &Metadata) -> FileRecord {
    let timestamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_or_else(|_| DateTime::<Utc>::default(), DateTime::<Utc>::from);
    FileRecord {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        absolute_path: path.to_path_buf(),
        size_bytes: metadata.len(),
        created_at: timestamp,
    }
}
