//! Deflate-compressed zip packaging of a flat set of source files.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{FsOpsError, FsOpsResult};

const FALLBACK_LABEL: &str = "delivery";

/// Write every source into a single zip at `destination`, keyed by base name.
///
/// Directory structure is not preserved. Duplicate base names are logged and
/// handed to the zip writer unchanged. On failure the partially written archive is
/// removed before the error is returned.
///
/// # Errors
///
/// Returns an error when a source cannot be read, a source has no file name,
/// or the archive cannot be written.
pub fn build_archive(sources: &[PathBuf], destination: &Path) -> FsOpsResult<PathBuf> {
    match write_archive(sources, destination) {
        Ok(()) => {
            debug!(
                archive = %destination.display(),
                entries = sources.len(),
                "archive written"
            );
            Ok(destination.to_path_buf())
        }
        Err(err) => {
            discard_partial(destination);
            Err(err)
        }
    }
}

/// File name used for the archive of a request with the given label.
///
/// Whitespace and path separators become `_`; an empty label falls back to
/// `delivery`.
#[must_use]
pub fn archive_file_name(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || matches!(ch, '/' | '\\' | ':') {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let stem = if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        FALLBACK_LABEL
    } else {
        cleaned.as_str()
    };
    format!("{stem}.zip")
}

fn write_archive(sources: &[PathBuf], destination: &Path) -> FsOpsResult<()> {
    let file = File::create(destination)
        .map_err(|err| FsOpsError::io("archive.create", destination, err))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut seen = HashSet::new();
    for source in sources {
        let entry_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| FsOpsError::InvalidInput {
                field: "source",
                reason: "missing_file_name",
                value: Some(source.display().to_string()),
            })?;
        if !seen.insert(entry_name.clone()) {
            warn!(
                entry = %entry_name,
                source = %source.display(),
                "duplicate base name written to archive"
            );
        }

        let mut input =
            File::open(source).map_err(|err| FsOpsError::io("archive.open_source", source, err))?;
        zip.start_file(entry_name, options)
            .map_err(|err| FsOpsError::zip("archive.start_entry", destination, err))?;
        io::copy(&mut input, &mut zip)
            .map_err(|err| FsOpsError::io("archive.copy_source", source, err))?;
    }

    let mut writer = zip
        .finish()
        .map_err(|err| FsOpsError::zip("archive.finish", destination, err))?;
    writer
        .flush()
        .map_err(|err| FsOpsError::io("archive.flush", destination, err))
}

fn discard_partial(destination: &Path) {
    match fs::remove_file(destination) {
        Ok(()) => debug!(archive = %destination.display(), "partial archive removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            archive = %destination.display(),
            error = %err,
            "failed to remove partial archive"
        ),
    }
}
