//! Size-bounded splitting of a file into numbered parts.
//!
//! Parts are named `<file>.part<N>` with a zero-based `N`. Concatenating them
//! in index order yields the source byte for byte.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// One deliverable chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Part {
    /// Location of the part on disk.
    pub path: PathBuf,
    /// Zero-based position used for reassembly.
    pub sequence_index: u32,
    /// Size of the part in bytes.
    pub size_bytes: u64,
}

/// Split `file_path` into parts of at most `max_part_bytes` bytes.
///
/// A file that already fits is returned as a single part pointing at the
/// original path; nothing is copied. Otherwise parts are written next to the
/// source, and the last part carries the remainder. No zero-byte part is ever
/// produced.
///
/// # Errors
///
/// Returns an error when `max_part_bytes` is zero, when the source cannot be
/// read, or when a part cannot be written. Parts written before the failure are
/// removed.
pub fn split(file_path: &Path, max_part_bytes: u64) -> FsOpsResult<Vec<Part>> {
    if max_part_bytes == 0 {
        return Err(FsOpsError::InvalidInput {
            field: "max_part_bytes",
            reason: "zero",
            value: Some("0".to_string()),
        });
    }

    let source_size = fs::metadata(file_path)
        .map_err(|err| FsOpsError::io("split.metadata", file_path, err))?
        .len();
    if source_size <= max_part_bytes {
        return Ok(vec![Part {
            path: file_path.to_path_buf(),
            sequence_index: 0,
            size_bytes: source_size,
        }]);
    }

    let mut written = Vec::new();
    match write_parts(file_path, source_size, max_part_bytes, &mut written) {
        Ok(()) => {
            debug!(
                source = %file_path.display(),
                parts = written.len(),
                "file split into parts"
            );
            Ok(written)
        }
        Err(err) => {
            discard_parts(&written);
            Err(err)
        }
    }
}

/// Path of the part with the given index for `file_path`.
#[must_use]
pub fn part_path(file_path: &Path, sequence_index: u32) -> PathBuf {
    let mut name = OsString::from(file_path.as_os_str());
    name.push(format!(".part{sequence_index}"));
    PathBuf::from(name)
}

fn write_parts(
    file_path: &Path,
    source_size: u64,
    max_part_bytes: u64,
    written: &mut Vec<Part>,
) -> FsOpsResult<()> {
    let part_count = source_size.div_ceil(max_part_bytes);
    let source = File::open(file_path).map_err(|err| FsOpsError::io("split.open", file_path, err))?;
    let mut reader = BufReader::new(source);

    for index in 0..part_count {
        let sequence_index = u32::try_from(index).map_err(|_| FsOpsError::InvalidInput {
            field: "max_part_bytes",
            reason: "too_many_parts",
            value: Some(max_part_bytes.to_string()),
        })?;
        let expected = max_part_bytes.min(source_size - index * max_part_bytes);
        let path = part_path(file_path, sequence_index);

        let output =
            File::create(&path).map_err(|err| FsOpsError::io("split.create_part", &path, err))?;
        written.push(Part {
            path: path.clone(),
            sequence_index,
            size_bytes: 0,
        });
        let mut output = BufWriter::new(output);
        let copied = io::copy(&mut reader.by_ref().take(expected), &mut output)
            .map_err(|err| FsOpsError::io("split.copy", &path, err))?;
        output
            .flush()
            .map_err(|err| FsOpsError::io("split.flush", &path, err))?;
        if copied != expected {
            return Err(FsOpsError::io(
                "split.short_read",
                file_path,
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        if let Some(part) = written.last_mut() {
            part.size_bytes = copied;
        }
    }
    Ok(())
}

fn discard_parts(parts: &[Part]) {
    for part in parts {
        if let Err(err) = fs::remove_file(&part.path) {
            warn!(part = %part.path.display(), error = %err, "failed to remove partial part");
        }
    }
}
