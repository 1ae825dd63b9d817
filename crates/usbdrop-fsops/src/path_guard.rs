//! Containment and readability checks applied before any file is read.
//!
//! Both checks resolve the filesystem at call time. A path that cannot be
//! resolved is treated as unsafe rather than surfaced as an error.

use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

/// Whether `candidate` resolves to `root` or to a descendant of `root`.
///
/// Both paths are canonicalised first, so `..` segments and symlink
/// components are judged by where they actually lead.
#[must_use]
pub fn is_safe(root: &Path, candidate: &Path) -> bool {
    let Ok(root) = fs::canonicalize(root) else {
        debug!(root = %root.display(), "root could not be resolved");
        return false;
    };
    match fs::canonicalize(candidate) {
        Ok(resolved) => resolved.starts_with(&root),
        Err(err) => {
            debug!(
                candidate = %candidate.display(),
                error = %err,
                "candidate could not be resolved"
            );
            false
        }
    }
}

/// Whether `path` is a regular file this process can open for reading.
#[must_use]
pub fn is_accessible(path: &Path) -> bool {
    let is_file = fs::metadata(path).is_ok_and(|metadata| metadata.is_file());
    is_file && File::open(path).is_ok()
}
