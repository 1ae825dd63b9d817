//! Filesystem fixtures for tests that need real files on disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow};

/// Write `contents` to `relative` under `dir`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the parent directories or the file cannot be created.
pub fn write_file(dir: &Path, relative: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(path)
}

/// Populate `dir` with one file per `(relative, contents)` pair.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn tree(dir: &Path, files: &[(&str, &[u8])]) -> Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|(relative, contents)| write_file(dir, relative, contents))
        .collect()
}

/// Set the modification time of `path` to `age` before now.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its timestamp cannot be set.
pub fn backdate(path: &Path, age: Duration) -> Result<()> {
    let when = SystemTime::now()
        .checked_sub(age)
        .ok_or_else(|| anyhow!("age {age:?} predates the epoch"))?;
    let file = File::options()
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    file.set_modified(when)
        .with_context(|| format!("failed to backdate '{}'", path.display()))
}
