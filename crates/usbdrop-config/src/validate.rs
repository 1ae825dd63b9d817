//! Validation helpers and parsing utilities for environment values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

pub(crate) fn parse_positive_u64(field: &'static str, value: &str) -> ConfigResult<u64> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", value))?;
    if parsed == 0 {
        return Err(ConfigError::invalid(field, "not_positive", value));
    }
    Ok(parsed)
}

pub(crate) fn parse_positive_usize(field: &'static str, value: &str) -> ConfigResult<usize> {
    let parsed = parse_positive_u64(field, value)?;
    usize::try_from(parsed).map_err(|_| ConfigError::invalid(field, "out_of_range", value))
}

pub(crate) fn parse_duration_secs(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_positive_u64(field, value).map(Duration::from_secs)
}

pub(crate) fn parse_log_level(value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid("log_level", "empty", value));
    }
    Ok(trimmed.to_string())
}

/// Ensure `path` exists and is a directory.
///
/// # Errors
///
/// Returns `ConfigError::Io` when the path cannot be inspected and
/// `ConfigError::InvalidField` when it is not a directory.
pub fn ensure_directory(field: &'static str, path: &Path) -> ConfigResult<()> {
    let metadata = fs::metadata(path).map_err(|source| ConfigError::Io {
        operation: "validate.ensure_directory",
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ConfigError::invalid(field, "not_a_directory", &path.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_u64_rejects_zero_and_garbage() {
        assert_eq!(parse_positive_u64("max_part_bytes", " 50 ").ok(), Some(50));
        assert!(matches!(
            parse_positive_u64("max_part_bytes", "0"),
            Err(ConfigError::InvalidField {
                reason: "not_positive",
                ..
            })
        ));
        assert!(matches!(
            parse_positive_u64("max_part_bytes", "fifty"),
            Err(ConfigError::InvalidField {
                reason: "not_an_integer",
                ..
            })
        ));
    }

    #[test]
    fn parse_duration_secs_builds_durations() {
        assert_eq!(
            parse_duration_secs("retention", "3600").ok(),
            Some(Duration::from_hours(1))
        );
        assert!(parse_duration_secs("retention", "-1").is_err());
    }

    #[test]
    fn parse_log_level_rejects_blank() {
        assert_eq!(parse_log_level(" debug ").ok().as_deref(), Some("debug"));
        assert!(parse_log_level("   ").is_err());
    }

    #[test]
    fn ensure_directory_distinguishes_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        ensure_directory("root", temp.path())?;

        let file = temp.path().join("plain.txt");
        fs::write(&file, b"x")?;
        assert!(matches!(
            ensure_directory("root", &file),
            Err(ConfigError::InvalidField {
                reason: "not_a_directory",
                ..
            })
        ));
        assert!(matches!(
            ensure_directory("root", &temp.path().join("missing")),
            Err(ConfigError::Io { .. })
        ));
        Ok(())
    }
}
