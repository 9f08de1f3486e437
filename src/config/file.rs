//! Lane config file (.export-lane.toml)
//!
//! Optional per-repo file supplying defaults for paths and timeouts.
//! Environment variables and CLI flags take precedence over file values.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default lane file location relative to the working directory
pub const DEFAULT_LANE_FILE: &str = ".export-lane.toml";

/// Parsed lane config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneFile {
    /// Base directory for artifacts and reports
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Path to the archive produced by the upstream build step
    #[serde(default)]
    pub archive_path: Option<String>,

    /// Timeout overrides
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

/// `[timeouts]` section of the lane file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    /// Maximum wall-clock seconds for one export invocation
    #[serde(default)]
    pub export_seconds: Option<u64>,

    /// Maximum wall-clock seconds for one download
    #[serde(default)]
    pub download_seconds: Option<u64>,

    /// Download attempts before a strategy gives up
    #[serde(default)]
    pub download_attempts: Option<u32>,
}

impl LaneFile {
    /// Load a lane file from disk
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load the default lane file if it exists, otherwise an empty file
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_LANE_FILE);
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".export-lane.toml");
        fs::write(
            &path,
            r#"
output_dir = "dist"
archive_path = "build/App.xcarchive"

[timeouts]
export_seconds = 900
download_seconds = 60
download_attempts = 2
"#,
        )
        .unwrap();

        let file = LaneFile::from_file(&path).unwrap();
        assert_eq!(file.output_dir.as_deref(), Some("dist"));
        assert_eq!(file.archive_path.as_deref(), Some("build/App.xcarchive"));
        assert_eq!(file.timeouts.export_seconds, Some(900));
        assert_eq!(file.timeouts.download_attempts, Some(2));
    }

    #[test]
    fn test_empty_file_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".export-lane.toml");
        fs::write(&path, "").unwrap();

        let file = LaneFile::from_file(&path).unwrap();
        assert!(file.output_dir.is_none());
        assert!(file.timeouts.export_seconds.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".export-lane.toml");
        fs::write(&path, "not_a_key = true\n").unwrap();

        assert!(LaneFile::from_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_error() {
        let err = LaneFile::from_file(Path::new("/nonexistent/.export-lane.toml"));
        assert!(matches!(err, Err(ConfigError::FileRead { .. })));
    }
}
