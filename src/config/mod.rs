//! Configuration boundary for the export lane
//!
//! Implements the layered input merge:
//! 1. Built-in defaults
//! 2. Lane file (.export-lane.toml)
//! 3. Process environment
//! 4. CLI flags
//!
//! `ExportInputs::load` is the only place in the crate that reads the
//! process environment. Every other component receives an immutable
//! `ExportInputs` at construction.

mod file;

pub use file::{LaneFile, TimeoutsSection, DEFAULT_LANE_FILE};

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialSet;

/// Default base directory for artifacts and reports
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Default location of the archive produced by the upstream build step
pub const DEFAULT_ARCHIVE_PATH: &str = "build/ios/archive/Runner.xcarchive";

/// Fixed name of the exported package under the output directory
pub const PACKAGE_FILE_NAME: &str = "app.ipa";

/// Fixed name of the export options document under the output directory
pub const EXPORT_OPTIONS_FILE_NAME: &str = "ExportOptions.plist";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PROFILE_TYPE is required (app-store, ad-hoc, enterprise, development)")]
    MissingProfile,

    #[error("invalid distribution profile '{0}' (expected app-store, ad-hoc, enterprise, development)")]
    InvalidProfile(String),

    #[error("failed to read lane file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse lane file {path}: {message}")]
    FileParse { path: String, message: String },

    #[error("invalid timeout configuration: {0}")]
    InvalidTimeout(String),
}

/// Distribution profile (closed set)
///
/// Selects export method, code-signing posture, and compliance rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionProfile {
    AppStore,
    AdHoc,
    Enterprise,
    Development,
}

impl DistributionProfile {
    /// All known profiles, in declaration order
    pub const ALL: [DistributionProfile; 4] = [
        DistributionProfile::AppStore,
        DistributionProfile::AdHoc,
        DistributionProfile::Enterprise,
        DistributionProfile::Development,
    ];

    /// The export method string consumed by the export tool
    pub fn method(&self) -> &'static str {
        match self {
            DistributionProfile::AppStore => "app-store",
            DistributionProfile::AdHoc => "ad-hoc",
            DistributionProfile::Enterprise => "enterprise",
            DistributionProfile::Development => "development",
        }
    }

    /// Whether debug symbols are uploaded with the package
    pub fn upload_symbols(&self) -> bool {
        matches!(self, DistributionProfile::AppStore)
    }

    /// Whether Swift symbols are stripped from the package
    pub fn strip_swift_symbols(&self) -> bool {
        !matches!(self, DistributionProfile::Development)
    }

    /// Whether App Store compliance validation applies to this profile
    pub fn requires_store_validation(&self) -> bool {
        matches!(self, DistributionProfile::AppStore)
    }
}

impl fmt::Display for DistributionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for DistributionProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app-store" => Ok(DistributionProfile::AppStore),
            "ad-hoc" => Ok(DistributionProfile::AdHoc),
            "enterprise" => Ok(DistributionProfile::Enterprise),
            "development" => Ok(DistributionProfile::Development),
            other => Err(ConfigError::InvalidProfile(other.to_string())),
        }
    }
}

/// Timeout configuration
///
/// All enforcement is lane-side: the export tool and download transport
/// are killed once their wall-clock budget is exhausted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Maximum wall-clock seconds for one export invocation (default: 1800)
    pub export_seconds: u64,

    /// Maximum wall-clock seconds for one download (default: 120)
    pub download_seconds: u64,

    /// Download attempts before a strategy gives up (default: 3)
    pub download_attempts: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            export_seconds: 1800,
            download_seconds: 120,
            download_attempts: 3,
        }
    }
}

impl TimeoutConfig {
    /// Validate timeout bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        // export_seconds must be in (0, 86400]
        if self.export_seconds == 0 || self.export_seconds > 86_400 {
            return Err(ConfigError::InvalidTimeout(format!(
                "export_seconds {} out of bounds (1..=86400)",
                self.export_seconds
            )));
        }

        // download_seconds must be in (0, 3600]
        if self.download_seconds == 0 || self.download_seconds > 3600 {
            return Err(ConfigError::InvalidTimeout(format!(
                "download_seconds {} out of bounds (1..=3600)",
                self.download_seconds
            )));
        }

        // download_attempts must be in (0, 10]
        if self.download_attempts == 0 || self.download_attempts > 10 {
            return Err(ConfigError::InvalidTimeout(format!(
                "download_attempts {} out of bounds (1..=10)",
                self.download_attempts
            )));
        }

        Ok(())
    }

    fn apply_file(&mut self, section: &TimeoutsSection) {
        if let Some(v) = section.export_seconds {
            self.export_seconds = v;
        }
        if let Some(v) = section.download_seconds {
            self.download_seconds = v;
        }
        if let Some(v) = section.download_attempts {
            self.download_attempts = v;
        }
    }
}

/// CLI-level overrides applied on top of file and environment values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub profile: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
}

/// Immutable inputs for one export invocation
///
/// Built once by the boundary loader; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ExportInputs {
    /// Unique id for this export session
    pub session_id: String,

    /// Distribution profile
    pub profile: DistributionProfile,

    /// Application bundle identifier (may be empty; the export tool rejects it)
    pub bundle_id: String,

    /// Development team identifier (may be empty; the export tool rejects it)
    pub team_id: String,

    /// Archive produced by the upstream build step
    pub archive_path: PathBuf,

    /// Base directory for artifacts and reports
    pub output_dir: PathBuf,

    /// Credential bundles, possibly incomplete
    pub credentials: CredentialSet,

    /// Timeout budgets
    pub timeouts: TimeoutConfig,
}

impl ExportInputs {
    /// Build inputs from an explicit environment map
    ///
    /// This is the single configuration boundary. `env` is normally the
    /// process environment; tests pass a synthetic map.
    pub fn from_env_map(
        env: &HashMap<String, String>,
        lane_file: &LaneFile,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| -> Option<String> {
            env.get(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let profile_raw = overrides
            .profile
            .clone()
            .or_else(|| get("PROFILE_TYPE"))
            .ok_or(ConfigError::MissingProfile)?;
        let profile: DistributionProfile = profile_raw.parse()?;

        let bundle_id = get("BUNDLE_ID").unwrap_or_default();
        let team_id = get("APPLE_TEAM_ID").unwrap_or_default();

        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| get("OUTPUT_DIR").map(PathBuf::from))
            .or_else(|| lane_file.output_dir.clone().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let archive_path = overrides
            .archive_path
            .clone()
            .or_else(|| get("ARCHIVE_PATH").map(PathBuf::from))
            .or_else(|| lane_file.archive_path.clone().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_PATH));

        let mut timeouts = TimeoutConfig::default();
        timeouts.apply_file(&lane_file.timeouts);
        timeouts.validate()?;

        let credentials = CredentialSet::from_env_map(env);

        Ok(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            profile,
            bundle_id,
            team_id,
            archive_path,
            output_dir,
            credentials,
            timeouts,
        })
    }

    /// Build inputs from the process environment
    pub fn load(
        overrides: &CliOverrides,
        lane_file_path: Option<&PathBuf>,
    ) -> Result<Self, ConfigError> {
        let lane_file = match lane_file_path {
            Some(path) => LaneFile::from_file(path)?,
            None => LaneFile::load_default()?,
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&env, &lane_file, overrides)
    }

    /// Path of the exported package under the output directory
    pub fn package_path(&self) -> PathBuf {
        self.output_dir.join(PACKAGE_FILE_NAME)
    }

    /// Path of the export options document under the output directory
    pub fn export_options_path(&self) -> PathBuf {
        self.output_dir.join(EXPORT_OPTIONS_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(
            "app-store".parse::<DistributionProfile>().unwrap(),
            DistributionProfile::AppStore
        );
        assert_eq!(
            "ad-hoc".parse::<DistributionProfile>().unwrap(),
            DistributionProfile::AdHoc
        );
        assert_eq!(
            "enterprise".parse::<DistributionProfile>().unwrap(),
            DistributionProfile::Enterprise
        );
        assert_eq!(
            "development".parse::<DistributionProfile>().unwrap(),
            DistributionProfile::Development
        );
        assert!(matches!(
            "appstore".parse::<DistributionProfile>(),
            Err(ConfigError::InvalidProfile(_))
        ));
    }

    #[test]
    fn test_profile_policy_table() {
        assert!(DistributionProfile::AppStore.upload_symbols());
        assert!(!DistributionProfile::AdHoc.upload_symbols());
        assert!(!DistributionProfile::Enterprise.upload_symbols());
        assert!(!DistributionProfile::Development.upload_symbols());

        assert!(DistributionProfile::AppStore.strip_swift_symbols());
        assert!(DistributionProfile::AdHoc.strip_swift_symbols());
        assert!(DistributionProfile::Enterprise.strip_swift_symbols());
        assert!(!DistributionProfile::Development.strip_swift_symbols());

        assert!(DistributionProfile::AppStore.requires_store_validation());
        assert!(!DistributionProfile::AdHoc.requires_store_validation());
    }

    #[test]
    fn test_missing_profile_is_fatal() {
        let env = env_with(&[("BUNDLE_ID", "com.example.app")]);
        let err = ExportInputs::from_env_map(&env, &LaneFile::default(), &CliOverrides::default());
        assert!(matches!(err, Err(ConfigError::MissingProfile)));
    }

    #[test]
    fn test_defaults_applied() {
        let env = env_with(&[("PROFILE_TYPE", "development")]);
        let inputs =
            ExportInputs::from_env_map(&env, &LaneFile::default(), &CliOverrides::default())
                .unwrap();

        assert_eq!(inputs.profile, DistributionProfile::Development);
        assert_eq!(inputs.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(inputs.archive_path, PathBuf::from(DEFAULT_ARCHIVE_PATH));
        assert_eq!(inputs.bundle_id, "");
        assert_eq!(inputs.team_id, "");
        assert_eq!(inputs.package_path(), PathBuf::from("output/app.ipa"));
    }

    #[test]
    fn test_env_overrides_file() {
        let env = env_with(&[("PROFILE_TYPE", "ad-hoc"), ("OUTPUT_DIR", "from-env")]);
        let lane_file = LaneFile {
            output_dir: Some("from-file".to_string()),
            ..LaneFile::default()
        };
        let inputs =
            ExportInputs::from_env_map(&env, &lane_file, &CliOverrides::default()).unwrap();
        assert_eq!(inputs.output_dir, PathBuf::from("from-env"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_with(&[("PROFILE_TYPE", "ad-hoc"), ("OUTPUT_DIR", "from-env")]);
        let overrides = CliOverrides {
            profile: Some("enterprise".to_string()),
            output_dir: Some(PathBuf::from("from-cli")),
            archive_path: None,
        };
        let inputs = ExportInputs::from_env_map(&env, &LaneFile::default(), &overrides).unwrap();
        assert_eq!(inputs.profile, DistributionProfile::Enterprise);
        assert_eq!(inputs.output_dir, PathBuf::from("from-cli"));
    }

    #[test]
    fn test_timeout_validation() {
        assert!(TimeoutConfig::default().validate().is_ok());

        let zero = TimeoutConfig {
            export_seconds: 0,
            ..TimeoutConfig::default()
        };
        assert!(zero.validate().is_err());

        let oversized = TimeoutConfig {
            download_attempts: 11,
            ..TimeoutConfig::default()
        };
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn test_file_timeouts_applied_and_validated() {
        let env = env_with(&[("PROFILE_TYPE", "development")]);
        let lane_file = LaneFile {
            timeouts: TimeoutsSection {
                export_seconds: Some(900),
                download_seconds: None,
                download_attempts: Some(0),
            },
            ..LaneFile::default()
        };
        let err = ExportInputs::from_env_map(&env, &lane_file, &CliOverrides::default());
        assert!(matches!(err, Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_session_ids_unique() {
        let env = env_with(&[("PROFILE_TYPE", "development")]);
        let a = ExportInputs::from_env_map(&env, &LaneFile::default(), &CliOverrides::default())
            .unwrap();
        let b = ExportInputs::from_env_map(&env, &LaneFile::default(), &CliOverrides::default())
            .unwrap();
        assert_ne!(a.session_id, b.session_id);
    }
}
