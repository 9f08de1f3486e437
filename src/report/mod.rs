//! Durable reports
//!
//! Every terminal state writes a report before the process exits: a
//! summary on success, manual-export instructions when only the archive
//! survives, and a troubleshooting guide when nothing was produced. The
//! machine-readable summary is a schema-versioned JSON companion to the
//! plain-text documents.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::artifact::BuildArtifactState;
use crate::cascade::{StepOutcome, StrategyRecord};
use crate::config::DistributionProfile;
use crate::credentials::CredentialAvailability;
use crate::validate::ValidationReport;

/// Schema version for export_summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for export_summary.json
pub const SUMMARY_SCHEMA_ID: &str = "ipa-export/summary@1";

/// Plain-text summary document name
pub const SUMMARY_TEXT_FILE_NAME: &str = "export_summary.txt";

/// Machine-readable summary document name
pub const SUMMARY_JSON_FILE_NAME: &str = "export_summary.json";

/// Troubleshooting document name
pub const TROUBLESHOOTING_FILE_NAME: &str = "troubleshooting.txt";

/// Directory holding the repackaged archive on degraded success
pub const ARCHIVE_EXPORT_DIR_NAME: &str = "archive_export";

/// Manual-export instructions document name
pub const MANUAL_INSTRUCTIONS_FILE_NAME: &str = "MANUAL_EXPORT_INSTRUCTIONS.txt";

/// Report errors
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identity of the produced artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Machine-readable summary (export_summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub profile: DistributionProfile,
    pub bundle_id: String,
    pub team_id: String,
    pub artifact_state: BuildArtifactState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInfo>,

    pub strategies: Vec<StrategyRecord>,
    pub credentials: CredentialAvailability,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl ExportSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e)))
    }
}

/// Writes the report documents under the output directory
pub struct Reporter {
    output_dir: PathBuf,
}

impl Reporter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Write both summary documents; returns the text document's path
    pub fn write_summary(&self, summary: &ExportSummary) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.output_dir)?;

        let json_path = self.output_dir.join(SUMMARY_JSON_FILE_NAME);
        fs::write(&json_path, summary.to_json()?)?;

        let text_path = self.output_dir.join(SUMMARY_TEXT_FILE_NAME);
        fs::write(&text_path, render_summary_text(summary))?;

        info!("summary written: {}", text_path.display());
        Ok(text_path)
    }

    /// Write the troubleshooting guide for a build that produced nothing
    pub fn write_troubleshooting(
        &self,
        profile: DistributionProfile,
        credentials: &CredentialAvailability,
        records: &[StrategyRecord],
    ) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(TROUBLESHOOTING_FILE_NAME);
        fs::write(&path, render_troubleshooting(profile, credentials, records))?;
        info!("troubleshooting guide written: {}", path.display());
        Ok(path)
    }

    /// Repackage the intermediate archive for manual export
    ///
    /// Copies the archive into a labeled directory and writes profile-
    /// specific step-by-step instructions next to it.
    pub fn package_archive_only(
        &self,
        archive_path: &Path,
        profile: DistributionProfile,
    ) -> Result<PathBuf, ReportError> {
        let export_dir = self.output_dir.join(ARCHIVE_EXPORT_DIR_NAME);
        fs::create_dir_all(&export_dir)?;

        let archive_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.xcarchive".to_string());
        let dest = export_dir.join(&archive_name);
        copy_tree(archive_path, &dest)?;

        let instructions = export_dir.join(MANUAL_INSTRUCTIONS_FILE_NAME);
        fs::write(&instructions, render_manual_instructions(profile, &archive_name))?;

        info!("archive repackaged for manual export: {}", dest.display());
        Ok(export_dir)
    }
}

fn render_summary_text(summary: &ExportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== IPA Export Summary ===");
    let _ = writeln!(out, "Session:    {}", summary.session_id);
    let _ = writeln!(out, "Created:    {}", summary.created_at.to_rfc3339());
    let _ = writeln!(out, "Profile:    {}", summary.profile);
    let _ = writeln!(out, "Bundle ID:  {}", summary.bundle_id);
    let _ = writeln!(out, "Team ID:    {}", summary.team_id);
    let _ = writeln!(out);

    match &summary.artifact_state {
        BuildArtifactState::Packaged(path) => {
            let _ = writeln!(out, "Result: packaged artifact");
            let _ = writeln!(out, "  Path: {}", path.display());
            if let Some(ref artifact) = summary.artifact {
                let _ = writeln!(out, "  Name: {}", artifact.name);
                let _ = writeln!(out, "  Size: {} bytes", artifact.size_bytes);
                let _ = writeln!(out, "  SHA-256: {}", artifact.sha256);
            }
        }
        BuildArtifactState::ArchiveOnly(path) => {
            let _ = writeln!(out, "Result: archive only (manual export required)");
            let _ = writeln!(out, "  Archive: {}", path.display());
            let _ = writeln!(
                out,
                "  See {}/{} for next steps.",
                ARCHIVE_EXPORT_DIR_NAME, MANUAL_INSTRUCTIONS_FILE_NAME
            );
        }
        BuildArtifactState::NoArtifact => {
            let _ = writeln!(out, "Result: no artifact produced");
            let _ = writeln!(out, "  See {} for remediation.", TROUBLESHOOTING_FILE_NAME);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Strategies:");
    for record in &summary.strategies {
        let outcome = match record.outcome {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Failed => "failed",
            StepOutcome::Skipped => "skipped",
        };
        match record.detail {
            Some(ref detail) => {
                let _ = writeln!(out, "  {:<20} {:<10} {}", record.strategy, outcome, detail);
            }
            None => {
                let _ = writeln!(out, "  {:<20} {}", record.strategy, outcome);
            }
        }
    }

    if let Some(ref validation) = summary.validation {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Validation: {}",
            if validation.passed { "PASS" } else { "FAIL" }
        );
        for finding in &validation.findings {
            let _ = writeln!(
                out,
                "  [{:?}] {:?}: {}",
                finding.severity, finding.check, finding.message
            );
        }
    }

    out
}

fn render_troubleshooting(
    profile: DistributionProfile,
    credentials: &CredentialAvailability,
    records: &[StrategyRecord],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== IPA Export Troubleshooting ===");
    let _ = writeln!(out, "Active profile: {}", profile);
    let _ = writeln!(out);
    let _ = writeln!(out, "No package or archive was produced. What happened:");
    for record in records {
        let outcome = match record.outcome {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Failed => "failed",
            StepOutcome::Skipped => "skipped",
        };
        let detail = record.detail.as_deref().unwrap_or("");
        let _ = writeln!(out, "  {:<20} {:<10} {}", record.strategy, outcome, detail);
    }
    let _ = writeln!(out);

    if !credentials.api_key_complete {
        let _ = writeln!(out, "API-key export is unavailable. Missing:");
        for var in &credentials.api_key_missing {
            let _ = writeln!(out, "  - {}", var);
        }
        let _ = writeln!(out);
    }
    if !credentials.manual_complete {
        let _ = writeln!(out, "Manual-certificate export is unavailable. Missing:");
        for var in &credentials.manual_missing {
            let _ = writeln!(out, "  - {}", var);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Remediation per distribution profile:");
    for p in DistributionProfile::ALL {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", p);
        match p {
            DistributionProfile::AppStore => {
                let _ = writeln!(
                    out,
                    "  1. Provide an App Store Connect API key: set\n     APP_STORE_CONNECT_ISSUER_ID, APP_STORE_CONNECT_KEY_IDENTIFIER,\n     and APP_STORE_CONNECT_API_KEY_PATH."
                );
                let _ = writeln!(
                    out,
                    "  2. Or provide a distribution certificate: set CERT_P12_URL,\n     CERT_PASSWORD, and PROFILE_URL with an App Store provisioning profile."
                );
                let _ = writeln!(
                    out,
                    "  3. Confirm the app identifier exists in App Store Connect and\n     matches BUNDLE_ID."
                );
            }
            DistributionProfile::AdHoc => {
                let _ = writeln!(
                    out,
                    "  1. Provide a distribution certificate and an ad-hoc provisioning\n     profile via CERT_P12_URL, CERT_PASSWORD, and PROFILE_URL."
                );
                let _ = writeln!(
                    out,
                    "  2. Confirm every target device UDID is registered in the profile."
                );
            }
            DistributionProfile::Enterprise => {
                let _ = writeln!(
                    out,
                    "  1. Provide an enterprise distribution certificate and an in-house\n     provisioning profile via CERT_P12_URL, CERT_PASSWORD, and PROFILE_URL."
                );
                let _ = writeln!(
                    out,
                    "  2. Confirm APPLE_TEAM_ID names the enterprise team, not a\n     standard developer team."
                );
            }
            DistributionProfile::Development => {
                let _ = writeln!(
                    out,
                    "  1. Automatic signing needs a signing identity in the build\n     keychain; install a development certificate or supply CERT_P12_URL,\n     CERT_PASSWORD, and PROFILE_URL."
                );
            }
        }
    }

    out
}

fn render_manual_instructions(profile: DistributionProfile, archive_name: &str) -> String {
    let method = profile.method();
    let mut out = String::new();
    let _ = writeln!(out, "=== Manual Export Instructions ===");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Automated export did not complete, but the build archive is intact."
    );
    let _ = writeln!(out, "Archive: {}", archive_name);
    let _ = writeln!(out, "Profile: {}", profile);
    let _ = writeln!(out);
    let _ = writeln!(out, "To export the package manually:");
    let _ = writeln!(out, "  1. Copy {} to a Mac with Xcode installed.", archive_name);
    let _ = writeln!(
        out,
        "  2. Double-click the archive to open it in the Xcode Organizer."
    );
    let _ = writeln!(out, "  3. Click 'Distribute App'.");
    match profile {
        DistributionProfile::AppStore => {
            let _ = writeln!(
                out,
                "  4. Choose 'App Store Connect', then 'Export' (do not upload)."
            );
            let _ = writeln!(
                out,
                "  5. Sign in with an account that has access to the app record."
            );
        }
        DistributionProfile::AdHoc => {
            let _ = writeln!(out, "  4. Choose 'Ad Hoc' distribution.");
            let _ = writeln!(
                out,
                "  5. Select the provisioning profile that lists the target devices."
            );
        }
        DistributionProfile::Enterprise => {
            let _ = writeln!(out, "  4. Choose 'Enterprise' distribution.");
            let _ = writeln!(out, "  5. Select the in-house provisioning profile.");
        }
        DistributionProfile::Development => {
            let _ = writeln!(out, "  4. Choose 'Development' distribution.");
        }
    }
    let _ = writeln!(
        out,
        "  6. Let Xcode re-sign with the '{}' method and save the package.",
        method
    );
    out
}

/// Recursive directory copy (the archive is a directory tree)
fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk error"))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::StrategyKind;
    use crate::credentials::CredentialSet;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn sample_summary(state: BuildArtifactState) -> ExportSummary {
        ExportSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            session_id: "session-1".to_string(),
            created_at: Utc::now(),
            profile: DistributionProfile::AppStore,
            bundle_id: "com.example.app".to_string(),
            team_id: "TEAM123456".to_string(),
            artifact_state: state,
            artifact: Some(ArtifactInfo {
                name: "app.ipa".to_string(),
                size_bytes: 1024,
                sha256: "ab".repeat(32),
            }),
            strategies: vec![
                StrategyRecord {
                    strategy: StrategyKind::ApiKey,
                    outcome: StepOutcome::Skipped,
                    detail: Some("missing credentials".to_string()),
                    duration_ms: 0,
                },
                StrategyRecord {
                    strategy: StrategyKind::Automatic,
                    outcome: StepOutcome::Succeeded,
                    detail: None,
                    duration_ms: 1200,
                },
            ],
            credentials: CredentialSet::from_env_map(&HashMap::new()).availability(),
            validation: None,
        }
    }

    #[test]
    fn test_summary_roundtrip() {
        let summary = sample_summary(BuildArtifactState::Packaged("out/app.ipa".into()));
        let json = summary.to_json().unwrap();
        assert!(json.contains(r#""schema_id": "ipa-export/summary@1""#));
        let parsed = ExportSummary::from_json(&json).unwrap();
        assert_eq!(parsed.session_id, summary.session_id);
        assert_eq!(parsed.strategies.len(), 2);
    }

    #[test]
    fn test_write_summary_creates_both_documents() {
        let dir = TempDir::new().unwrap();
        let reporter = Reporter::new(dir.path());
        let summary = sample_summary(BuildArtifactState::Packaged("out/app.ipa".into()));

        let text_path = reporter.write_summary(&summary).unwrap();
        assert!(text_path.exists());
        assert!(dir.path().join(SUMMARY_JSON_FILE_NAME).exists());

        let text = fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("packaged artifact"));
        assert!(text.contains("api-key"));
        assert!(text.contains("skipped"));
        assert!(text.contains("succeeded"));
    }

    #[test]
    fn test_troubleshooting_lists_missing_credentials() {
        let dir = TempDir::new().unwrap();
        let reporter = Reporter::new(dir.path());
        let credentials = CredentialSet::from_env_map(&HashMap::new()).availability();

        let path = reporter
            .write_troubleshooting(DistributionProfile::AppStore, &credentials, &[])
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert!(text.contains("APP_STORE_CONNECT_ISSUER_ID"));
        assert!(text.contains("CERT_P12_URL"));
        // All four profiles have a remediation section.
        for profile in DistributionProfile::ALL {
            assert!(text.contains(&format!("[{}]", profile)));
        }
    }

    #[test]
    fn test_archive_only_packaging() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("App.xcarchive");
        fs::create_dir_all(archive.join("Products/Applications")).unwrap();
        fs::write(archive.join("Info.plist"), b"plist").unwrap();
        fs::write(
            archive.join("Products/Applications/app-binary"),
            b"binary",
        )
        .unwrap();

        let output = dir.path().join("out");
        let reporter = Reporter::new(&output);
        let export_dir = reporter
            .package_archive_only(&archive, DistributionProfile::AdHoc)
            .unwrap();

        assert!(export_dir.join("App.xcarchive/Info.plist").exists());
        assert!(export_dir
            .join("App.xcarchive/Products/Applications/app-binary")
            .exists());

        let instructions =
            fs::read_to_string(export_dir.join(MANUAL_INSTRUCTIONS_FILE_NAME)).unwrap();
        assert!(instructions.contains("Ad Hoc"));
        assert!(instructions.contains("App.xcarchive"));
    }

    #[test]
    fn test_manual_instructions_per_profile() {
        let store = render_manual_instructions(DistributionProfile::AppStore, "A.xcarchive");
        assert!(store.contains("App Store Connect"));
        let enterprise =
            render_manual_instructions(DistributionProfile::Enterprise, "A.xcarchive");
        assert!(enterprise.contains("in-house"));
    }
}
