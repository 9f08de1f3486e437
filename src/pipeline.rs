//! Export pipeline orchestration
//!
//! One build is one linear pass: build options, run the cascade, resolve
//! the artifact state, validate (app-store only), report. Every terminal
//! state writes its report before the caller sees a result; the exit code
//! is non-zero only when no artifact of any kind exists or an app-store
//! package fails compliance validation.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use log::{error, info};
use thiserror::Error;

use crate::artifact::{file_sha256, file_size, BuildArtifactState};
use crate::cascade::{Cascade, CascadeOutcome, ExportContext};
use crate::config::{ConfigError, ExportInputs, PACKAGE_FILE_NAME};
use crate::keychain::{SecurityCliStore, SigningStore};
use crate::options::{ExportOptions, OptionsError};
use crate::report::{ArtifactInfo, ExportSummary, ReportError, Reporter, SUMMARY_SCHEMA_ID, SUMMARY_SCHEMA_VERSION};
use crate::tool::{ExportTool, XcodebuildExport};
use crate::transfer::{CurlFetcher, Fetcher, RetryPolicy};
use crate::validate::{CodesignVerifier, SignatureVerifier, StoreValidator, ValidationReport};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("archive path {0} lies inside the output directory; it would be destroyed at startup")]
    ArchiveInsideOutput(String),

    #[error("export options error: {0}")]
    Options(#[from] OptionsError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("every signing strategy was exhausted and no artifact exists")]
    Exhausted,

    #[error("package failed store validation with {fatal_count} fatal finding(s)")]
    Validation { fatal_count: usize },
}

impl PipelineError {
    /// Stable exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::ArchiveInsideOutput(_) => 2,
            PipelineError::Options(_) => 2,
            PipelineError::Report(_) => 1,
            PipelineError::Io(_) => 1,
            PipelineError::Exhausted => 50,
            PipelineError::Validation { .. } => 70,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// External boundaries the pipeline drives
pub struct Components {
    pub tool: Box<dyn ExportTool>,
    pub fetcher: Box<dyn Fetcher>,
    pub store: Box<dyn SigningStore>,
    pub verifier: Box<dyn SignatureVerifier>,
}

impl Components {
    /// Production boundaries: xcodebuild, curl, security, codesign
    pub fn production(inputs: &ExportInputs, home: &Path) -> Self {
        let retry = RetryPolicy {
            max_attempts: inputs.timeouts.download_attempts,
            ..RetryPolicy::default()
        };
        Self {
            tool: Box::new(XcodebuildExport::new(Duration::from_secs(
                inputs.timeouts.export_seconds,
            ))),
            fetcher: Box::new(CurlFetcher::new(
                Duration::from_secs(inputs.timeouts.download_seconds),
                retry,
            )),
            store: Box::new(SecurityCliStore::new(
                None,
                SecurityCliStore::default_profiles_dir(home),
            )),
            verifier: Box::new(CodesignVerifier),
        }
    }
}

/// Terminal result of one pipeline run
#[derive(Debug)]
pub struct PipelineOutcome {
    pub artifact_state: BuildArtifactState,
    pub summary: ExportSummary,
}

/// The export pipeline
pub struct ExportPipeline {
    inputs: ExportInputs,
    components: Components,
}

impl ExportPipeline {
    pub fn new(inputs: ExportInputs, components: Components) -> Self {
        Self { inputs, components }
    }

    /// Run configuration, cascade, validation, and reporting
    pub fn run(&self) -> PipelineResult<PipelineOutcome> {
        info!(
            "export session {} starting (profile {})",
            self.inputs.session_id, self.inputs.profile
        );

        self.prepare_output_dir()?;

        // Export options document
        let options_path = self.inputs.export_options_path();
        ExportOptions::from_inputs(&self.inputs).write(&options_path)?;

        // Signing strategy cascade
        let ctx = ExportContext {
            inputs: &self.inputs,
            options_path: &options_path,
            tool: self.components.tool.as_ref(),
            fetcher: self.components.fetcher.as_ref(),
            store: self.components.store.as_ref(),
        };
        let cascade_outcome = Cascade::standard().run(&ctx);

        let artifact_state = BuildArtifactState::resolve(
            cascade_outcome.package_path().map(Path::to_path_buf),
            &self.inputs.archive_path,
        );

        // Store compliance validation, app-store packages only
        let validation = match &artifact_state {
            BuildArtifactState::Packaged(ipa)
                if self.inputs.profile.requires_store_validation() =>
            {
                Some(StoreValidator::new(self.components.verifier.as_ref()).validate(ipa))
            }
            _ => None,
        };

        self.finish(cascade_outcome, artifact_state, validation)
    }

    /// Truncate the output location so a prior run's artifacts can never be
    /// mistaken for this run's output.
    fn prepare_output_dir(&self) -> PipelineResult<()> {
        if self.inputs.archive_path.starts_with(&self.inputs.output_dir) {
            return Err(PipelineError::ArchiveInsideOutput(
                self.inputs.archive_path.display().to_string(),
            ));
        }

        if self.inputs.output_dir.exists() {
            fs::remove_dir_all(&self.inputs.output_dir)?;
        }
        fs::create_dir_all(&self.inputs.output_dir)?;
        Ok(())
    }

    /// Write the terminal report and map the artifact state to a result
    fn finish(
        &self,
        cascade_outcome: CascadeOutcome,
        artifact_state: BuildArtifactState,
        validation: Option<ValidationReport>,
    ) -> PipelineResult<PipelineOutcome> {
        let reporter = Reporter::new(&self.inputs.output_dir);

        let artifact = match &artifact_state {
            BuildArtifactState::Packaged(path) => Some(ArtifactInfo {
                name: PACKAGE_FILE_NAME.to_string(),
                size_bytes: file_size(path)?,
                sha256: file_sha256(path)?,
            }),
            _ => None,
        };

        let summary = ExportSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            session_id: self.inputs.session_id.clone(),
            created_at: chrono::Utc::now(),
            profile: self.inputs.profile,
            bundle_id: self.inputs.bundle_id.clone(),
            team_id: self.inputs.team_id.clone(),
            artifact_state: artifact_state.clone(),
            artifact,
            strategies: cascade_outcome.records.clone(),
            credentials: self.inputs.credentials.availability(),
            validation: validation.clone(),
        };

        match &artifact_state {
            BuildArtifactState::Packaged(path) => {
                reporter.write_summary(&summary)?;

                if let Some(ref report) = validation {
                    if !report.passed {
                        let fatal_count = report.fatals().count();
                        error!(
                            "package {} failed store validation ({} fatal finding(s))",
                            path.display(),
                            fatal_count
                        );
                        return Err(PipelineError::Validation { fatal_count });
                    }
                }

                info!("export succeeded: {}", path.display());
                Ok(PipelineOutcome {
                    artifact_state,
                    summary,
                })
            }
            BuildArtifactState::ArchiveOnly(archive) => {
                // Degraded success: the caller still gets exit code 0, plus
                // instructions for finishing the export by hand.
                reporter.package_archive_only(archive, self.inputs.profile)?;
                reporter.write_summary(&summary)?;
                info!(
                    "export exhausted; archive repackaged for manual export: {}",
                    archive.display()
                );
                Ok(PipelineOutcome {
                    artifact_state,
                    summary,
                })
            }
            BuildArtifactState::NoArtifact => {
                reporter.write_troubleshooting(
                    self.inputs.profile,
                    &summary.credentials,
                    &summary.strategies,
                )?;
                reporter.write_summary(&summary)?;
                error!("export exhausted with no artifact of any kind");
                Err(PipelineError::Exhausted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionProfile;
    use crate::mock::{test_inputs, MockExportTool, MockFetcher, MockSignatureVerifier, MockSigningStore};
    use tempfile::TempDir;

    fn mock_components(tool: MockExportTool) -> Components {
        Components {
            tool: Box::new(tool),
            fetcher: Box::new(MockFetcher::new()),
            store: Box::new(MockSigningStore::new()),
            verifier: Box::new(MockSignatureVerifier::distribution()),
        }
    }

    #[test]
    fn test_archive_inside_output_rejected() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        let mut inputs = test_inputs(DistributionProfile::Development, &output, &[]);
        inputs.archive_path = output.join("App.xcarchive");

        let pipeline = ExportPipeline::new(inputs, mock_components(MockExportTool::succeeding()));
        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveInsideOutput(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_stale_output_truncated() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("stale.ipa"), b"stale").unwrap();

        let inputs = test_inputs(DistributionProfile::Development, &output, &[]);
        let pipeline = ExportPipeline::new(inputs, mock_components(MockExportTool::succeeding()));
        let outcome = pipeline.run().unwrap();

        assert!(!output.join("stale.ipa").exists());
        assert!(matches!(
            outcome.artifact_state,
            BuildArtifactState::Packaged(_)
        ));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PipelineError::Exhausted.exit_code(), 50);
        assert_eq!(PipelineError::Validation { fatal_count: 1 }.exit_code(), 70);
        assert_eq!(
            PipelineError::Config(ConfigError::MissingProfile).exit_code(),
            2
        );
    }
}
