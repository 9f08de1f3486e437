//! External export tool boundary
//!
//! Abstracts the vendor export invocation behind the `ExportTool` trait so
//! the cascade can be exercised against a mock. The production
//! implementation shells out to `xcodebuild -exportArchive`.

pub mod process;

pub use process::{run_with_timeout, ProcessOutcome};

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

/// Errors from the export tool boundary
#[derive(Debug, Error)]
pub enum ExportToolError {
    #[error("required tool '{0}' is not installed or not on PATH")]
    Missing(String),

    #[error("export invocation exceeded {seconds}s budget")]
    TimedOut { seconds: u64 },

    #[error("export invocation failed (exit code {code:?}): {detail}")]
    Failed { code: Option<i32>, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// API-key authentication material staged for one invocation
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    /// Private key file, already staged with restrictive permissions
    pub key_path: PathBuf,

    /// App Store Connect key identifier
    pub key_id: String,

    /// App Store Connect issuer identifier
    pub issuer_id: String,
}

/// One export invocation
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Archive produced by the upstream build step
    pub archive_path: PathBuf,

    /// Export options document
    pub options_path: PathBuf,

    /// Directory the tool writes the package into
    pub output_dir: PathBuf,

    /// API-key authentication, when the strategy supplies it
    pub auth: Option<ApiKeyAuth>,
}

/// The export operation, a single blocking external call
pub trait ExportTool {
    /// Run one export invocation; success means the tool exited cleanly.
    /// The cascade verifies separately that a package actually appeared.
    fn export(&self, request: &ExportRequest) -> Result<(), ExportToolError>;
}

/// Production implementation: `xcodebuild -exportArchive`
pub struct XcodebuildExport {
    program: String,
    timeout: Duration,
}

impl XcodebuildExport {
    /// Create an exporter with the given wall-clock budget
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "xcodebuild".to_string(),
            timeout,
        }
    }

    /// Override the program name (used by unit tests)
    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Argument vector for one invocation
    fn build_args(request: &ExportRequest) -> Vec<String> {
        let mut args = vec![
            "-exportArchive".to_string(),
            "-archivePath".to_string(),
            request.archive_path.display().to_string(),
            "-exportPath".to_string(),
            request.output_dir.display().to_string(),
            "-exportOptionsPlist".to_string(),
            request.options_path.display().to_string(),
            "-allowProvisioningUpdates".to_string(),
        ];

        if let Some(ref auth) = request.auth {
            args.push("-authenticationKeyPath".to_string());
            args.push(auth.key_path.display().to_string());
            args.push("-authenticationKeyID".to_string());
            args.push(auth.key_id.clone());
            args.push("-authenticationKeyIssuerID".to_string());
            args.push(auth.issuer_id.clone());
        }

        args
    }
}

impl ExportTool for XcodebuildExport {
    fn export(&self, request: &ExportRequest) -> Result<(), ExportToolError> {
        let args = Self::build_args(request);
        debug!("running {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&args);

        let outcome = run_with_timeout(command, self.timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ExportToolError::Missing(self.program.clone())
            } else {
                ExportToolError::Io(e)
            }
        })?;

        if outcome.timed_out {
            return Err(ExportToolError::TimedOut {
                seconds: self.timeout.as_secs(),
            });
        }

        if !outcome.success() {
            return Err(ExportToolError::Failed {
                code: outcome.exit_code,
                detail: outcome.stderr_tail(10),
            });
        }

        info!(
            "export tool finished in {:.1}s",
            outcome.duration.as_secs_f64()
        );
        Ok(())
    }
}

/// Probe for a tool's presence without running real work
pub fn probe_tool(name: &str, version_arg: &str) -> Result<(), ExportToolError> {
    let mut command = Command::new(name);
    command.arg(version_arg);

    match run_with_timeout(command, Duration::from_secs(15)) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ExportToolError::Missing(name.to_string()))
        }
        Err(e) => Err(ExportToolError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(auth: Option<ApiKeyAuth>) -> ExportRequest {
        ExportRequest {
            archive_path: PathBuf::from("build/App.xcarchive"),
            options_path: PathBuf::from("output/ExportOptions.plist"),
            output_dir: PathBuf::from("output"),
            auth,
        }
    }

    #[test]
    fn test_args_without_auth() {
        let args = XcodebuildExport::build_args(&request(None));
        assert_eq!(args[0], "-exportArchive");
        assert!(args.contains(&"-archivePath".to_string()));
        assert!(args.contains(&"build/App.xcarchive".to_string()));
        assert!(args.contains(&"-allowProvisioningUpdates".to_string()));
        assert!(!args.contains(&"-authenticationKeyID".to_string()));
    }

    #[test]
    fn test_args_with_auth() {
        let auth = ApiKeyAuth {
            key_path: PathBuf::from("/tmp/keys/AuthKey_KEY123.p8"),
            key_id: "KEY123".to_string(),
            issuer_id: "issuer-1".to_string(),
        };
        let args = XcodebuildExport::build_args(&request(Some(auth)));
        assert!(args.contains(&"-authenticationKeyPath".to_string()));
        assert!(args.contains(&"/tmp/keys/AuthKey_KEY123.p8".to_string()));
        assert!(args.contains(&"-authenticationKeyID".to_string()));
        assert!(args.contains(&"KEY123".to_string()));
        assert!(args.contains(&"-authenticationKeyIssuerID".to_string()));
        assert!(args.contains(&"issuer-1".to_string()));
    }

    #[test]
    fn test_missing_program_maps_to_missing() {
        let exporter = XcodebuildExport::new(Duration::from_secs(1))
            .with_program("definitely-not-xcodebuild-4471");
        let err = exporter.export(&request(None)).unwrap_err();
        assert!(matches!(err, ExportToolError::Missing(name) if name.contains("4471")));
    }

    #[test]
    fn test_failing_program_maps_to_failed() {
        // `false` exits 1 with no output on any unix host
        let exporter = XcodebuildExport::new(Duration::from_secs(5)).with_program("false");
        let err = exporter.export(&request(None)).unwrap_err();
        assert!(matches!(err, ExportToolError::Failed { .. }));
    }

    #[test]
    fn test_probe_tool_missing() {
        let err = probe_tool("definitely-not-a-tool-8812", "-version").unwrap_err();
        assert!(matches!(err, ExportToolError::Missing(_)));
    }

    #[test]
    fn test_probe_tool_present() {
        assert!(probe_tool("sh", "-c").is_ok() || probe_tool("sh", "--help").is_ok());
    }
}
