//! API-key export strategy
//!
//! Stages the App Store Connect private key into a transient, restrictively
//! permissioned location and hands it to the export tool. The staging area
//! is removed on every exit path.

use std::fs;
use std::path::Path;

use log::debug;

use super::{Availability, ExportContext, ExportStrategy, StrategyError, StrategyKind};
use crate::config::DistributionProfile;
use crate::tool::{ApiKeyAuth, ExportRequest};

pub struct ApiKeyStrategy;

impl ExportStrategy for ApiKeyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ApiKey
    }

    fn availability(&self, ctx: &ExportContext) -> Availability {
        if ctx.inputs.profile != DistributionProfile::AppStore {
            return Availability::Skip(format!(
                "api-key export applies to the app-store profile only (profile is {})",
                ctx.inputs.profile
            ));
        }

        let missing = ctx.inputs.credentials.api_key.missing_fields();
        if !missing.is_empty() {
            return Availability::Skip(format!("missing credentials: {}", missing.join(", ")));
        }

        Availability::Ready
    }

    fn attempt(&self, ctx: &ExportContext) -> Result<(), StrategyError> {
        let creds = &ctx.inputs.credentials.api_key;
        let issuer_id = creds
            .issuer_id
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("issuer id".to_string()))?;
        let key_id = creds
            .key_id
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("key id".to_string()))?;
        let key_source = creds
            .key_source
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("key source".to_string()))?;

        let staging = tempfile::Builder::new()
            .prefix("ipa-export-key-")
            .tempdir()?;
        let key_path = staging.path().join(format!("AuthKey_{}.p8", key_id));

        let result = (|| -> Result<(), StrategyError> {
            ctx.fetcher.fetch(&key_source, &key_path)?;
            restrict_permissions(&key_path)?;
            debug!("api key staged at {}", key_path.display());

            let request = ExportRequest {
                archive_path: ctx.inputs.archive_path.clone(),
                options_path: ctx.options_path.to_path_buf(),
                output_dir: ctx.inputs.output_dir.clone(),
                auth: Some(ApiKeyAuth {
                    key_path: key_path.clone(),
                    key_id,
                    issuer_id,
                }),
            };
            ctx.tool.export(&request)?;
            Ok(())
        })();

        // Key material must never outlive the attempt, success or failure.
        staging.close()?;
        result
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{test_inputs, MockExportTool, MockFetcher, MockSigningStore};
    use tempfile::TempDir;

    fn run_attempt(tool: &MockExportTool) -> (Result<(), StrategyError>, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("AuthKey.p8");
        std::fs::write(&key, b"private-key").unwrap();

        let inputs = test_inputs(
            DistributionProfile::AppStore,
            &dir.path().join("out"),
            &[
                ("APP_STORE_CONNECT_ISSUER_ID", "issuer-1"),
                ("APP_STORE_CONNECT_KEY_IDENTIFIER", "KEY123"),
                ("APP_STORE_CONNECT_API_KEY_PATH", key.to_str().unwrap()),
            ],
        );
        let fetcher = MockFetcher::new();
        let store = MockSigningStore::new();
        let options = dir.path().join("ExportOptions.plist");

        let ctx = ExportContext {
            inputs: &inputs,
            options_path: &options,
            tool,
            fetcher: &fetcher,
            store: &store,
        };

        let result = ApiKeyStrategy.attempt(&ctx);
        let staged = tool
            .last_request()
            .and_then(|r| r.auth.map(|a| a.key_path))
            .unwrap_or_default();
        (result, staged)
    }

    #[test]
    fn test_skipped_for_non_store_profiles() {
        let dir = TempDir::new().unwrap();
        let inputs = test_inputs(DistributionProfile::AdHoc, dir.path(), &[]);
        let tool = MockExportTool::succeeding();
        let fetcher = MockFetcher::new();
        let store = MockSigningStore::new();
        let options = dir.path().join("ExportOptions.plist");
        let ctx = ExportContext {
            inputs: &inputs,
            options_path: &options,
            tool: &tool,
            fetcher: &fetcher,
            store: &store,
        };

        assert!(matches!(
            ApiKeyStrategy.availability(&ctx),
            Availability::Skip(_)
        ));
    }

    #[test]
    fn test_key_staged_with_expected_name() {
        let tool = MockExportTool::succeeding();
        let (result, staged) = run_attempt(&tool);
        assert!(result.is_ok());
        assert!(staged
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("AuthKey_KEY123"));
    }

    #[test]
    fn test_key_material_removed_after_success() {
        let tool = MockExportTool::succeeding();
        let (result, staged) = run_attempt(&tool);
        assert!(result.is_ok());
        assert!(!staged.exists());
    }

    #[test]
    fn test_key_material_removed_after_failure() {
        let tool = MockExportTool::failing("export rejected");
        let (result, staged) = run_attempt(&tool);
        assert!(result.is_err());
        assert!(!staged.exists());
    }
}
