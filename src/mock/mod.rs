//! Configurable mocks for the external boundaries
//!
//! In-process stand-ins for the export tool, the download transport, the
//! signing store, and the signature verifier, with scriptable outcomes and
//! call recording. Used by unit tests and the integration suites.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{DistributionProfile, ExportInputs, TimeoutConfig};
use crate::credentials::CredentialSet;
use crate::keychain::{KeychainError, SigningStore};
use crate::tool::{ExportRequest, ExportTool, ExportToolError};
use crate::transfer::{Fetcher, TransferError};
use crate::validate::{SignatureError, SignatureInfo, SignatureVerifier};

/// Build lane inputs for tests without touching the process environment
pub fn test_inputs(
    profile: DistributionProfile,
    output_dir: &Path,
    env: &[(&str, &str)],
) -> ExportInputs {
    let env_map: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let archive_parent = output_dir.parent().unwrap_or(output_dir).to_path_buf();

    ExportInputs {
        session_id: "test-session".to_string(),
        profile,
        bundle_id: "com.example.app".to_string(),
        team_id: "TEAM123456".to_string(),
        archive_path: archive_parent.join("App.xcarchive"),
        output_dir: output_dir.to_path_buf(),
        credentials: CredentialSet::from_env_map(&env_map),
        timeouts: TimeoutConfig::default(),
    }
}

/// Scriptable export tool
///
/// Each call pops the next scripted outcome; once the script is drained the
/// default outcome applies. Successful calls drop a `Runner.ipa` into the
/// requested output directory unless package production is disabled.
pub struct MockExportTool {
    script: Mutex<VecDeque<Result<(), String>>>,
    default_outcome: Result<(), String>,
    produce_package: bool,
    package_bytes: Vec<u8>,
    requests: Mutex<Vec<ExportRequest>>,
}

impl MockExportTool {
    /// Every call succeeds and produces a package
    pub fn succeeding() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Ok(()),
            produce_package: true,
            package_bytes: b"mock-package".to_vec(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds but never produces a package
    pub fn succeeding_without_package() -> Self {
        Self {
            produce_package: false,
            ..Self::succeeding()
        }
    }

    /// Every call fails with the given message
    pub fn failing(message: &str) -> Self {
        Self {
            default_outcome: Err(message.to_string()),
            ..Self::succeeding()
        }
    }

    /// Scripted outcomes, in call order; package production stays on
    pub fn with_script(script: Vec<Result<(), String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::succeeding()
        }
    }

    /// Bytes written as the produced package (defaults to a placeholder)
    pub fn with_package_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.package_bytes = bytes;
        self
    }

    /// Number of export invocations so far
    pub fn export_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The most recent request, if any
    pub fn last_request(&self) -> Option<ExportRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl ExportTool for MockExportTool {
    fn export(&self, request: &ExportRequest) -> Result<(), ExportToolError> {
        self.requests.lock().unwrap().push(request.clone());

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone());

        match outcome {
            Ok(()) => {
                if self.produce_package {
                    fs::create_dir_all(&request.output_dir)?;
                    fs::write(request.output_dir.join("Runner.ipa"), &self.package_bytes)?;
                }
                Ok(())
            }
            Err(detail) => Err(ExportToolError::Failed {
                code: Some(70),
                detail,
            }),
        }
    }
}

/// Fetcher that copies local files and serves remote URLs from memory
pub struct MockFetcher {
    remote: Mutex<HashMap<String, Vec<u8>>>,
    fail_with: Mutex<Option<String>>,
    destinations: Mutex<Vec<PathBuf>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            remote: Mutex::new(HashMap::new()),
            fail_with: Mutex::new(None),
            destinations: Mutex::new(Vec::new()),
        }
    }

    /// Serve `url` from memory instead of the network
    pub fn with_remote(self, url: &str, bytes: &[u8]) -> Self {
        self.remote
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Make every subsequent fetch fail
    pub fn fail_with(self, message: &str) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Destinations of all fetches so far (for cleanup assertions)
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
        self.destinations.lock().unwrap().push(dest.to_path_buf());

        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(TransferError::DownloadFailed {
                url: source.to_string(),
                attempts: 1,
                detail: message,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(bytes) = self.remote.lock().unwrap().get(source) {
            fs::write(dest, bytes)?;
            return Ok(());
        }

        let path = Path::new(source);
        if path.exists() {
            fs::copy(path, dest)?;
            return Ok(());
        }

        Err(TransferError::SourceMissing(source.to_string()))
    }
}

/// Recording signing store with optional import failure
pub struct MockSigningStore {
    import_failure: Option<String>,
    certificates: Mutex<Vec<PathBuf>>,
    profiles: Mutex<Vec<PathBuf>>,
}

impl MockSigningStore {
    pub fn new() -> Self {
        Self {
            import_failure: None,
            certificates: Mutex::new(Vec::new()),
            profiles: Mutex::new(Vec::new()),
        }
    }

    /// Fail every certificate import with the given message
    pub fn failing_import(message: &str) -> Self {
        Self {
            import_failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn certificate_installs(&self) -> usize {
        self.certificates.lock().unwrap().len()
    }

    pub fn profile_installs(&self) -> usize {
        self.profiles.lock().unwrap().len()
    }
}

impl Default for MockSigningStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningStore for MockSigningStore {
    fn install_certificate(&self, p12: &Path, _password: &str) -> Result<(), KeychainError> {
        if let Some(ref message) = self.import_failure {
            return Err(KeychainError::ImportFailed(message.clone()));
        }
        self.certificates.lock().unwrap().push(p12.to_path_buf());
        Ok(())
    }

    fn install_profile(&self, profile: &Path) -> Result<PathBuf, KeychainError> {
        self.profiles.lock().unwrap().push(profile.to_path_buf());
        Ok(profile.to_path_buf())
    }
}

/// Signature verifier with a fixed answer
pub struct MockSignatureVerifier {
    result: Result<SignatureInfo, String>,
}

impl MockSignatureVerifier {
    /// Verifies with a distribution-class identity
    pub fn distribution() -> Self {
        Self {
            result: Ok(SignatureInfo {
                verified: true,
                authorities: vec![
                    "Apple Distribution: Example Corp (TEAM123456)".to_string(),
                    "Apple Worldwide Developer Relations Certification Authority".to_string(),
                ],
            }),
        }
    }

    /// Verifies with a development-class identity
    pub fn development() -> Self {
        Self {
            result: Ok(SignatureInfo {
                verified: true,
                authorities: vec!["Apple Development: dev@example.com".to_string()],
            }),
        }
    }

    /// Signature does not verify
    pub fn unverified() -> Self {
        Self {
            result: Ok(SignatureInfo {
                verified: false,
                authorities: Vec::new(),
            }),
        }
    }

    /// Verifier itself errors (tool missing, extraction failure)
    pub fn erroring(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

impl SignatureVerifier for MockSignatureVerifier {
    fn verify(&self, _ipa: &Path, _app_name: &str) -> Result<SignatureInfo, SignatureError> {
        self.result
            .clone()
            .map_err(SignatureError::VerificationFailed)
    }
}
