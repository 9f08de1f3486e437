//! Signing store boundary
//!
//! The signing keychain and the provisioning-profile directory are
//! process-wide mutable state. Strategies that touch them receive an
//! explicit `SigningStore` handle instead of reaching for the ambient
//! state themselves, which keeps the mutation visible and mockable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::{debug, info};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tool::run_with_timeout;

/// Signing store errors
#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("certificate import failed: {0}")]
    ImportFailed(String),

    #[error("provisioning profile install failed: {0}")]
    ProfileInstallFailed(String),

    #[error("required tool '{0}' is not installed or not on PATH")]
    ToolMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Installs signing material into process-wide signing state
pub trait SigningStore {
    /// Import a PKCS#12 certificate archive into the signing keychain
    fn install_certificate(&self, p12: &Path, password: &str) -> Result<(), KeychainError>;

    /// Install a provisioning profile; returns the installed path
    fn install_profile(&self, profile: &Path) -> Result<PathBuf, KeychainError>;
}

/// Production store: `security import` plus a copy into the platform
/// provisioning-profile directory.
pub struct SecurityCliStore {
    keychain_path: Option<PathBuf>,
    profiles_dir: PathBuf,
}

impl SecurityCliStore {
    pub fn new(keychain_path: Option<PathBuf>, profiles_dir: PathBuf) -> Self {
        Self {
            keychain_path,
            profiles_dir,
        }
    }

    /// The platform's standard provisioning-profile directory
    pub fn default_profiles_dir(home: &Path) -> PathBuf {
        home.join("Library/MobileDevice/Provisioning Profiles")
    }
}

impl SigningStore for SecurityCliStore {
    fn install_certificate(&self, p12: &Path, password: &str) -> Result<(), KeychainError> {
        let mut command = Command::new("security");
        command.arg("import");
        command.arg(p12);
        if let Some(ref keychain) = self.keychain_path {
            command.arg("-k");
            command.arg(keychain);
        }
        command.args(["-P", password, "-A", "-t", "cert", "-f", "pkcs12"]);

        debug!("importing certificate {}", p12.display());
        let outcome = run_with_timeout(command, Duration::from_secs(60)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                KeychainError::ToolMissing("security".to_string())
            } else {
                KeychainError::Io(e)
            }
        })?;

        if !outcome.success() {
            return Err(KeychainError::ImportFailed(outcome.stderr_tail(3)));
        }

        info!("certificate imported into signing keychain");
        Ok(())
    }

    fn install_profile(&self, profile: &Path) -> Result<PathBuf, KeychainError> {
        let bytes = fs::read(profile)
            .map_err(|e| KeychainError::ProfileInstallFailed(e.to_string()))?;

        // Deterministic name derived from content, so re-installs overwrite
        // instead of accumulating.
        let digest = hex::encode(Sha256::digest(&bytes));
        let dest = self
            .profiles_dir
            .join(format!("{}.mobileprovision", &digest[..32]));

        fs::create_dir_all(&self.profiles_dir)?;
        fs::write(&dest, &bytes)?;

        info!("provisioning profile installed: {}", dest.display());
        Ok(dest)
    }
}
