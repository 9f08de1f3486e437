//! Store compliance validation
//!
//! Structural checks applied to a packaged artifact before it is declared
//! distributable. Only the app-store profile is validated; other profiles
//! accept whatever the export tool produced.
//!
//! Fatal findings abort the run; warnings accumulate in the report.

use std::io::{self, Cursor, Read};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::ZipArchive;

use crate::tool::run_with_timeout;

/// Schema version for validation reports
pub const VALIDATION_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for validation reports
pub const VALIDATION_SCHEMA_ID: &str = "ipa-export/validation_report@1";

/// Maximum uncompressed payload size accepted by the store
pub const MAX_UNCOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Which structural rule a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckKind {
    Container,
    Size,
    Bundle,
    Manifest,
    Icon,
    Signature,
    Provisioning,
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fatal,
}

/// One validation finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub check: CheckKind,
    pub severity: Severity,
    pub message: String,
}

/// Validation report (validation section of the summary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub passed: bool,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            schema_version: VALIDATION_SCHEMA_VERSION,
            schema_id: VALIDATION_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            passed: true,
            findings: Vec::new(),
        }
    }

    fn warn(&mut self, check: CheckKind, message: impl Into<String>) {
        let message = message.into();
        warn!("validation warning [{:?}]: {}", check, message);
        self.findings.push(Finding {
            check,
            severity: Severity::Warning,
            message,
        });
    }

    fn fail(&mut self, check: CheckKind, message: impl Into<String>) {
        let message = message.into();
        warn!("validation failure [{:?}]: {}", check, message);
        self.findings.push(Finding {
            check,
            severity: Severity::Fatal,
            message,
        });
        self.passed = false;
    }

    /// Warning findings only
    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    /// Fatal findings only
    pub fn fatals(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Fatal)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Parsed signature state of a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Whether the signature verifies
    pub verified: bool,

    /// Certificate authority chain names
    pub authorities: Vec<String>,
}

impl SignatureInfo {
    /// Whether the signing identity is distribution-class
    pub fn is_distribution(&self) -> bool {
        self.authorities.iter().any(|a| a.contains("Distribution"))
    }
}

/// Signature verification errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("required tool '{0}' is not installed or not on PATH")]
    ToolMissing(String),

    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Verifies the code signature of the application bundle inside a package
pub trait SignatureVerifier {
    fn verify(&self, ipa: &Path, app_name: &str) -> Result<SignatureInfo, SignatureError>;
}

/// Production verifier: extract the bundle and run `codesign`
pub struct CodesignVerifier;

impl SignatureVerifier for CodesignVerifier {
    fn verify(&self, ipa: &Path, app_name: &str) -> Result<SignatureInfo, SignatureError> {
        let scratch = tempfile::Builder::new().prefix("ipa-verify-").tempdir()?;

        let file = std::fs::File::open(ipa)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;
        archive
            .extract(scratch.path())
            .map_err(|e| SignatureError::VerificationFailed(e.to_string()))?;

        let app_path = scratch.path().join("Payload").join(app_name);

        let mut verify_cmd = Command::new("codesign");
        verify_cmd.args(["--verify", "--deep", "--strict"]);
        verify_cmd.arg(&app_path);
        let verify_outcome =
            run_with_timeout(verify_cmd, Duration::from_secs(120)).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    SignatureError::ToolMissing("codesign".to_string())
                } else {
                    SignatureError::Io(e)
                }
            })?;
        let verified = verify_outcome.success();

        // codesign prints signing details on stderr
        let mut detail_cmd = Command::new("codesign");
        detail_cmd.arg("-dvv");
        detail_cmd.arg(&app_path);
        let detail_outcome = run_with_timeout(detail_cmd, Duration::from_secs(60))?;

        let authority_re = Regex::new(r"^Authority=(.+)$").expect("static pattern");
        let authorities = detail_outcome
            .stderr
            .lines()
            .filter_map(|line| {
                authority_re
                    .captures(line.trim())
                    .map(|c| c[1].to_string())
            })
            .collect();

        Ok(SignatureInfo {
            verified,
            authorities,
        })
    }
}

/// Store compliance validator
pub struct StoreValidator<'a> {
    verifier: &'a dyn SignatureVerifier,
    max_uncompressed_bytes: u64,
}

impl<'a> StoreValidator<'a> {
    pub fn new(verifier: &'a dyn SignatureVerifier) -> Self {
        Self {
            verifier,
            max_uncompressed_bytes: MAX_UNCOMPRESSED_BYTES,
        }
    }

    /// Override the size ceiling (tests)
    pub fn with_max_uncompressed_bytes(mut self, bytes: u64) -> Self {
        self.max_uncompressed_bytes = bytes;
        self
    }

    /// Run all checks against a packaged artifact
    pub fn validate(&self, ipa: &Path) -> ValidationReport {
        let mut report = ValidationReport::new();
        info!("validating package {}", ipa.display());

        // Container integrity
        let file = match std::fs::File::open(ipa) {
            Ok(f) => f,
            Err(e) => {
                report.fail(CheckKind::Container, format!("cannot open package: {}", e));
                return report;
            }
        };
        let mut archive = match ZipArchive::new(file) {
            Ok(a) => a,
            Err(e) => {
                report.fail(CheckKind::Container, format!("corrupt archive: {}", e));
                return report;
            }
        };

        // Uncompressed size and entry inventory
        let mut total_uncompressed: u64 = 0;
        let mut names: Vec<String> = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            match archive.by_index(i) {
                Ok(entry) => {
                    total_uncompressed = total_uncompressed.saturating_add(entry.size());
                    names.push(entry.name().to_string());
                }
                Err(e) => {
                    report.fail(CheckKind::Container, format!("corrupt archive: {}", e));
                    return report;
                }
            }
        }

        if total_uncompressed > self.max_uncompressed_bytes {
            report.fail(
                CheckKind::Size,
                format!(
                    "uncompressed size {} exceeds the {} byte limit",
                    total_uncompressed, self.max_uncompressed_bytes
                ),
            );
            return report;
        }

        // Exactly one top-level application bundle
        let mut bundles: Vec<String> = Vec::new();
        for name in &names {
            if let Some(rest) = name.strip_prefix("Payload/") {
                if let Some(idx) = rest.find('/') {
                    let first = &rest[..idx];
                    if first.ends_with(".app") && !bundles.iter().any(|b| b == first) {
                        bundles.push(first.to_string());
                    }
                }
            }
        }
        let app_name = match bundles.as_slice() {
            [single] => single.clone(),
            [] => {
                report.fail(
                    CheckKind::Bundle,
                    "no application bundle under Payload/".to_string(),
                );
                return report;
            }
            many => {
                report.fail(
                    CheckKind::Bundle,
                    format!("expected one application bundle, found {}", many.len()),
                );
                return report;
            }
        };
        debug!("application bundle: {}", app_name);

        // Bundle manifest
        let manifest_name = format!("Payload/{}/Info.plist", app_name);
        let manifest = match read_entry(&mut archive, &manifest_name) {
            Some(bytes) => match plist::Value::from_reader(Cursor::new(bytes)) {
                Ok(value) => value,
                Err(e) => {
                    report.fail(CheckKind::Manifest, format!("Info.plist unreadable: {}", e));
                    return report;
                }
            },
            None => {
                report.fail(CheckKind::Manifest, "Info.plist missing".to_string());
                return report;
            }
        };
        let dict = match manifest.as_dictionary() {
            Some(d) => d,
            None => {
                report.fail(
                    CheckKind::Manifest,
                    "Info.plist is not a dictionary".to_string(),
                );
                return report;
            }
        };

        for key in [
            "CFBundleIdentifier",
            "CFBundleShortVersionString",
            "CFBundleVersion",
        ] {
            if dict.get(key).and_then(plist::Value::as_string).is_none() {
                report.fail(CheckKind::Manifest, format!("{} missing", key));
                return report;
            }
        }

        if dict.get("MinimumOSVersion").is_none() {
            report.warn(CheckKind::Manifest, "MinimumOSVersion not declared");
        }

        let has_display_name = dict
            .get("CFBundleDisplayName")
            .and_then(plist::Value::as_string)
            .is_some()
            || dict
                .get("CFBundleName")
                .and_then(plist::Value::as_string)
                .is_some();
        if !has_display_name {
            report.fail(
                CheckKind::Manifest,
                "neither CFBundleDisplayName nor CFBundleName declared".to_string(),
            );
            return report;
        }

        // Icon assets
        let app_prefix = format!("Payload/{}/", app_name);
        let has_icon = names.iter().any(|name| {
            name.strip_prefix(&app_prefix)
                .and_then(|rest| {
                    if rest.contains('/') {
                        None
                    } else {
                        Some(rest)
                    }
                })
                .map(|file| {
                    (file.starts_with("AppIcon") || file.starts_with("Icon"))
                        && file.ends_with(".png")
                })
                .unwrap_or(false)
        });
        if !has_icon {
            report.warn(CheckKind::Icon, "no recognized icon asset in the bundle");
        }

        // Code signature
        let code_resources = format!("Payload/{}/_CodeSignature/CodeResources", app_name);
        if !names.iter().any(|n| n == &code_resources) {
            report.fail(CheckKind::Signature, "bundle is not signed".to_string());
            return report;
        }
        match self.verifier.verify(ipa, &app_name) {
            Ok(info) => {
                if !info.verified {
                    report.fail(
                        CheckKind::Signature,
                        "code signature does not verify".to_string(),
                    );
                    return report;
                }
                if !info.is_distribution() {
                    report.warn(
                        CheckKind::Signature,
                        "signing identity is not distribution-class",
                    );
                }
            }
            Err(e) => {
                report.fail(CheckKind::Signature, format!("cannot verify signature: {}", e));
                return report;
            }
        }

        // Embedded provisioning profile
        let embedded = format!("Payload/{}/embedded.mobileprovision", app_name);
        if !names.iter().any(|n| n == &embedded) {
            report.fail(
                CheckKind::Provisioning,
                "embedded.mobileprovision missing".to_string(),
            );
            return report;
        }

        info!(
            "validation passed with {} warning(s)",
            report.warnings().count()
        );
        report
    }
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(name).ok()?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).ok()?;
    Some(bytes)
}
