//! Export options builder
//!
//! Derives the export-configuration document from a distribution profile
//! plus the identity inputs, and serializes it to the property-list file
//! the export tool consumes. The document is rebuilt from scratch on every
//! invocation; it is never edited in place.

use std::fs;
use std::path::Path;

use log::{debug, info};
use plist::{Dictionary, Value};
use thiserror::Error;

use crate::config::{DistributionProfile, ExportInputs};

/// Errors from building or persisting the export options document
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("written options document is not a plist dictionary: {path}")]
    NotADictionary { path: String },
}

/// App-Store-only extension fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStoreOptions {
    /// Bundle identifier used for distribution
    pub distribution_bundle_identifier: String,

    /// iCloud container environment
    pub icloud_container_environment: String,
}

/// Derived export configuration
///
/// Immutable once built; any change requires rebuilding the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub method: &'static str,
    pub team_id: String,
    pub bundle_id: String,
    pub signing_style: &'static str,
    pub upload_bitcode: bool,
    pub compile_bitcode: bool,
    pub upload_symbols: bool,
    pub strip_swift_symbols: bool,
    pub thinning: &'static str,
    pub destination: &'static str,
    pub app_store: Option<AppStoreOptions>,
}

impl ExportOptions {
    /// Derive options for a profile and identity pair
    pub fn for_profile(profile: DistributionProfile, bundle_id: &str, team_id: &str) -> Self {
        let app_store = if profile == DistributionProfile::AppStore {
            Some(AppStoreOptions {
                distribution_bundle_identifier: bundle_id.to_string(),
                icloud_container_environment: "Production".to_string(),
            })
        } else {
            None
        };

        Self {
            method: profile.method(),
            team_id: team_id.to_string(),
            bundle_id: bundle_id.to_string(),
            signing_style: "automatic",
            upload_bitcode: false,
            compile_bitcode: false,
            upload_symbols: profile.upload_symbols(),
            strip_swift_symbols: profile.strip_swift_symbols(),
            thinning: "<none>",
            destination: "export",
            app_store,
        }
    }

    /// Derive options from the lane inputs
    pub fn from_inputs(inputs: &ExportInputs) -> Self {
        Self::for_profile(inputs.profile, &inputs.bundle_id, &inputs.team_id)
    }

    /// Build the property-list document
    pub fn to_plist(&self) -> Value {
        let mut dict = Dictionary::new();
        dict.insert("method".to_string(), Value::String(self.method.to_string()));
        dict.insert("teamID".to_string(), Value::String(self.team_id.clone()));
        dict.insert(
            "signingStyle".to_string(),
            Value::String(self.signing_style.to_string()),
        );
        dict.insert(
            "uploadBitcode".to_string(),
            Value::Boolean(self.upload_bitcode),
        );
        dict.insert(
            "compileBitcode".to_string(),
            Value::Boolean(self.compile_bitcode),
        );
        dict.insert(
            "uploadSymbols".to_string(),
            Value::Boolean(self.upload_symbols),
        );
        dict.insert(
            "stripSwiftSymbols".to_string(),
            Value::Boolean(self.strip_swift_symbols),
        );
        dict.insert(
            "thinning".to_string(),
            Value::String(self.thinning.to_string()),
        );
        dict.insert(
            "destination".to_string(),
            Value::String(self.destination.to_string()),
        );

        if let Some(ref store) = self.app_store {
            dict.insert("uploadToAppStore".to_string(), Value::Boolean(false));
            dict.insert(
                "distributionBundleIdentifier".to_string(),
                Value::String(store.distribution_bundle_identifier.clone()),
            );
            dict.insert(
                "iCloudContainerEnvironment".to_string(),
                Value::String(store.icloud_container_environment.clone()),
            );
            dict.insert(
                "manageAppVersionAndBuildNumber".to_string(),
                Value::Boolean(true),
            );
        }

        Value::Dictionary(dict)
    }

    /// Write the document to `path`, overwriting any prior document, then
    /// parse it back as a sanity check on the produced file.
    pub fn write(&self, path: &Path) -> Result<(), OptionsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let value = self.to_plist();
        value.to_file_xml(path)?;
        debug!("wrote export options for method '{}' to {}", self.method, path.display());

        // Contract check: the file the export tool will read must parse.
        let reread = Value::from_file(path)?;
        if reread.as_dictionary().is_none() {
            return Err(OptionsError::NotADictionary {
                path: path.display().to_string(),
            });
        }

        info!("export options ready: {}", path.display());
        Ok(())
    }
}
