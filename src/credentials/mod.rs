//! Credential bundles for the signing strategies
//!
//! Each strategy requires a different bundle. A bundle is usable only when
//! every required field is present; incomplete bundles cause the strategy
//! to be skipped, never an error. Secret values are redacted from Debug
//! output and are never serialized into reports.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used wherever a secret would otherwise appear
pub const REDACTED: &str = "[REDACTED]";

/// App Store Connect API key bundle
///
/// Required by the API-key export strategy. `key_source` is a local path
/// or a URL to the private key material.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeyCredentials {
    pub issuer_id: Option<String>,
    pub key_id: Option<String>,
    pub key_source: Option<String>,
}

impl ApiKeyCredentials {
    /// All required fields present and non-empty
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the environment variables still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.issuer_id.is_none() {
            missing.push("APP_STORE_CONNECT_ISSUER_ID");
        }
        if self.key_id.is_none() {
            missing.push("APP_STORE_CONNECT_KEY_IDENTIFIER");
        }
        if self.key_source.is_none() {
            missing.push("APP_STORE_CONNECT_API_KEY_PATH");
        }
        missing
    }
}

impl fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredentials")
            .field("issuer_id", &self.issuer_id)
            .field("key_id", &self.key_id)
            .field("key_source", &self.key_source.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Manual certificate bundle
///
/// Required by the manual-certificate export strategy.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ManualCredentials {
    pub p12_source: Option<String>,
    pub p12_password: Option<String>,
    pub profile_source: Option<String>,
}

impl ManualCredentials {
    /// All required fields present and non-empty
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the environment variables still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.p12_source.is_none() {
            missing.push("CERT_P12_URL");
        }
        if self.p12_password.is_none() {
            missing.push("CERT_PASSWORD");
        }
        if self.profile_source.is_none() {
            missing.push("PROFILE_URL");
        }
        missing
    }
}

impl fmt::Debug for ManualCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualCredentials")
            .field("p12_source", &self.p12_source.as_ref().map(|_| REDACTED))
            .field("p12_password", &self.p12_password.as_ref().map(|_| REDACTED))
            .field(
                "profile_source",
                &self.profile_source.as_ref().map(|_| REDACTED),
            )
            .finish()
    }
}

/// The full set of credential bundles supplied to one invocation
///
/// The automatic-signing strategy needs no bundle of its own; it relies on
/// the identity fields plus ambient keychain state, and is therefore always
/// available.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    pub api_key: ApiKeyCredentials,
    pub manual: ManualCredentials,
}

impl CredentialSet {
    /// Read credential variables from an explicit environment map
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| -> Option<String> {
            env.get(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            api_key: ApiKeyCredentials {
                issuer_id: get("APP_STORE_CONNECT_ISSUER_ID"),
                key_id: get("APP_STORE_CONNECT_KEY_IDENTIFIER"),
                key_source: get("APP_STORE_CONNECT_API_KEY_PATH"),
            },
            manual: ManualCredentials {
                p12_source: get("CERT_P12_URL"),
                p12_password: get("CERT_PASSWORD"),
                profile_source: get("PROFILE_URL"),
            },
        }
    }

    /// Non-secret availability summary, suitable for reports
    pub fn availability(&self) -> CredentialAvailability {
        CredentialAvailability {
            api_key_complete: self.api_key.is_complete(),
            api_key_missing: self
                .api_key
                .missing_fields()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            manual_complete: self.manual.is_complete(),
            manual_missing: self
                .manual
                .missing_fields()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Which bundles are usable, without any secret material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialAvailability {
    pub api_key_complete: bool,
    pub api_key_missing: Vec<String>,
    pub manual_complete: bool,
    pub manual_missing: Vec<String>,
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
    fn test_empty_env_means_incomplete_bundles() {
        let set = CredentialSet::from_env_map(&HashMap::new());
        assert!(!set.api_key.is_complete());
        assert!(!set.manual.is_complete());
        assert_eq!(set.api_key.missing_fields().len(), 3);
        assert_eq!(set.manual.missing_fields().len(), 3);
    }

    #[test]
    fn test_complete_api_key_bundle() {
        let env = env_with(&[
            ("APP_STORE_CONNECT_ISSUER_ID", "issuer-1"),
            ("APP_STORE_CONNECT_KEY_IDENTIFIER", "KEY123"),
            ("APP_STORE_CONNECT_API_KEY_PATH", "https://keys.example/k.p8"),
        ]);
        let set = CredentialSet::from_env_map(&env);
        assert!(set.api_key.is_complete());
        assert!(set.api_key.missing_fields().is_empty());
        assert!(!set.manual.is_complete());
    }

    #[test]
    fn test_partial_manual_bundle_reports_missing() {
        let env = env_with(&[
            ("CERT_P12_URL", "https://certs.example/dist.p12"),
            ("CERT_PASSWORD", "hunter2"),
        ]);
        let set = CredentialSet::from_env_map(&env);
        assert!(!set.manual.is_complete());
        assert_eq!(set.manual.missing_fields(), vec!["PROFILE_URL"]);
    }

    #[test]
    fn test_whitespace_only_values_treated_as_absent() {
        let env = env_with(&[("CERT_PASSWORD", "   ")]);
        let set = CredentialSet::from_env_map(&env);
        assert!(set.manual.p12_password.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let env = env_with(&[
            ("CERT_P12_URL", "https://certs.example/dist.p12"),
            ("CERT_PASSWORD", "hunter2"),
            ("PROFILE_URL", "https://certs.example/app.mobileprovision"),
            ("APP_STORE_CONNECT_API_KEY_PATH", "/keys/AuthKey.p8"),
        ]);
        let set = CredentialSet::from_env_map(&env);
        let rendered = format!("{:?}", set);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("dist.p12"));
        assert!(!rendered.contains("AuthKey.p8"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn test_availability_summary_has_no_secrets() {
        let env = env_with(&[
            ("APP_STORE_CONNECT_ISSUER_ID", "issuer-1"),
            ("CERT_PASSWORD", "hunter2"),
        ]);
        let set = CredentialSet::from_env_map(&env);
        let avail = set.availability();
        assert!(!avail.api_key_complete);
        assert!(avail
            .api_key_missing
            .contains(&"APP_STORE_CONNECT_KEY_IDENTIFIER".to_string()));
        let json = serde_json::to_string(&avail).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
