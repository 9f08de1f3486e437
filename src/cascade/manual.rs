//! Manual-certificate export strategy
//!
//! Fetches the distribution certificate and provisioning profile into a
//! transient work area, installs both through the signing store, then runs
//! the export. The work area is removed on every exit path; the keychain
//! and profile installs are deliberate, durable side effects.

use log::debug;

use super::{Availability, ExportContext, ExportStrategy, StrategyError, StrategyKind};
use crate::tool::ExportRequest;

pub struct ManualCertificateStrategy;

impl ExportStrategy for ManualCertificateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManualCertificate
    }

    fn availability(&self, ctx: &ExportContext) -> Availability {
        let missing = ctx.inputs.credentials.manual.missing_fields();
        if !missing.is_empty() {
            return Availability::Skip(format!("missing credentials: {}", missing.join(", ")));
        }
        Availability::Ready
    }

    fn attempt(&self, ctx: &ExportContext) -> Result<(), StrategyError> {
        let creds = &ctx.inputs.credentials.manual;
        let p12_source = creds
            .p12_source
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("certificate source".to_string()))?;
        let password = creds
            .p12_password
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("certificate password".to_string()))?;
        let profile_source = creds
            .profile_source
            .clone()
            .ok_or_else(|| StrategyError::CredentialsIncomplete("profile source".to_string()))?;

        let staging = tempfile::Builder::new()
            .prefix("ipa-export-cert-")
            .tempdir()?;
        let p12_path = staging.path().join("certificate.p12");
        let profile_path = staging.path().join("profile.mobileprovision");

        let result = (|| -> Result<(), StrategyError> {
            ctx.fetcher.fetch(&p12_source, &p12_path)?;
            ctx.fetcher.fetch(&profile_source, &profile_path)?;
            debug!("signing material staged in {}", staging.path().display());

            ctx.store.install_certificate(&p12_path, &password)?;
            ctx.store.install_profile(&profile_path)?;

            let request = ExportRequest {
                archive_path: ctx.inputs.archive_path.clone(),
                options_path: ctx.options_path.to_path_buf(),
                output_dir: ctx.inputs.output_dir.clone(),
                auth: None,
            };
            ctx.tool.export(&request)?;
            Ok(())
        })();

        // Certificate and profile bytes must never outlive the attempt.
        staging.close()?;
        result
    }
}
