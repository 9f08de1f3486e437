//! Automatic-signing export strategy
//!
//! Relies entirely on ambient keychain and provisioning state; nothing is
//! downloaded or installed. Always attempted when the cascade reaches it.

use super::{Availability, ExportContext, ExportStrategy, StrategyError, StrategyKind};
use crate::tool::ExportRequest;

pub struct AutomaticStrategy;

impl ExportStrategy for AutomaticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Automatic
    }

    fn availability(&self, _ctx: &ExportContext) -> Availability {
        Availability::Ready
    }

    fn attempt(&self, ctx: &ExportContext) -> Result<(), StrategyError> {
        let request = ExportRequest {
            archive_path: ctx.inputs.archive_path.clone(),
            options_path: ctx.options_path.to_path_buf(),
            output_dir: ctx.inputs.output_dir.clone(),
            auth: None,
        };
        ctx.tool.export(&request)?;
        Ok(())
    }
}
