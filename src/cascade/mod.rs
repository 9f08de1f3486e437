//! Signing strategy cascade
//!
//! Attempts the signing/export strategies in a fixed priority order,
//! stopping at the first one that produces a package:
//!
//! 1. API-key export (app-store profile with a complete API-key bundle)
//! 2. Automatic-signing export (always attempted when reached)
//! 3. Manual-certificate export (complete manual bundle)
//!
//! Strategies run strictly sequentially; each may mutate shared signing
//! state (keychain contents, installed profiles) that the next one also
//! depends on. A strategy with incomplete credentials is skipped and
//! logged, never counted as a failure.

mod api_key;
mod automatic;
mod manual;

pub use api_key::ApiKeyStrategy;
pub use automatic::AutomaticStrategy;
pub use manual::ManualCertificateStrategy;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ExportInputs, PACKAGE_FILE_NAME};
use crate::keychain::{KeychainError, SigningStore};
use crate::tool::{ExportTool, ExportToolError};
use crate::transfer::{Fetcher, TransferError};

/// Strategy identity, in cascade priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    ApiKey,
    Automatic,
    ManualCertificate,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::ApiKey => "api-key",
            StrategyKind::Automatic => "automatic",
            StrategyKind::ManualCertificate => "manual-certificate",
        };
        f.write_str(s)
    }
}

/// Whether a strategy can run with the supplied credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    Skip(String),
}

/// Errors from one strategy attempt
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("credentials incomplete: {0}")]
    CredentialsIncomplete(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Tool(#[from] ExportToolError),

    #[error(transparent)]
    Keychain(#[from] KeychainError),

    #[error("export reported success but no package appeared in the output directory")]
    MissingPackage,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Everything a strategy needs for one attempt
pub struct ExportContext<'a> {
    pub inputs: &'a ExportInputs,
    pub options_path: &'a Path,
    pub tool: &'a dyn ExportTool,
    pub fetcher: &'a dyn Fetcher,
    pub store: &'a dyn SigningStore,
}

/// One signing/export strategy
///
/// `availability` is consulted first; `attempt` performs the blocking
/// external export call. An attempt either leaves a package in the output
/// directory or fails; there is no intra-step retry.
pub trait ExportStrategy {
    fn kind(&self) -> StrategyKind;
    fn availability(&self, ctx: &ExportContext) -> Availability;
    fn attempt(&self, ctx: &ExportContext) -> Result<(), StrategyError>;
}

/// Outcome of one cascade step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Skipped,
    Failed,
    Succeeded,
}

/// Record of one cascade step, kept for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub strategy: StrategyKind,
    pub outcome: StepOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub duration_ms: u64,
}

/// Terminal state of the cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    /// A package now exists at the expected output path
    Succeeded(PathBuf),
    /// No strategy produced the package
    Exhausted,
}

/// Cascade result: terminal state plus the per-step records
#[derive(Debug)]
pub struct CascadeOutcome {
    pub terminal: TerminalState,
    pub records: Vec<StrategyRecord>,
}

impl CascadeOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.terminal, TerminalState::Succeeded(_))
    }

    pub fn package_path(&self) -> Option<&Path> {
        match &self.terminal {
            TerminalState::Succeeded(path) => Some(path),
            TerminalState::Exhausted => None,
        }
    }
}

/// The ordered list of strategies
pub struct Cascade {
    strategies: Vec<Box<dyn ExportStrategy>>,
}

impl Cascade {
    /// The fixed production ordering
    pub fn standard() -> Self {
        Self {
            strategies: vec![
                Box::new(ApiKeyStrategy),
                Box::new(AutomaticStrategy),
                Box::new(ManualCertificateStrategy),
            ],
        }
    }

    /// Build a cascade from an explicit strategy list (tests)
    pub fn with_strategies(strategies: Vec<Box<dyn ExportStrategy>>) -> Self {
        Self { strategies }
    }

    /// Availability of every strategy, in order, without executing any
    pub fn plan(&self, ctx: &ExportContext) -> Vec<(StrategyKind, Availability)> {
        self.strategies
            .iter()
            .map(|s| (s.kind(), s.availability(ctx)))
            .collect()
    }

    /// Run strategies in order until one leaves a package behind
    pub fn run(&self, ctx: &ExportContext) -> CascadeOutcome {
        let mut records = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let kind = strategy.kind();

            match strategy.availability(ctx) {
                Availability::Skip(reason) => {
                    info!("strategy {} skipped: {}", kind, reason);
                    records.push(StrategyRecord {
                        strategy: kind,
                        outcome: StepOutcome::Skipped,
                        detail: Some(reason),
                        duration_ms: 0,
                    });
                    continue;
                }
                Availability::Ready => {}
            }

            info!("strategy {} attempting export", kind);
            let start = Instant::now();
            let result = strategy.attempt(ctx);
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(()) => match finalize_package(&ctx.inputs.output_dir) {
                    Ok(Some(package)) => {
                        info!("strategy {} succeeded: {}", kind, package.display());
                        records.push(StrategyRecord {
                            strategy: kind,
                            outcome: StepOutcome::Succeeded,
                            detail: None,
                            duration_ms,
                        });
                        return CascadeOutcome {
                            terminal: TerminalState::Succeeded(package),
                            records,
                        };
                    }
                    Ok(None) => {
                        let detail = StrategyError::MissingPackage.to_string();
                        warn!("strategy {} failed: {}", kind, detail);
                        records.push(StrategyRecord {
                            strategy: kind,
                            outcome: StepOutcome::Failed,
                            detail: Some(detail),
                            duration_ms,
                        });
                    }
                    Err(e) => {
                        warn!("strategy {} failed inspecting output: {}", kind, e);
                        records.push(StrategyRecord {
                            strategy: kind,
                            outcome: StepOutcome::Failed,
                            detail: Some(e.to_string()),
                            duration_ms,
                        });
                    }
                },
                Err(e) => {
                    warn!("strategy {} failed: {}", kind, e);
                    records.push(StrategyRecord {
                        strategy: kind,
                        outcome: StepOutcome::Failed,
                        detail: Some(e.to_string()),
                        duration_ms,
                    });
                }
            }
        }

        CascadeOutcome {
            terminal: TerminalState::Exhausted,
            records,
        }
    }
}

/// Find the package the export tool left behind and move it to the fixed
/// output name. The tool names the package after the application; the lane
/// promises a stable path to downstream consumers.
fn finalize_package(output_dir: &Path) -> io::Result<Option<PathBuf>> {
    let fixed = output_dir.join(PACKAGE_FILE_NAME);

    let mut found: Option<PathBuf> = None;
    if output_dir.is_dir() {
        for entry in fs::read_dir(output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("ipa"))
                    .unwrap_or(false)
            {
                found = Some(path);
                break;
            }
        }
    }

    match found {
        Some(path) if path != fixed => {
            fs::rename(&path, &fixed)?;
            Ok(Some(fixed))
        }
        Some(path) => Ok(Some(path)),
        None => Ok(None),
    }
}
