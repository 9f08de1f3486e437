//! IPA Export Lane - Multi-strategy IPA export for iOS build pipelines
//!
//! This crate implements the export stage of an iOS build pipeline: it
//! derives an export-options document from a distribution profile, tries a
//! fixed cascade of signing strategies until one produces a package,
//! validates app-store packages against store structural rules, and always
//! leaves a durable report behind, even when the only thing left is the
//! intermediate archive.

pub mod artifact;
pub mod cascade;
pub mod config;
pub mod credentials;
pub mod keychain;
pub mod mock;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod tool;
pub mod transfer;
pub mod validate;

pub use artifact::BuildArtifactState;
pub use cascade::{Cascade, CascadeOutcome, ExportStrategy, StrategyKind, TerminalState};
pub use config::{CliOverrides, DistributionProfile, ExportInputs, LaneFile};
pub use credentials::CredentialSet;
pub use options::ExportOptions;
pub use pipeline::{Components, ExportPipeline, PipelineError, PipelineOutcome};
pub use report::ExportSummary;
pub use validate::{StoreValidator, ValidationReport};
