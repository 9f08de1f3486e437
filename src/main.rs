//! IPA Export Lane CLI
//!
//! Entry point for the `ipa-export` command-line tool.

use clap::{Parser, Subcommand};
use ipa_export_lane::cascade::{Availability, Cascade, ExportContext};
use ipa_export_lane::config::{CliOverrides, ExportInputs};
use ipa_export_lane::options::ExportOptions;
use ipa_export_lane::pipeline::{Components, ExportPipeline};
use ipa_export_lane::tool::probe_tool;
use ipa_export_lane::validate::{CodesignVerifier, StoreValidator};
use log::error;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "ipa-export")]
#[command(about = "Multi-strategy IPA export lane", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full export pipeline
    Run {
        /// Path to lane config file (default: .export-lane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Distribution profile override (app-store, ad-hoc, enterprise, development)
        #[arg(long)]
        profile: Option<String>,

        /// Output directory override
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Archive path override
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Write the export options document and stop
    Options {
        /// Path to lane config file (default: .export-lane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Distribution profile override
        #[arg(long)]
        profile: Option<String>,

        /// Output directory override
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Validate an existing package against store structural rules
    Validate {
        /// Path to the package file
        ipa: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Explain which signing strategies would run, without executing
    Strategies {
        /// Path to lane config file (default: .export-lane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Distribution profile override
        #[arg(long)]
        profile: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            profile,
            output_dir,
            archive,
        } => {
            let overrides = CliOverrides {
                profile,
                output_dir,
                archive_path: archive,
            };
            run_pipeline(config, overrides);
        }
        Commands::Options {
            config,
            profile,
            output_dir,
        } => {
            let overrides = CliOverrides {
                profile,
                output_dir,
                archive_path: None,
            };
            run_options(config, overrides);
        }
        Commands::Validate { ipa, json } => {
            run_validate(&ipa, json);
        }
        Commands::Strategies {
            config,
            profile,
            json,
        } => {
            let overrides = CliOverrides {
                profile,
                output_dir: None,
                archive_path: None,
            };
            run_strategies(config, overrides, json);
        }
    }
}

fn load_inputs(config: Option<PathBuf>, overrides: &CliOverrides) -> ExportInputs {
    match ExportInputs::load(overrides, config.as_ref()) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("configuration error: {}", e);
            process::exit(2);
        }
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn run_pipeline(config: Option<PathBuf>, overrides: CliOverrides) {
    let inputs = load_inputs(config, &overrides);

    // Absence only dooms the steps that need the tool; the lane still runs
    // so the terminal report can say exactly what was missing.
    if let Err(e) = probe_tool("xcodebuild", "-version") {
        log::warn!("preflight: {}", e);
    }

    let components = Components::production(&inputs, &home_dir());
    let pipeline = ExportPipeline::new(inputs, components);

    match pipeline.run() {
        Ok(outcome) => {
            println!(
                "{}",
                outcome
                    .summary
                    .artifact
                    .as_ref()
                    .map(|a| format!("Exported {} ({} bytes)", a.name, a.size_bytes))
                    .unwrap_or_else(|| "Archive repackaged for manual export".to_string())
            );
            process::exit(0);
        }
        Err(e) => {
            error!("export failed: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_options(config: Option<PathBuf>, overrides: CliOverrides) {
    let inputs = load_inputs(config, &overrides);
    let path = inputs.export_options_path();

    match ExportOptions::from_inputs(&inputs).write(&path) {
        Ok(()) => {
            println!("{}", path.display());
            process::exit(0);
        }
        Err(e) => {
            error!("options error: {}", e);
            process::exit(2);
        }
    }
}

fn run_validate(ipa: &PathBuf, json: bool) {
    let verifier = CodesignVerifier;
    let report = StoreValidator::new(&verifier).validate(ipa);

    if json {
        match report.to_json() {
            Ok(out) => println!("{}", out),
            Err(e) => {
                error!("serialization error: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!(
            "Validation: {}",
            if report.passed { "PASS" } else { "FAIL" }
        );
        for finding in &report.findings {
            println!(
                "  [{:?}] {:?}: {}",
                finding.severity, finding.check, finding.message
            );
        }
    }

    process::exit(if report.passed { 0 } else { 70 });
}

fn run_strategies(config: Option<PathBuf>, overrides: CliOverrides, json: bool) {
    let inputs = load_inputs(config, &overrides);
    let components = Components::production(&inputs, &home_dir());
    let options_path = inputs.export_options_path();

    let ctx = ExportContext {
        inputs: &inputs,
        options_path: &options_path,
        tool: components.tool.as_ref(),
        fetcher: components.fetcher.as_ref(),
        store: components.store.as_ref(),
    };

    let cascade = Cascade::standard();
    let rows: Vec<(String, Option<String>)> = cascade
        .plan(&ctx)
        .into_iter()
        .map(|(kind, availability)| match availability {
            Availability::Ready => (kind.to_string(), None),
            Availability::Skip(reason) => (kind.to_string(), Some(reason)),
        })
        .collect();

    if json {
        let output: Vec<serde_json::Value> = rows
            .iter()
            .map(|(kind, skip)| {
                serde_json::json!({
                    "strategy": kind,
                    "would_attempt": skip.is_none(),
                    "skip_reason": skip,
                })
            })
            .collect();
        match serde_json::to_string_pretty(&output) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                error!("serialization error: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("Strategy plan for profile '{}':\n", inputs.profile);
        for (kind, skip) in &rows {
            match skip {
                None => println!("  {:<20} would attempt", kind),
                Some(reason) => println!("  {:<20} skipped: {}", kind, reason),
            }
        }
    }

    process::exit(0);
}
