//! `warden` — offline access to the governance core.
//!
//! Evaluates routing policy, scores output text, verifies exported audit
//! logs, and prints the compliance summary, all without touching a provider.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use warden_core::audit::JsonlStore;
use warden_core::policy::{PolicyEngine, RuleFile};
use warden_core::risk::RiskScorer;
use warden_core::types::{DataClassification, Industry, RequestContext};
use warden_core::verify_records;

#[derive(Parser)]
#[command(name = "warden", version, about = "Governance core for AI gateway routing")]
struct Cli {
    /// Additional rule definitions (YAML) merged over the baseline rules.
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a request context into a routing decision.
    Evaluate {
        #[arg(long, default_value = "general")]
        industry: Industry,

        #[arg(long, default_value = "internal")]
        classification: DataClassification,

        #[arg(long, default_value = "cli-user")]
        user: String,

        /// Request identifier; generated when omitted.
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Score output text for risk (reads stdin unless --file is given).
    Score {
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long, default_value = "general")]
        industry: Industry,

        #[arg(long, default_value = "internal")]
        classification: DataClassification,
    },

    /// Verify the hash chain of an exported audit log (JSONL).
    Verify { log: PathBuf },

    /// Print the compliance summary of the loaded rule set and catalog.
    Report,
}

fn build_engine(rules: Option<&PathBuf>) -> Result<PolicyEngine> {
    let engine = PolicyEngine::with_defaults();
    if let Some(path) = rules {
        let file = RuleFile::from_yaml_file(path)
            .with_context(|| format!("loading rules from {}", path.display()))?;
        engine
            .load_rules(&file.rules)
            .context("compiling rule definitions")?;
    }
    Ok(engine)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Evaluate {
            industry,
            classification,
            user,
            request_id,
        } => {
            let engine = build_engine(cli.rules.as_ref())?;
            let request_id = request_id.unwrap_or_else(|| {
                format!("req-{}", chrono::Utc::now().timestamp_millis())
            });
            let context = RequestContext::new(request_id, user, "")
                .with_industry(industry)
                .with_classification(classification);

            let decision = engine.evaluate(&context);
            print_json(&decision)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Score {
            file,
            industry,
            classification,
        } => {
            let output = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buffer)
                        .context("reading stdin")?;
                    buffer
                }
            };

            let context = RequestContext::new("cli-score", "cli-user", "")
                .with_industry(industry)
                .with_classification(classification);
            let score = RiskScorer::new().score(&output, &context);
            print_json(&score)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { log } => {
            let records = JsonlStore::read_all(&log)
                .with_context(|| format!("reading audit log {}", log.display()))?;
            let report = verify_records(&records);
            print_json(&report)?;
            Ok(if report.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Report => {
            let engine = build_engine(cli.rules.as_ref())?;
            let report = serde_json::json!({
                "rules_loaded": engine.rule_count(),
                "snapshot_version": engine.snapshot_version(),
                "providers": engine.catalog().profiles(),
            });
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
