//! The `slim` CLI binary (spec §6, "CLI surface"): `-seed N` overrides
//! the RNG seed from [`RunConfig`], `-TSXC` enables tree-sequence
//! recording with crosschecks at a 50-generation interval, and the
//! configuration file is the first non-flag argument (standing in for
//! "the scripting file", since this workspace's configuration document
//! is what `initialize()` would otherwise build — see `SPEC_FULL.md`).
//!
//! Exit code is 0 on normal termination and nonzero on any error, with
//! the error printed to stderr rather than unwound as a panic (spec
//! §7's "every error that can reach user code is raised as a typed
//! termination").

use clap::Parser;
use slim::{RunConfig, run};
use std::path::PathBuf;
use std::process::ExitCode;

/// The 50-generation crosscheck interval `-TSXC` requests (spec §6).
const TSXC_CROSSCHECK_INTERVAL: u64 = 50;

#[derive(Parser, Debug)]
#[command(name = "slim", version, about = "A forward-time, individual-based population genetic simulator.")]
struct Cli {
    /// Override the RNG seed baked into the configuration file.
    #[arg(long = "seed", value_name = "N")]
    seed: Option<u64>,

    /// Enable tree-sequence recording with crosschecks every 50 generations.
    #[arg(long = "TSXC")]
    tsxc: bool,

    /// Path to the run's configuration document (JSON).
    config_path: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("slim: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> slim::Result<()> {
    let text = std::fs::read_to_string(&cli.config_path)?;
    let mut config: RunConfig = serde_json::from_str(&text)
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to parse {}: {e}", cli.config_path.display()))?;

    if let Some(seed) = cli.seed {
        config.config.seed = Some(seed);
    }
    if cli.tsxc {
        config.config.tree_sequence.enabled = true;
        config.config.tree_sequence.crosscheck_interval = Some(TSXC_CROSSCHECK_INTERVAL);
    }

    let report = run(config)?;
    println!(
        "generation {} complete, {} mutations fixed total{}",
        report.final_generation,
        report.mutations_fixed_total,
        match report.modal_mutrun_count {
            Some(count) => format!(", modal mutrun_count {count}"),
            None => String::new(),
        }
    );
    Ok(())
}
