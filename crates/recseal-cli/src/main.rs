//! # recseal CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recseal_cli::prove::{run_prove, ProveArgs};
use recseal_cli::seal::{run_seal, SealArgs};
use recseal_cli::verify::{run_verify, VerifyArgs};
use recseal_cli::EXIT_ERROR;

/// Selective-disclosure records: seal, prove, verify.
#[derive(Parser, Debug)]
#[command(name = "recseal", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply a record policy to a JSON document and write the sealed bundle.
    Seal(SealArgs),

    /// Export a selective-disclosure proof from a sealed bundle.
    Prove(ProveArgs),

    /// Verify a proof against the published roots.
    Verify(VerifyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Seal(args) => run_seal(args),
        Commands::Prove(args) => run_prove(args),
        Commands::Verify(args) => run_verify(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
