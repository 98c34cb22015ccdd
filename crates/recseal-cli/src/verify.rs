//! # `recseal verify`
//!
//! Verifies a proof against a published-roots file and prints the disclosed
//! JSON. A rejected proof exits with
//! [`EXIT_REJECTED`](crate::EXIT_REJECTED).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use recseal_core::RecordError;
use recseal_record::{Proof, PublishedRoots, RecordTree};

use crate::{read_text, EXIT_OK, EXIT_REJECTED};

/// Arguments for `recseal verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Published roots written by `recseal seal`.
    #[arg(long)]
    pub roots: PathBuf,

    /// Proof to check.
    #[arg(long)]
    pub proof: PathBuf,
}

/// Execute `recseal verify`.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let roots = PublishedRoots::from_json_str(&read_text(&args.roots)?)
        .with_context(|| format!("invalid roots file {}", args.roots.display()))?;
    let proof = Proof::from_json_str(&read_text(&args.proof)?)
        .with_context(|| format!("invalid proof {}", args.proof.display()))?;

    match RecordTree::from_proof(&proof, &roots) {
        Ok(tree) => {
            println!("{}", serde_json::to_string_pretty(&tree.to_json())?);
            Ok(EXIT_OK)
        }
        Err(RecordError::ProofInvalid(e)) => {
            eprintln!("proof rejected: {e}");
            Ok(EXIT_REJECTED)
        }
        Err(e) => Err(e).context("failed to read proof"),
    }
}
