//! # `recseal prove`
//!
//! Reopens a sealed bundle, applies the requested disclosure formats and
//! writes a proof. Each format flag takes a comma-separated path list and
//! may be repeated.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use recseal_record::{LedgerBundle, RecordTree};

use crate::{read_text, write_text, EXIT_OK};

/// Arguments for `recseal prove`.
#[derive(Args, Debug)]
pub struct ProveArgs {
    /// Ledger bundle written by `recseal seal`.
    #[arg(long)]
    pub bundle: PathBuf,

    /// Paths to leave out of the proof.
    #[arg(long)]
    pub redact: Vec<String>,

    /// Hashable paths to disclose as digests.
    #[arg(long)]
    pub hash: Vec<String>,

    /// Maskable paths to disclose masked.
    #[arg(long)]
    pub mask: Vec<String>,

    /// Where to write the proof.
    #[arg(long)]
    pub out: PathBuf,
}

/// Execute `recseal prove`.
pub fn run_prove(args: &ProveArgs) -> Result<u8> {
    let bundle = LedgerBundle::from_json_str(&read_text(&args.bundle)?)
        .with_context(|| format!("invalid bundle {}", args.bundle.display()))?;
    let mut tree = bundle.open().context("failed to reopen sealed record")?;

    apply_formats(&mut tree, args)?;

    let proof = tree.export_proof()?;
    write_text(&args.out, &proof.to_json_pretty()?)?;
    tracing::info!(
        channels = proof.merkle_data.len(),
        out = %args.out.display(),
        "wrote proof"
    );
    println!("  proof: {}", args.out.display());
    Ok(EXIT_OK)
}

fn apply_formats(tree: &mut RecordTree, args: &ProveArgs) -> Result<()> {
    for paths in &args.redact {
        tree.set_redacted(paths)
            .with_context(|| format!("cannot redact {paths}"))?;
    }
    for paths in &args.hash {
        tree.set_hashed(paths).with_context(|| format!("cannot hash {paths}"))?;
    }
    for paths in &args.mask {
        tree.set_masked(paths).with_context(|| format!("cannot mask {paths}"))?;
    }
    Ok(())
}
