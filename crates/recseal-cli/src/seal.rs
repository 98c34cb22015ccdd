//! # `recseal seal`
//!
//! Builds a record tree from a JSON document, applies a record policy,
//! finalizes it and writes one section per channel as a ledger bundle. The
//! private channels' roots also go to a separate file for verifiers; the
//! bundle itself holds peppers and stays with the owner.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use recseal_record::{LedgerBundle, RecordPolicy, RecordTree};

use crate::{read_text, write_text, EXIT_OK};

/// Arguments for `recseal seal`.
#[derive(Args, Debug)]
pub struct SealArgs {
    /// YAML record policy.
    #[arg(long)]
    pub policy: PathBuf,

    /// JSON document to seal.
    #[arg(long)]
    pub document: PathBuf,

    /// Where to write the ledger bundle.
    #[arg(long)]
    pub out: PathBuf,

    /// Where to write the published roots.
    #[arg(long)]
    pub roots: PathBuf,
}

/// Execute `recseal seal`.
pub fn run_seal(args: &SealArgs) -> Result<u8> {
    let policy = RecordPolicy::from_yaml_str(&read_text(&args.policy)?)
        .with_context(|| format!("invalid policy {}", args.policy.display()))?;
    let document: serde_json::Value = serde_json::from_str(&read_text(&args.document)?)
        .with_context(|| format!("invalid JSON in {}", args.document.display()))?;

    let mut tree = RecordTree::from_json(&document)?;
    policy.apply(&mut tree).context("failed to apply record policy")?;
    tree.finalize().context("failed to finalize record")?;

    let bundle = LedgerBundle::from(tree.seal()?);
    write_text(&args.out, &bundle.to_json_pretty()?)?;
    write_text(&args.roots, &bundle.published().to_json_pretty()?)?;

    for section in &bundle.sections {
        match section.root {
            Some(root) => println!("  {:<16} private  {}", section.name, root),
            None => println!("  {:<16} public", section.name),
        }
    }
    println!("  bundle: {}", args.out.display());
    println!("  roots:  {}", args.roots.display());
    Ok(EXIT_OK)
}
