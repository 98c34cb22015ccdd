//! # recseal-cli: Command-Line Interface
//!
//! Provides the `recseal` binary.
//!
//! ## Subcommands
//!
//! - `recseal seal`: apply a YAML record policy to a JSON document and write
//!   the sealed ledger bundle plus a roots-only file for verifiers.
//! - `recseal prove`: reopen a bundle, choose disclosure formats, and write a
//!   proof.
//! - `recseal verify`: check a proof against the published roots and print
//!   what it discloses.
//!
//! ```bash
//! recseal seal --policy policy.yaml --document record.json --out bundle.json --roots roots.json
//! recseal prove --bundle bundle.json --redact this.ssn --mask this.email --out proof.json
//! recseal verify --roots roots.json --proof proof.json
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning                                  |
//! |------|------------------------------------------|
//! | 0    | Success                                  |
//! | 1    | Usage, I/O, policy or decode error       |
//! | 2    | Proof rejected by verification           |

pub mod prove;
pub mod seal;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};

/// Success.
pub const EXIT_OK: u8 = 0;
/// Any failure other than proof rejection.
pub const EXIT_ERROR: u8 = 1;
/// The proof did not verify.
pub const EXIT_REJECTED: u8 = 2;

/// Read a whole file as UTF-8.
pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_text(&path, "{}").unwrap();
        assert_eq!(read_text(&path).unwrap(), "{}");
    }

    #[test]
    fn read_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_text(&dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
