//! # Hash Helpers
//!
//! Thin wrappers over `sha2` that take the concatenation of several slices,
//! which is how every commitment in recseal is written down
//! (`H(salt || tag || payload)`). No intermediate buffer is allocated.

use recseal_core::Hash32;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Domain prefix for internal Merkle nodes.
const NODE_PREFIX: u8 = 0x01;

/// SHA-256 of one slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    sha256_concat(&[data])
}

/// SHA-256 of the concatenation of `parts`.
pub fn sha256_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash32::new(out)
}

/// SHA-512 of the concatenation of `parts`; the wide hash behind salt batches.
pub fn sha512_concat(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Internal node hash: `SHA256(0x01 || left || right)`.
pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    sha256_concat(&[&[NODE_PREFIX], left.as_ref(), right.as_ref()])
}

/// Constant-time digest equality, used when checking a recomputed root
/// against a published commitment.
pub fn roots_match(a: &Hash32, b: &Hash32) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
