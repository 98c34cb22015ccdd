//! # recseal-crypto: Commitment Primitives
//!
//! Provides the hashing building blocks underneath record commitments:
//!
//! - **SHA-256 / SHA-512** helpers over concatenated byte slices.
//! - **Pepper and salt stream**: a channel's 32-byte secret expanded
//!   deterministically into 16-byte per-leaf salts.
//! - **Merkle tree**: fixed binary tree with full and sparse builds and
//!   minimal batch witnesses for any set of known leaves.
//! - **Merklizers**: the owner-side committing variant (holds the pepper,
//!   sorts leaves by commitment) and the verifier-side variant (rebuilds the
//!   root from disclosed leaves plus witnesses).
//!
//! ## Crate Policy
//!
//! - Depends only on `recseal-core` internally.
//! - No mocking of hashes in tests: all tests use real SHA-256.
//! - Peppers are zeroized on drop and never printed.

pub mod merkle;
pub mod merklizer;
pub mod salt;
pub mod sha256;

pub use merkle::{MerkleTree, MAX_LEAVES};
pub use merklizer::{
    hidden_digest, leaf_commitment, leaf_tag, value_digest, CommittedTree, CommittingMerklizer,
    Inner, LeafMaterial, LeafSalts, LeafSeal, VerifyingMerklizer,
};
pub use salt::{Pepper, Salt, SaltStream};
pub use sha256::{roots_match, sha256, sha256_concat};
