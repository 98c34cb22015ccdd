//! # recseal-record: Selective-Disclosure Records
//!
//! A JSON document becomes a [`RecordTree`] whose leaves are assigned to
//! channels and given disclosure attributes. A sealed record is one wire
//! section per channel plus a Merkle root per private channel. From the
//! owner's tree, or from a tree already read back from a proof, a holder can
//! export a proof that reveals a chosen subset of leaves. A verifier checks
//! it against the published roots alone.
//!
//! ## Flow
//!
//! ```text
//! JSON ──► RecordTree ──► policy / set_* ──► finalize
//!                                              │
//!                        ┌─────────────────────┼──────────────────────┐
//!                        ▼                     ▼                      ▼
//!                  seal() sections       channel_root()        export_proof()
//!                        │                     │                      │
//!                        ▼                     ▼                      ▼
//!                from_sections()        CommitmentLookup ◄──── from_proof()
//! ```
//!
//! ## Modules
//!
//! - [`node`]: the tree's node and leaf types.
//! - [`tree`]: attribute operations, finalize and channel commitments.
//! - [`mask`]: regex and interval masking.
//! - [`section`]: the per-channel wire format.
//! - [`proof`]: proof export and verified import.
//! - [`ledger`]: sealed sections, the roots-only file verifiers hold, and
//!   published-root lookup.
//! - [`policy`]: YAML channel and field rules.
//!
//! ## Crate Policy
//!
//! - Peppers never appear in proofs, logs or `Debug` output.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod channel;
pub mod ledger;
pub mod mask;
pub mod node;
pub mod path;
pub mod policy;
pub mod proof;
pub mod section;
pub mod tree;

pub use channel::{Channel, ChannelRegistry, Visibility};
pub use ledger::{
    ChannelSection, CommitmentLookup, LedgerBundle, PublishedRoot, PublishedRoots,
};
pub use mask::{MaskInterval, MaskSpec, MaskedParts};
pub use node::{BaseKind, Format, Leaf, LeafKind, LeafValue, Node};
pub use policy::{ChannelDecl, FieldRule, RecordPolicy};
pub use proof::{Disclosure, MerkleData, Proof, ProofItem, ProofLeaf, ProofNode};
pub use tree::RecordTree;
