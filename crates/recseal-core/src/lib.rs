#![deny(missing_docs)]

//! # recseal-core: Foundational Types
//!
//! The leaf of the recseal crate DAG. Defines the types every other crate
//! agrees on:
//!
//! - **`Hash32`**: the 32-byte digest carried by every commitment, witness
//!   and Merkle root, rendered as lowercase hex on the wire.
//! - **`ChannelId`**: newtype identifier for a record channel.
//! - **`ByteWriter` / `ByteReader`**: the LEB128 varint codec used by the
//!   per-channel wire format.
//! - **`PathExpr` / `NodePath`**: the `this.a[0].b` path grammar and the
//!   rendered node paths embedded in Merkle leaf tags.
//! - **Error hierarchy**: policy violations, decode failures, proof
//!   rejections and Merkle errors as distinct `thiserror` enums.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `recseal-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod codec;
pub mod digest;
pub mod error;
pub mod identity;
pub mod path;

pub use codec::{ByteReader, ByteWriter};
pub use digest::Hash32;
pub use error::{DecodeError, MerkleError, PolicyError, ProofError, RecordError};
pub use identity::ChannelId;
pub use path::{NodePath, PathExpr, Segment, Selector};
