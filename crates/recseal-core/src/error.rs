//! # Error Hierarchy
//!
//! Structured error types for recseal, built with `thiserror`. Failures fall
//! into three classes that callers must be able to tell apart:
//!
//! - [`PolicyError`]: the caller misused the API (unknown channel, format
//!   already set, mask that does not partition its string). Not retryable
//!   without fixing the input.
//! - [`DecodeError`]: bytes handed to an importer are structurally invalid.
//!   Consensus-relevant: never silently recovered.
//! - [`ProofError`]: a proof parsed fine but does not verify against the
//!   published commitment.
//!
//! [`MerkleError`] covers the tree primitive and the merklizers. Everything
//! funnels into [`RecordError`] at the record-tree boundary.

use thiserror::Error;

use crate::digest::Hash32;
use crate::identity::ChannelId;

/// Top-level error type for record-tree operations.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Caller misuse.
    #[error("policy violation: {0}")]
    Policy(#[from] PolicyError),

    /// Structurally invalid import payload.
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// Proof did not verify.
    #[error("proof invalid: {0}")]
    ProofInvalid(#[from] ProofError),

    /// Merkle tree or merklizer failure.
    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Caller misuse of the record tree API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The channel id was never declared on this tree.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// Two channels declared with the same name.
    #[error("channel name {0:?} is already declared")]
    DuplicateChannelName(String),

    /// The channel id space is exhausted.
    #[error("too many channels declared")]
    TooManyChannels,

    /// A leaf reached finalize without a channel assignment.
    #[error("leaf at {path:?} has no channel")]
    ChannelUnset {
        /// Rendered path of the leaf.
        path: String,
    },

    /// The operation only applies to leaves.
    #[error("node at {path:?} is not a leaf")]
    NotALeaf {
        /// Rendered path of the node.
        path: String,
    },

    /// Masking only applies to string leaves.
    #[error("leaf at {path:?} is not a string")]
    NotAString {
        /// Rendered path of the leaf.
        path: String,
    },

    /// The leaf already has a different base kind.
    #[error("leaf at {path:?} is already {current}, cannot become {requested}")]
    BaseKindConflict {
        /// Rendered path of the leaf.
        path: String,
        /// The base kind the leaf already has.
        current: &'static str,
        /// The base kind requested.
        requested: &'static str,
    },

    /// Formats are write-once.
    #[error("leaf at {path:?} already has format {format}")]
    FormatAlreadySet {
        /// Rendered path of the leaf.
        path: String,
        /// The format already set.
        format: &'static str,
    },

    /// The requested format is incompatible with the leaf's base kind.
    #[error("format {format} requires a different base kind than {base} at {path:?}")]
    FormatMismatch {
        /// Rendered path of the leaf.
        path: String,
        /// The requested format.
        format: &'static str,
        /// The leaf's base kind.
        base: &'static str,
    },

    /// Mask intervals or pattern do not partition the string.
    #[error("invalid mask: {0}")]
    InvalidMask(String),

    /// The path expression does not parse.
    #[error("invalid path expression: {0}")]
    InvalidPath(String),

    /// The path expression names a node that does not exist.
    #[error("no node at path {0:?}")]
    PathNotFound(String),

    /// The operation does not accept wildcard paths.
    #[error("wildcard not allowed in {0:?}")]
    WildcardNotAllowed(String),

    /// Export attempted before `finalize`.
    #[error("record tree is not finalized")]
    NotFinalized,

    /// A private channel has no pepper to commit with.
    #[error("private channel {0} has no pepper")]
    MissingPepper(ChannelId),

    /// The leaf value is only known as a digest.
    #[error("value at {path:?} is concealed")]
    ConcealedValue {
        /// Rendered path of the leaf.
        path: String,
    },

    /// Base kinds and channels are fixed on trees read back from a proof.
    #[error("leaf at {path:?} belongs to a proof-reconstructed tree and cannot change base kind or channel")]
    ProofTreeLocked {
        /// Rendered path of the node.
        path: String,
    },

    /// The tree has no root node.
    #[error("record tree is empty")]
    EmptyDocument,

    /// A policy rule names a channel the policy never declares.
    #[error("policy references undeclared channel {0:?}")]
    UnknownChannelName(String),

    /// The policy document does not parse.
    #[error("invalid record policy: {0}")]
    InvalidPolicy(String),

    /// An object member name contains a path separator.
    #[error("member name {0:?} contains '.', '[' or ']'")]
    InvalidMemberName(String),
}

/// Structural failure while decoding an imported payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before a complete value was read.
    #[error("unexpected end of input at offset {offset}: needed {needed} more bytes")]
    UnexpectedEof {
        /// Offset at which the read started.
        offset: usize,
        /// Number of bytes that were missing.
        needed: usize,
    },

    /// Bytes remained after the node stream ended.
    #[error("{remaining} trailing bytes at offset {offset}")]
    TrailingBytes {
        /// Offset of the first unread byte.
        offset: usize,
        /// Number of unread bytes.
        remaining: usize,
    },

    /// A varint ran past 64 bits.
    #[error("varint overflow at offset {offset}")]
    VarintOverflow {
        /// Offset at which the varint started.
        offset: usize,
    },

    /// The tag byte names a node kind that does not exist.
    #[error("unknown node kind {0}")]
    UnknownNodeKind(u8),

    /// The tag byte carries attribute bits that are invalid for the node.
    #[error("invalid attribute bits {bits:#04x} at {path:?}")]
    InvalidAttributes {
        /// Rendered path of the node.
        path: String,
        /// The offending attribute bits.
        bits: u8,
    },

    /// A member identity points past the end of the name dictionary.
    #[error("dictionary index {index} out of range (size {size})")]
    DictionaryIndex {
        /// The index read from the stream.
        index: u64,
        /// The dictionary size.
        size: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string's first byte.
        offset: usize,
    },

    /// A scalar payload does not decode to a value of its kind.
    #[error("invalid value at {path:?}: {reason}")]
    InvalidValue {
        /// Rendered path of the leaf.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// Two payloads disagree on the kind of the node at one identity.
    #[error("node kind conflict at {path:?}")]
    KindConflict {
        /// Rendered path of the node.
        path: String,
    },

    /// Two payloads (or one payload twice) define the same node identity.
    #[error("duplicate node at {path:?}")]
    DuplicateNode {
        /// Rendered path of the node.
        path: String,
    },

    /// A dictionary entry contains a path separator.
    #[error("member name {0:?} contains '.', '[' or ']'")]
    InvalidMemberName(String),

    /// A private payload carries a pepper different from the known one.
    #[error("pepper conflict on channel {0}")]
    PepperConflict(ChannelId),

    /// An array's merged indices are not contiguous.
    #[error("array at {path:?} is missing index {missing}")]
    ArrayGap {
        /// Rendered path of the array.
        path: String,
        /// The first missing index.
        missing: u32,
    },
}

/// A proof failed verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The recomputed root differs from the published commitment.
    #[error("channel {channel}: recomputed root {computed} does not match published root {expected}")]
    RootMismatch {
        /// Channel being verified.
        channel: ChannelId,
        /// Published commitment.
        expected: Hash32,
        /// Root recomputed from the proof.
        computed: Hash32,
    },

    /// No published commitment is known for the channel.
    #[error("no published commitment for channel {0}")]
    MissingCommitment(ChannelId),

    /// A disclosed leaf names a channel with no merkle data.
    #[error("leaf at {path:?} names channel {channel} which has no merkle data")]
    UnlistedChannel {
        /// Channel named by the leaf.
        channel: ChannelId,
        /// Rendered path of the leaf.
        path: String,
    },

    /// The same channel appears twice in the merkle data.
    #[error("channel {0} listed twice in merkle data")]
    DuplicateChannel(ChannelId),

    /// A disclosed leaf carries inconsistent material.
    #[error("malformed leaf at {path:?}: {reason}")]
    Malformed {
        /// Rendered path of the leaf.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// The leaf positions or witnesses do not fit the tree.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// Failure in the Merkle tree primitive or the merklizers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// A leaf position is outside the tree.
    #[error("leaf position {position} out of range (leaf count {leaf_count})")]
    PositionOutOfRange {
        /// The offending position.
        position: usize,
        /// The tree's leaf count.
        leaf_count: usize,
    },

    /// A leaf position was supplied twice.
    #[error("leaf position {0} supplied twice")]
    DuplicateLeaf(usize),

    /// The number of witnesses does not match the unknown slots.
    #[error("expected {expected} witnesses, got {actual}")]
    WitnessCount {
        /// Slots that need a witness.
        expected: usize,
        /// Witnesses supplied.
        actual: usize,
    },

    /// The witness string is not hex-concatenated 32-byte hashes.
    #[error("invalid witness encoding: {0}")]
    WitnessEncoding(String),

    /// A node hash needed for the operation is not known.
    #[error("node hash unknown at level {level}, index {index}")]
    MissingNode {
        /// Tree level, 0 for leaves.
        level: usize,
        /// Index within the level.
        index: usize,
    },

    /// The salt batch counter wrapped.
    #[error("salt stream exhausted")]
    SaltStreamExhausted,

    /// A commitment needs a hidden salt that was not supplied.
    #[error("hidden-part salt missing")]
    MissingSalt,

    /// The committing merklizer was handed digest-only material.
    #[error("committing merklizer requires clear leaf material")]
    ConcealedMaterial,

    /// A leaf tag path does not fit its 16-bit length prefix.
    #[error("leaf path of {0} bytes exceeds the 16-bit tag length")]
    TagTooLong(usize),

    /// More leaves than a tree accepts.
    #[error("too many leaves: {0}")]
    TooManyLeaves(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_error_wraps_into_record_error() {
        let err: RecordError = PolicyError::UnknownChannel(ChannelId(4)).into();
        assert!(matches!(err, RecordError::Policy(_)));
        assert_eq!(err.to_string(), "policy violation: unknown channel #4");
    }

    #[test]
    fn proof_error_display_names_both_roots() {
        let err = ProofError::RootMismatch {
            channel: ChannelId(0),
            expected: Hash32::ZERO,
            computed: Hash32::new([1u8; 32]),
        };
        let msg = err.to_string();
        assert!(msg.contains(&"00".repeat(32)));
        assert!(msg.contains(&"01".repeat(32)));
    }

    #[test]
    fn merkle_error_converts_through_proof_error() {
        let err: ProofError = MerkleError::DuplicateLeaf(3).into();
        let err: RecordError = err.into();
        assert!(matches!(err, RecordError::ProofInvalid(ProofError::Merkle(_))));
    }
}
