//! # Merklizers
//!
//! Turn one channel's leaves into a Merkle root, and back.
//!
//! ## Leaf Tag
//!
//! Every commitment mixes in `typeByte || uint16_be(len(path)) || utf8(path)`,
//! so a leaf commitment cannot be replayed at another position or under
//! another declared type.
//!
//! ## Commitments
//!
//! - Plain: `H(salt || tag || payload)`
//! - Hashable: `H(salt || tag || H(payload))`. The inner digest alone is
//!   enough to reopen the commitment, which is what Hashed disclosure sends.
//! - Maskable: `H( H(visSalt || tag || visible) || H(hidSalt || hidden) )`.
//!   The hidden sub-commitment carries no tag.
//!
//! ## Ordering
//!
//! The committing merklizer sorts leaves by their own commitment before
//! building the tree, so leaf indices reveal nothing about document order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use recseal_core::{Hash32, MerkleError};

use crate::merkle::{MerkleTree, MAX_LEAVES};
use crate::salt::{Pepper, Salt, SaltStream};
use crate::sha256::{sha256, sha256_concat};

/// Build a leaf tag from the type byte and the rendered node path.
pub fn leaf_tag(type_byte: u8, path: &str) -> Result<Vec<u8>, MerkleError> {
    let len = u16::try_from(path.len()).map_err(|_| MerkleError::TagTooLong(path.len()))?;
    let mut tag = Vec::with_capacity(3 + path.len());
    tag.push(type_byte);
    tag.extend_from_slice(&len.to_be_bytes());
    tag.extend_from_slice(path.as_bytes());
    Ok(tag)
}

/// A value that is either available in clear or only as its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inner<'a> {
    /// Serialized payload bytes.
    Clear(&'a [u8]),
    /// A digest disclosed in place of the payload.
    Digest(Hash32),
}

impl Inner<'_> {
    fn is_clear(&self) -> bool {
        matches!(self, Inner::Clear(_))
    }
}

/// What a merklizer needs to know about one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafMaterial<'a> {
    /// Plain leaf payload.
    Plain(&'a [u8]),
    /// Hashable leaf payload or its digest.
    Hashable(Inner<'a>),
    /// Maskable leaf: visible-part payload plus hidden-part payload or
    /// hidden sub-commitment.
    Maskable {
        /// Encoded visible-part list.
        visible: &'a [u8],
        /// Encoded hidden-part list, or its sub-commitment.
        hidden: Inner<'a>,
    },
}

impl LeafMaterial<'_> {
    fn is_clear(&self) -> bool {
        match self {
            LeafMaterial::Plain(_) => true,
            LeafMaterial::Hashable(inner) => inner.is_clear(),
            LeafMaterial::Maskable { hidden, .. } => hidden.is_clear(),
        }
    }

    fn needs_hidden_salt(&self) -> bool {
        matches!(self, LeafMaterial::Maskable { .. })
    }
}

/// The salts used by one leaf. Maskable leaves have a second salt for the
/// hidden sub-commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSalts {
    /// Main (or visible-part) salt.
    pub salt: Salt,
    /// Hidden-part salt, Maskable leaves only.
    pub hidden_salt: Option<Salt>,
}

/// Digest of a payload, as disclosed for Hashed leaves.
pub fn value_digest(payload: &[u8]) -> Hash32 {
    sha256(payload)
}

/// Hidden sub-commitment of a Maskable leaf, as disclosed for Masked leaves.
pub fn hidden_digest(hidden_salt: &Salt, hidden_payload: &[u8]) -> Hash32 {
    sha256_concat(&[hidden_salt.as_ref(), hidden_payload])
}

/// Commitment of one leaf.
pub fn leaf_commitment(
    tag: &[u8],
    material: &LeafMaterial<'_>,
    salts: &LeafSalts,
) -> Result<Hash32, MerkleError> {
    let salt = salts.salt.as_ref();
    let commitment = match material {
        LeafMaterial::Plain(payload) => sha256_concat(&[salt, tag, payload]),
        LeafMaterial::Hashable(inner) => {
            let digest = match inner {
                Inner::Clear(payload) => value_digest(payload),
                Inner::Digest(d) => *d,
            };
            sha256_concat(&[salt, tag, digest.as_ref()])
        }
        LeafMaterial::Maskable { visible, hidden } => {
            let visible_part = sha256_concat(&[salt, tag, visible]);
            let hidden_part = match hidden {
                Inner::Clear(payload) => {
                    let hidden_salt = salts.hidden_salt.as_ref().ok_or(MerkleError::MissingSalt)?;
                    hidden_digest(hidden_salt, payload)
                }
                Inner::Digest(d) => *d,
            };
            sha256_concat(&[visible_part.as_ref(), hidden_part.as_ref()])
        }
    };
    Ok(commitment)
}

/// A committed leaf: the salts it drew and its commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafSeal {
    /// Salts drawn from the channel's stream.
    pub salts: LeafSalts,
    /// The leaf commitment.
    pub commitment: Hash32,
}

/// Owner-side merklizer. Holds the channel pepper.
#[derive(Debug)]
pub struct CommittingMerklizer {
    salts: SaltStream,
    commitments: Vec<Hash32>,
}

impl CommittingMerklizer {
    /// Start a merklizer for one channel.
    pub fn new(pepper: Pepper) -> Self {
        Self {
            salts: SaltStream::new(pepper),
            commitments: Vec::new(),
        }
    }

    /// Commit the next leaf in traversal order.
    ///
    /// The leaf's ordinal is the number of leaves added before it; pass it to
    /// [`CommittedTree::leaf_index`] after [`Self::generate_tree`].
    pub fn add_leaf(&mut self, tag: &[u8], material: &LeafMaterial<'_>) -> Result<LeafSeal, MerkleError> {
        if !material.is_clear() {
            return Err(MerkleError::ConcealedMaterial);
        }
        let salt = self.salts.next_salt()?;
        let hidden_salt = if material.needs_hidden_salt() {
            Some(self.salts.next_salt()?)
        } else {
            None
        };
        let salts = LeafSalts { salt, hidden_salt };
        let commitment = leaf_commitment(tag, material, &salts)?;
        self.commitments.push(commitment);
        Ok(LeafSeal { salts, commitment })
    }

    /// Sort leaves by commitment and build the tree.
    pub fn generate_tree(self) -> Result<CommittedTree, MerkleError> {
        let count = self.commitments.len();
        if count > MAX_LEAVES {
            return Err(MerkleError::TooManyLeaves(count));
        }

        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&ordinal| self.commitments[ordinal]);

        let mut positions = vec![0u32; count];
        for (position, &ordinal) in order.iter().enumerate() {
            positions[ordinal] = position as u32;
        }
        let sorted = order.iter().map(|&ordinal| self.commitments[ordinal]).collect();
        let tree = MerkleTree::from_leaves(sorted);

        tracing::debug!(leaf_count = count, root = %tree.root(), "generated channel tree");
        Ok(CommittedTree { tree, positions })
    }
}

/// Result of [`CommittingMerklizer::generate_tree`].
#[derive(Debug, Clone)]
pub struct CommittedTree {
    tree: MerkleTree,
    /// Leaf index of each ordinal.
    positions: Vec<u32>,
}

impl CommittedTree {
    /// Number of leaves.
    pub fn leaf_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Root hash.
    pub fn root(&self) -> Hash32 {
        self.tree.root()
    }

    /// The sorted position of the `ordinal`-th added leaf.
    pub fn leaf_index(&self, ordinal: usize) -> Option<u32> {
        self.positions.get(ordinal).copied()
    }

    /// Witnesses letting a holder of exactly `known` positions recompute the
    /// root.
    pub fn witnesses(&self, known: &BTreeSet<u32>) -> Result<Vec<Hash32>, MerkleError> {
        let known = known.iter().map(|&i| i as usize).collect();
        self.tree.witnesses(&known)
    }

    /// The underlying tree.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }
}

/// Verifier-side merklizer. Never sees the pepper.
#[derive(Debug, Clone)]
pub struct VerifyingMerklizer {
    leaf_count: usize,
    witnesses: Vec<Hash32>,
    known: BTreeMap<usize, Hash32>,
}

impl VerifyingMerklizer {
    /// Start from the published leaf count and hex-concatenated witnesses.
    pub fn new(leaf_count: u32, witnesses_hex: &str) -> Result<Self, MerkleError> {
        let leaf_count = leaf_count as usize;
        if leaf_count > MAX_LEAVES {
            return Err(MerkleError::TooManyLeaves(leaf_count));
        }
        Ok(Self {
            leaf_count,
            witnesses: Hash32::list_from_hex(witnesses_hex)?,
            known: BTreeMap::new(),
        })
    }

    /// Recompute a disclosed leaf's commitment and place it at `index`.
    pub fn add_leaf(
        &mut self,
        index: u32,
        tag: &[u8],
        material: &LeafMaterial<'_>,
        salts: &LeafSalts,
    ) -> Result<Hash32, MerkleError> {
        let position = index as usize;
        if position >= self.leaf_count {
            return Err(MerkleError::PositionOutOfRange {
                position,
                leaf_count: self.leaf_count,
            });
        }
        if self.known.contains_key(&position) {
            return Err(MerkleError::DuplicateLeaf(position));
        }
        let commitment = leaf_commitment(tag, material, salts)?;
        self.known.insert(position, commitment);
        Ok(commitment)
    }

    /// Fill the remaining positions from witnesses and build the sparse tree.
    pub fn finish(self) -> Result<MerkleTree, MerkleError> {
        MerkleTree::from_sparse(self.leaf_count, &self.known, &self.witnesses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pepper() -> Pepper {
        Pepper::from_bytes([9; 32])
    }

    #[test]
    fn tag_layout() {
        let tag = leaf_tag(0x0a, ".a[1]").unwrap();
        assert_eq!(tag, vec![0x0a, 0x00, 0x05, b'.', b'a', b'[', b'1', b']']);
        assert_eq!(leaf_tag(2, "").unwrap(), vec![2, 0, 0]);
        let long = "x".repeat(70_000);
        assert_eq!(leaf_tag(2, &long), Err(MerkleError::TagTooLong(70_000)));
    }

    #[test]
    fn plain_commitment_formula() {
        let salts = LeafSalts {
            salt: Salt::new([1; 16]),
            hidden_salt: None,
        };
        let tag = leaf_tag(2, ".a").unwrap();
        let got = leaf_commitment(&tag, &LeafMaterial::Plain(b"payload"), &salts).unwrap();
        assert_eq!(got, sha256_concat(&[&[1u8; 16], &tag, b"payload"]));
    }

    #[test]
    fn hashable_commitment_accepts_digest_in_place_of_payload() {
        let salts = LeafSalts {
            salt: Salt::new([4; 16]),
            hidden_salt: None,
        };
        let tag = leaf_tag(0x0a, ".id").unwrap();
        let clear = leaf_commitment(&tag, &LeafMaterial::Hashable(Inner::Clear(b"42")), &salts).unwrap();
        let hashed = leaf_commitment(
            &tag,
            &LeafMaterial::Hashable(Inner::Digest(value_digest(b"42"))),
            &salts,
        )
        .unwrap();
        assert_eq!(clear, hashed);
    }

    #[test]
    fn maskable_hidden_part_omits_the_tag() {
        let salts = LeafSalts {
            salt: Salt::new([5; 16]),
            hidden_salt: Some(Salt::new([6; 16])),
        };
        let tag = leaf_tag(0x12, ".email").unwrap();
        let material = LeafMaterial::Maskable {
            visible: b"vis",
            hidden: Inner::Clear(b"hid"),
        };
        let got = leaf_commitment(&tag, &material, &salts).unwrap();
        let vis = sha256_concat(&[&[5u8; 16], &tag, b"vis"]);
        let hid = sha256_concat(&[&[6u8; 16], b"hid"]);
        assert_eq!(got, sha256_concat(&[vis.as_ref(), hid.as_ref()]));

        let masked = LeafMaterial::Maskable {
            visible: b"vis",
            hidden: Inner::Digest(hidden_digest(&Salt::new([6; 16]), b"hid")),
        };
        assert_eq!(leaf_commitment(&tag, &masked, &salts).unwrap(), got);
    }

    #[test]
    fn maskable_without_hidden_salt_fails() {
        let salts = LeafSalts {
            salt: Salt::new([5; 16]),
            hidden_salt: None,
        };
        let material = LeafMaterial::Maskable {
            visible: b"v",
            hidden: Inner::Clear(b"h"),
        };
        assert_eq!(
            leaf_commitment(b"t", &material, &salts),
            Err(MerkleError::MissingSalt)
        );
    }

    #[test]
    fn committing_sorts_leaves_by_commitment() {
        let mut m = CommittingMerklizer::new(pepper());
        let mut seals = Vec::new();
        for i in 0..6 {
            let tag = leaf_tag(2, &format!(".f{i}")).unwrap();
            seals.push(m.add_leaf(&tag, &LeafMaterial::Plain(b"x")).unwrap());
        }
        let committed = m.generate_tree().unwrap();
        assert_eq!(committed.leaf_count(), 6);

        let mut sorted: Vec<Hash32> = seals.iter().map(|s| s.commitment).collect();
        sorted.sort();
        for (ordinal, seal) in seals.iter().enumerate() {
            let index = committed.leaf_index(ordinal).unwrap() as usize;
            assert_eq!(sorted[index], seal.commitment);
            assert_eq!(committed.tree().leaf(index), Some(seal.commitment));
        }
        assert_eq!(committed.root(), MerkleTree::from_leaves(sorted).root());
    }

    #[test]
    fn committing_rejects_concealed_material() {
        let mut m = CommittingMerklizer::new(pepper());
        let err = m
            .add_leaf(b"t", &LeafMaterial::Hashable(Inner::Digest(Hash32::ZERO)))
            .unwrap_err();
        assert_eq!(err, MerkleError::ConcealedMaterial);
    }

    #[test]
    fn maskable_leaves_draw_two_salts() {
        let mut m = CommittingMerklizer::new(pepper());
        let material = LeafMaterial::Maskable {
            visible: b"v",
            hidden: Inner::Clear(b"h"),
        };
        let first = m.add_leaf(b"t", &material).unwrap();
        let second = m.add_leaf(b"t", &LeafMaterial::Plain(b"p")).unwrap();

        let mut stream = SaltStream::new(pepper());
        assert_eq!(first.salts.salt, stream.next_salt().unwrap());
        assert_eq!(first.salts.hidden_salt, Some(stream.next_salt().unwrap()));
        assert_eq!(second.salts.salt, stream.next_salt().unwrap());
        assert_eq!(second.salts.hidden_salt, None);
    }

    #[test]
    fn verifier_recomputes_owner_root() {
        let payloads: Vec<Vec<u8>> = (0..5).map(|i| format!("v{i}").into_bytes()).collect();
        let mut owner = CommittingMerklizer::new(pepper());
        let mut seals = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            let tag = leaf_tag(2, &format!(".f{i}")).unwrap();
            seals.push((tag.clone(), owner.add_leaf(&tag, &LeafMaterial::Plain(p)).unwrap()));
        }
        let committed = owner.generate_tree().unwrap();

        // Disclose leaves 0, 2 and 4 only.
        let disclosed = [0usize, 2, 4];
        let known: BTreeSet<u32> = disclosed
            .iter()
            .map(|&o| committed.leaf_index(o).unwrap())
            .collect();
        let witnesses = committed.witnesses(&known).unwrap();

        let mut verifier =
            VerifyingMerklizer::new(committed.leaf_count(), &Hash32::list_to_hex(&witnesses)).unwrap();
        for &o in &disclosed {
            let (tag, seal) = &seals[o];
            verifier
                .add_leaf(
                    committed.leaf_index(o).unwrap(),
                    tag,
                    &LeafMaterial::Plain(&payloads[o]),
                    &seal.salts,
                )
                .unwrap();
        }
        assert_eq!(verifier.finish().unwrap().root(), committed.root());
    }

    #[test]
    fn verifier_rejects_bad_positions() {
        let salts = LeafSalts {
            salt: Salt::new([0; 16]),
            hidden_salt: None,
        };
        let mut v = VerifyingMerklizer::new(2, "").unwrap();
        v.add_leaf(0, b"t", &LeafMaterial::Plain(b"a"), &salts).unwrap();
        assert_eq!(
            v.add_leaf(0, b"t", &LeafMaterial::Plain(b"a"), &salts),
            Err(MerkleError::DuplicateLeaf(0))
        );
        assert!(matches!(
            v.add_leaf(2, b"t", &LeafMaterial::Plain(b"a"), &salts),
            Err(MerkleError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn verifier_rejects_oversized_leaf_counts() {
        assert!(matches!(
            VerifyingMerklizer::new(u32::MAX, ""),
            Err(MerkleError::TooManyLeaves(n)) if n == u32::MAX as usize
        ));
        let v = VerifyingMerklizer::new(MAX_LEAVES as u32, "").unwrap();
        assert!(matches!(
            v.finish(),
            Err(MerkleError::WitnessCount { expected: 1, actual: 0 })
        ));
    }
}
