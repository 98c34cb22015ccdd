//! # Selective-Disclosure Proofs
//!
//! A proof is a pruned copy of the record tree holding only the disclosed
//! leaves of private channels. Each channel also gets its leaf count and the
//! witnesses standing in for every leaf left out.
//!
//! ```json
//! {
//!   "recordData": { "type": "object", "members": { ... } },
//!   "merkleData": [ { "channelId": 1, "leafCount": 4, "witnesses": "ab12..." } ]
//! }
//! ```
//!
//! Each disclosed leaf carries its channel, kind, leaf index, salt and one
//! disclosure:
//!
//! | Format     | Disclosure                              |
//! |------------|-----------------------------------------|
//! | `plain`    | `value`                                 |
//! | `hashable` | `value`                                 |
//! | `hashed`   | `digest`                                |
//! | `maskable` | `visible`, `hiddenSalt`, `hidden`       |
//! | `masked`   | `visible`, `hiddenDigest`               |
//!
//! Public channels are never part of a proof.
//!
//! ## Security Invariant
//!
//! A proof never contains a pepper, the value of a Redacted leaf, the clear
//! value of a Hashed leaf, or the hidden parts of a Masked leaf. Import
//! accepts a tree only if every channel's recomputed root matches the
//! published commitment (compared in constant time).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use recseal_core::{
    ChannelId, Hash32, MerkleError, NodePath, PolicyError, ProofError, RecordError, Segment,
};
use recseal_crypto::{
    hidden_digest, leaf_tag, roots_match, value_digest, LeafSalts, Salt, VerifyingMerklizer,
};

use crate::channel::Visibility;
use crate::ledger::CommitmentLookup;
use crate::mask;
use crate::node::{
    encode_parts, ArrayNode, Concealable, Format, Leaf, LeafContent, LeafKind, LeafValue, Node,
    ObjectNode, ProvenLeaf,
};
use crate::tree::RecordTree;

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// A selective-disclosure proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// Sparse record tree; `null` when nothing is disclosed.
    pub record_data: Option<ProofNode>,
    /// Per-channel Merkle material.
    pub merkle_data: Vec<MerkleData>,
}

/// Merkle material for one private channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleData {
    /// The channel.
    pub channel_id: ChannelId,
    /// Leaves in the channel's tree.
    pub leaf_count: u32,
    /// Hex-concatenated 32-byte witnesses.
    pub witnesses: String,
}

/// A node of the sparse tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProofNode {
    /// Object with at least one disclosed descendant.
    Object {
        /// Members by name.
        members: BTreeMap<String, ProofNode>,
    },
    /// Array with at least one disclosed descendant. Items keep their
    /// original index, which is part of every descendant's leaf tag.
    Array {
        /// Items in index order.
        items: Vec<ProofItem>,
    },
    /// Disclosed leaf.
    Leaf(ProofLeaf),
}

/// One array item of the sparse tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofItem {
    /// Original index.
    pub index: u32,
    /// The item.
    pub value: ProofNode,
}

/// A disclosed leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofLeaf {
    /// Owning channel.
    pub channel_id: ChannelId,
    /// Scalar kind.
    pub kind: LeafKind,
    /// Position in the channel tree.
    pub leaf_index: u32,
    /// Main (visible-part) salt.
    pub salt: Salt,
    /// What is disclosed.
    pub disclosure: Disclosure,
}

/// Disclosed material of one leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Disclosure {
    /// Plain leaf, in clear.
    Plain {
        /// The value.
        value: Value,
    },
    /// Hashable leaf, in clear.
    Hashable {
        /// The value.
        value: Value,
    },
    /// Hashable leaf, digest only.
    Hashed {
        /// Digest of the payload.
        digest: Hash32,
    },
    /// Maskable leaf, in clear.
    Maskable {
        /// Kept text and replacements.
        visible: Vec<String>,
        /// Salt of the hidden sub-commitment.
        #[serde(rename = "hiddenSalt")]
        hidden_salt: Salt,
        /// Hidden parts.
        hidden: Vec<String>,
    },
    /// Maskable leaf, masked.
    Masked {
        /// Kept text and replacements.
        visible: Vec<String>,
        /// The hidden sub-commitment.
        #[serde(rename = "hiddenDigest")]
        hidden_digest: Hash32,
    },
}

impl Proof {
    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(s)?)
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

impl RecordTree {
    /// Export a proof disclosing every private-channel leaf that is not
    /// Redacted, under its chosen format.
    ///
    /// On an owner tree the channel trees are recommitted with their
    /// peppers. On a tree read back from a proof, the disclosed salts,
    /// indices and digests are reused and witnesses come from the verified
    /// sparse trees, so a holder can redact further without the pepper.
    pub fn export_proof(&self) -> Result<Proof, RecordError> {
        if !self.finalized {
            return Err(PolicyError::NotFinalized.into());
        }
        let mut emitted = BTreeMap::new();
        let mut merkle_data = Vec::new();
        for channel in self.channels.iter().filter(|c| c.is_private()) {
            let id = channel.id();
            let present = self.root.as_ref().is_some_and(|root| root.has_channel(id));
            if !present && !self.verified.contains_key(&id) {
                continue;
            }
            let (leaf_count, witnesses) = if self.from_proof {
                self.export_derived(id, &mut emitted)?
            } else {
                self.export_owned(id, &mut emitted)?
            };
            merkle_data.push(MerkleData {
                channel_id: id,
                leaf_count,
                witnesses: Hash32::list_to_hex(&witnesses),
            });
        }

        let disclosed = emitted.len();
        let record_data = self
            .root
            .as_ref()
            .and_then(|root| sparse_node(root, &mut NodePath::root(), &mut emitted));

        tracing::debug!(
            channels = merkle_data.len(),
            disclosed,
            derived = self.from_proof,
            "exported proof"
        );
        Ok(Proof {
            record_data,
            merkle_data,
        })
    }

    fn export_owned(
        &self,
        id: ChannelId,
        emitted: &mut BTreeMap<NodePath, ProofLeaf>,
    ) -> Result<(u32, Vec<Hash32>), RecordError> {
        let commitment = self.commit_channel(id)?;
        let mut known = BTreeSet::new();
        for committed in &commitment.leaves {
            if committed.leaf.format() == Some(Format::Redacted) {
                continue;
            }
            let salts = &committed.seal.salts;
            let disclosure = disclose(committed.leaf, salts)?;
            known.insert(committed.index);
            emitted.insert(
                committed.path.clone(),
                ProofLeaf {
                    channel_id: id,
                    kind: committed.leaf.kind(),
                    leaf_index: committed.index,
                    salt: salts.salt,
                    disclosure,
                },
            );
        }
        let witnesses = commitment.tree.witnesses(&known)?;
        Ok((commitment.tree.leaf_count(), witnesses))
    }

    fn export_derived(
        &self,
        id: ChannelId,
        emitted: &mut BTreeMap<NodePath, ProofLeaf>,
    ) -> Result<(u32, Vec<Hash32>), RecordError> {
        let verified = self
            .verified
            .get(&id)
            .ok_or(ProofError::MissingCommitment(id))?;
        let mut known = BTreeSet::new();
        for (path, leaf) in self.channel_leaves(id)? {
            if leaf.format() == Some(Format::Redacted) {
                continue;
            }
            let proven = leaf.proven().ok_or_else(|| ProofError::Malformed {
                path: path.render(),
                reason: "leaf carries no proven position".into(),
            })?;
            let disclosure = disclose(leaf, &proven.salts)?;
            known.insert(proven.index as usize);
            emitted.insert(
                path,
                ProofLeaf {
                    channel_id: id,
                    kind: leaf.kind(),
                    leaf_index: proven.index,
                    salt: proven.salts.salt,
                    disclosure,
                },
            );
        }
        let witnesses = verified.witnesses(&known)?;
        let leaf_count = verified.leaf_count();
        let leaf_count = u32::try_from(leaf_count).map_err(|_| MerkleError::TooManyLeaves(leaf_count))?;
        Ok((leaf_count, witnesses))
    }
}

/// The disclosure of one non-Redacted leaf under its format.
fn disclose(leaf: &Leaf, salts: &LeafSalts) -> Result<Disclosure, RecordError> {
    let hidden_salt = || salts.hidden_salt.ok_or(MerkleError::MissingSalt);
    let disclosure = match (leaf.content(), leaf.format()) {
        (LeafContent::Plain(v), _) => Disclosure::Plain { value: v.to_json() },
        (LeafContent::Hashable(Concealable::Clear(v)), None) => Disclosure::Hashable { value: v.to_json() },
        (LeafContent::Hashable(Concealable::Clear(v)), Some(_)) => Disclosure::Hashed {
            digest: value_digest(&v.to_payload()),
        },
        (LeafContent::Hashable(Concealable::Digest(d)), _) => Disclosure::Hashed { digest: *d },
        (
            LeafContent::Maskable {
                visible,
                hidden: Concealable::Clear(hidden),
            },
            None,
        ) => Disclosure::Maskable {
            visible: visible.clone(),
            hidden_salt: hidden_salt()?,
            hidden: hidden.clone(),
        },
        (
            LeafContent::Maskable {
                visible,
                hidden: Concealable::Clear(hidden),
            },
            Some(_),
        ) => Disclosure::Masked {
            visible: visible.clone(),
            hidden_digest: hidden_digest(&hidden_salt()?, &encode_parts(hidden)),
        },
        (
            LeafContent::Maskable {
                visible,
                hidden: Concealable::Digest(d),
            },
            _,
        ) => Disclosure::Masked {
            visible: visible.clone(),
            hidden_digest: *d,
        },
    };
    Ok(disclosure)
}

/// Prune `node` to the emitted leaves.
fn sparse_node(
    node: &Node,
    path: &mut NodePath,
    emitted: &mut BTreeMap<NodePath, ProofLeaf>,
) -> Option<ProofNode> {
    match node {
        Node::Object(obj) => {
            let mut members = BTreeMap::new();
            for (name, child) in obj.members() {
                path.push(Segment::Member(name.clone()));
                if let Some(pruned) = sparse_node(child, path, emitted) {
                    members.insert(name.clone(), pruned);
                }
                path.pop();
            }
            (!members.is_empty()).then_some(ProofNode::Object { members })
        }
        Node::Array(arr) => {
            let mut items = Vec::new();
            for (&index, child) in arr.items() {
                path.push(Segment::Index(index));
                if let Some(value) = sparse_node(child, path, emitted) {
                    items.push(ProofItem { index, value });
                }
                path.pop();
            }
            (!items.is_empty()).then_some(ProofNode::Array { items })
        }
        Node::Leaf(_) => emitted.remove(&*path).map(ProofNode::Leaf),
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

impl RecordTree {
    /// Rebuild and verify a tree from a proof.
    ///
    /// Every channel in `merkleData` must have a published root in `lookup`,
    /// and the root recomputed from the disclosed leaves and witnesses must
    /// equal it. The result is locked: only formats may change.
    ///
    /// Published roots are looked up before any Merkle work.
    pub fn from_proof<L>(proof: &Proof, lookup: &L) -> Result<Self, RecordError>
    where
        L: CommitmentLookup + ?Sized,
    {
        let mut expected_roots = BTreeMap::new();
        for data in &proof.merkle_data {
            let id = data.channel_id;
            if expected_roots.contains_key(&id) {
                return Err(ProofError::DuplicateChannel(id).into());
            }
            let root = lookup
                .published_root(id)
                .ok_or(ProofError::MissingCommitment(id))?;
            expected_roots.insert(id, root);
        }

        let mut merklizers = BTreeMap::new();
        for data in &proof.merkle_data {
            let merklizer =
                VerifyingMerklizer::new(data.leaf_count, &data.witnesses).map_err(ProofError::from)?;
            merklizers.insert(data.channel_id, merklizer);
        }

        let root = match &proof.record_data {
            Some(node) => Some(import_node(node, &mut NodePath::root(), &mut merklizers)?),
            None => None,
        };
        let mut tree = RecordTree {
            root,
            from_proof: true,
            ..RecordTree::default()
        };

        for (id, merklizer) in merklizers {
            let computed = merklizer.finish().map_err(ProofError::from)?;
            let expected = expected_roots
                .get(&id)
                .copied()
                .ok_or(ProofError::MissingCommitment(id))?;
            if !roots_match(&expected, &computed.root()) {
                tracing::warn!(channel = %id, "proof root does not match published commitment");
                return Err(ProofError::RootMismatch {
                    channel: id,
                    expected,
                    computed: computed.root(),
                }
                .into());
            }
            let name = lookup
                .channel_name(id)
                .map_or_else(|| format!("channel-{}", id.as_u16()), str::to_owned);
            tree.channels.register(id, &name, Visibility::Private)?;
            tree.verified.insert(id, computed);
        }
        tree.finalize()?;

        tracing::debug!(channels = tree.verified.len(), "verified proof");
        Ok(tree)
    }
}

fn import_node(
    node: &ProofNode,
    path: &mut NodePath,
    merklizers: &mut BTreeMap<ChannelId, VerifyingMerklizer>,
) -> Result<Node, RecordError> {
    match node {
        ProofNode::Object { members } => {
            let mut out = BTreeMap::new();
            for (name, child) in members {
                if !Segment::is_valid_member(name) {
                    return Err(ProofError::Malformed {
                        path: path.render(),
                        reason: format!("member name {name:?} contains '.', '[' or ']'"),
                    }
                    .into());
                }
                path.push(Segment::Member(name.clone()));
                out.insert(name.clone(), import_node(child, path, merklizers)?);
                path.pop();
            }
            Ok(Node::Object(ObjectNode {
                members: out,
                channels: BTreeSet::new(),
            }))
        }
        ProofNode::Array { items } => {
            let mut out = BTreeMap::new();
            for item in items {
                path.push(Segment::Index(item.index));
                let child = import_node(&item.value, path, merklizers)?;
                if out.insert(item.index, child).is_some() {
                    return Err(ProofError::Malformed {
                        path: path.render(),
                        reason: "array index listed twice".into(),
                    }
                    .into());
                }
                path.pop();
            }
            Ok(Node::Array(ArrayNode {
                items: out,
                channels: BTreeSet::new(),
            }))
        }
        ProofNode::Leaf(leaf) => Ok(Node::Leaf(import_leaf(leaf, path, merklizers)?)),
    }
}

fn import_leaf(
    disclosed: &ProofLeaf,
    path: &NodePath,
    merklizers: &mut BTreeMap<ChannelId, VerifyingMerklizer>,
) -> Result<Leaf, ProofError> {
    let rendered = path.render();
    let malformed = |reason: &str| ProofError::Malformed {
        path: rendered.clone(),
        reason: reason.to_string(),
    };
    let merklizer = merklizers
        .get_mut(&disclosed.channel_id)
        .ok_or_else(|| ProofError::UnlistedChannel {
            channel: disclosed.channel_id,
            path: rendered.clone(),
        })?;
    let kind = disclosed.kind;
    let value_of = |value: &Value| {
        LeafValue::from_json_as(kind, value)
            .ok_or_else(|| malformed(&format!("value does not match kind {}", kind.name())))
    };
    let require_string = || {
        if kind == LeafKind::String {
            Ok(())
        } else {
            Err(malformed("only string leaves can be masked"))
        }
    };

    let (content, format, hidden_salt) = match &disclosed.disclosure {
        Disclosure::Plain { value } => (LeafContent::Plain(value_of(value)?), None, None),
        Disclosure::Hashable { value } => (
            LeafContent::Hashable(Concealable::Clear(value_of(value)?)),
            None,
            None,
        ),
        Disclosure::Hashed { digest } => (
            LeafContent::Hashable(Concealable::Digest(*digest)),
            Some(Format::Hashed),
            None,
        ),
        Disclosure::Maskable {
            visible,
            hidden_salt,
            hidden,
        } => {
            require_string()?;
            if !mask::is_well_formed(visible, hidden.len()) {
                return Err(malformed("visible parts do not fit hidden parts"));
            }
            (
                LeafContent::Maskable {
                    visible: visible.clone(),
                    hidden: Concealable::Clear(hidden.clone()),
                },
                None,
                Some(*hidden_salt),
            )
        }
        Disclosure::Masked {
            visible,
            hidden_digest,
        } => {
            require_string()?;
            if visible.len() % 2 == 0 {
                return Err(malformed("visible parts must alternate kept text and replacements"));
            }
            (
                LeafContent::Maskable {
                    visible: visible.clone(),
                    hidden: Concealable::Digest(*hidden_digest),
                },
                Some(Format::Masked),
                None,
            )
        }
    };

    let salts = LeafSalts {
        salt: disclosed.salt,
        hidden_salt,
    };
    let mut leaf = Leaf::with_content(kind, content, disclosed.channel_id);
    leaf.format = format;
    leaf.proven = Some(ProvenLeaf {
        index: disclosed.leaf_index,
        salts,
    });
    let payload = leaf.content().payload();
    let tag = leaf_tag(leaf.type_byte(), &rendered)?;
    merklizer.add_leaf(disclosed.leaf_index, &tag, &payload.material(), &salts)?;
    Ok(leaf)
}
