//! # Record Tree
//!
//! [`RecordTree`] owns a document's [`Node`] hierarchy, its channel
//! registry, and for trees read back from a proof, the verified sparse
//! Merkle tree of every private channel.
//!
//! ## Lifecycle
//!
//! 1. Build from JSON, from ledger sections, or from a proof.
//! 2. Assign channels and base kinds (`set_channel`, `set_hashable`,
//!    `set_maskable`), then formats (`set_redacted`, `set_hashed`,
//!    `set_masked`).
//! 3. [`RecordTree::finalize`] freezes payload bytes and container channel
//!    sets, and draws a pepper for every private channel lacking one.
//! 4. Export sections, roots and proofs. These are reads of the finalized
//!    state.
//!
//! Base-kind and channel changes clear the finalized flag. Format changes do
//! not: they only affect what a proof discloses, never a commitment.
//!
//! ## Proof-Reconstructed Trees
//!
//! Commitments are fixed once a tree is read back from a proof, so only
//! formats may change there. Every other mutation fails with
//! [`PolicyError::ProofTreeLocked`].

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use recseal_core::{ChannelId, Hash32, MerkleError, NodePath, PathExpr, PolicyError, RecordError};
use recseal_crypto::{leaf_tag, CommittedTree, CommittingMerklizer, LeafSeal, MerkleTree, Pepper};

use crate::channel::{ChannelRegistry, Visibility};
use crate::mask::MaskSpec;
use crate::node::{
    for_each_leaf_mut, walk, BaseKind, Concealable, Format, Leaf, LeafContent, LeafKind, LeafValue,
    Node,
};
use crate::path::{resolve, resolve_list};

/// A document under selective-disclosure management.
#[derive(Debug, Clone, Default)]
pub struct RecordTree {
    pub(crate) root: Option<Node>,
    pub(crate) channels: ChannelRegistry,
    /// Sparse trees recomputed while importing a proof.
    pub(crate) verified: BTreeMap<ChannelId, MerkleTree>,
    pub(crate) from_proof: bool,
    pub(crate) finalized: bool,
}

/// A channel leaf together with its owner-side commitment.
#[derive(Debug)]
pub(crate) struct CommittedLeaf<'a> {
    pub path: NodePath,
    pub leaf: &'a Leaf,
    pub seal: LeafSeal,
    pub index: u32,
}

/// Every leaf of one channel, committed.
#[derive(Debug)]
pub(crate) struct ChannelCommitment<'a> {
    pub leaves: Vec<CommittedLeaf<'a>>,
    pub tree: CommittedTree,
}

impl RecordTree {
    /// An empty tree with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON document. Every scalar becomes a fully disclosed
    /// Plain leaf with no channel.
    pub fn from_json(value: &Value) -> Result<Self, RecordError> {
        Ok(Self {
            root: Some(Node::from_json(value)?),
            ..Self::default()
        })
    }

    /// Render as JSON.
    ///
    /// Trees read back from a proof render what the proof discloses:
    /// Redacted leaves are absent, Hashed leaves show the hex digest and
    /// Masked leaves show their masked string.
    pub fn to_json(&self) -> Value {
        self.root
            .as_ref()
            .and_then(|root| root.to_json(self.from_proof))
            .unwrap_or(Value::Null)
    }

    /// The root node.
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Declared channels.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// True once [`Self::finalize`] ran with no later base-kind or channel
    /// change.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// True for trees rebuilt from a proof.
    pub fn is_proof_tree(&self) -> bool {
        self.from_proof
    }

    /// Declare the next channel.
    pub fn declare_channel(&mut self, name: &str, visibility: Visibility) -> Result<ChannelId, PolicyError> {
        self.channels.declare(name, visibility)
    }

    /// Register a channel under a known id.
    pub fn register_channel(
        &mut self,
        id: ChannelId,
        name: &str,
        visibility: Visibility,
    ) -> Result<(), PolicyError> {
        self.channels.register(id, name, visibility)
    }

    /// Install a known pepper on a channel instead of letting finalize draw
    /// one.
    pub fn set_pepper(&mut self, id: ChannelId, pepper: Pepper) -> Result<(), PolicyError> {
        if self.from_proof {
            return Err(PolicyError::ProofTreeLocked {
                path: String::new(),
            });
        }
        self.channels.get_mut(id)?.set_pepper(pepper);
        self.finalized = false;
        Ok(())
    }

    /// The node at a concrete (wildcard-free) path expression.
    pub fn node(&self, path: &str) -> Result<&Node, PolicyError> {
        let root = self.root_ref()?;
        let expr = PathExpr::parse(path)?;
        if expr.has_wildcard() {
            return Err(PolicyError::WildcardNotAllowed(expr.to_string()));
        }
        resolve(root, &expr)?
            .first()
            .and_then(|p| root.at(p))
            .ok_or_else(|| PolicyError::PathNotFound(expr.to_string()))
    }

    /// The leaf at a concrete path expression.
    pub fn leaf(&self, path: &str) -> Result<&Leaf, PolicyError> {
        self.node(path)?.as_leaf().ok_or_else(|| PolicyError::NotALeaf {
            path: path.to_string(),
        })
    }

    // -- attribute operations ------------------------------------------------

    /// Assign every leaf under each target to `channel`.
    pub fn set_channel(&mut self, paths: &str, channel: ChannelId) -> Result<(), PolicyError> {
        self.channels.get(channel)?;
        let targets = resolve_list(self.root_ref()?, paths, true)?;
        if let Some(first) = targets.first() {
            self.ensure_unlocked(first)?;
        }
        let root = self.root_mut()?;
        for target in &targets {
            let node = root
                .at_mut(target)
                .ok_or_else(|| PolicyError::PathNotFound(target.render()))?;
            for_each_leaf_mut::<PolicyError, _>(node, &mut target.clone(), &mut |_, leaf| {
                leaf.channel = Some(channel);
                Ok(())
            })?;
        }
        self.finalized = false;
        Ok(())
    }

    /// Make leaves Hashable.
    pub fn set_hashable(&mut self, paths: &str) -> Result<(), PolicyError> {
        let targets = self.leaf_targets(paths, true)?;
        for path in &targets {
            self.check_base_change(path, BaseKind::Hashable)?;
        }
        for path in &targets {
            let leaf = self.leaf_at_mut(path)?;
            let plain = match &leaf.content {
                LeafContent::Plain(v) => Some(v.clone()),
                _ => None,
            };
            if let Some(value) = plain {
                leaf.content = LeafContent::Hashable(Concealable::Clear(value));
                leaf.payload = None;
            }
        }
        self.finalized = false;
        Ok(())
    }

    /// Make String leaves Maskable, splitting each value with `mask`.
    ///
    /// Interval masks name positions in one particular string, so they only
    /// accept wildcard-free paths.
    pub fn set_maskable(&mut self, paths: &str, mask: &MaskSpec) -> Result<(), PolicyError> {
        let targets = self.leaf_targets(paths, mask.is_pattern())?;
        let compiled = mask.compile()?;
        let mut planned = Vec::with_capacity(targets.len());
        for path in targets {
            self.check_base_change(&path, BaseKind::Maskable)?;
            let Some(LeafValue::String(original)) = self.leaf_at(&path)?.value() else {
                return Err(PolicyError::ConcealedValue { path: path.render() });
            };
            planned.push((path, compiled.apply(&original)?));
        }
        for (path, parts) in planned {
            let leaf = self.leaf_at_mut(&path)?;
            leaf.content = LeafContent::Maskable {
                visible: parts.visible,
                hidden: Concealable::Clear(parts.hidden),
            };
            leaf.payload = None;
        }
        self.finalized = false;
        Ok(())
    }

    /// Leave every leaf under each target out of future proofs.
    ///
    /// On a tree read back from a proof, Hashed and Masked leaves may still
    /// be narrowed to Redacted. Every other format is write-once.
    pub fn set_redacted(&mut self, paths: &str) -> Result<(), PolicyError> {
        let from_proof = self.from_proof;
        let root = self.root_ref()?;
        let mut leaves = Vec::new();
        let mut seen = BTreeSet::new();
        for target in resolve_list(root, paths, true)? {
            let node = root
                .at(&target)
                .ok_or_else(|| PolicyError::PathNotFound(target.render()))?;
            walk::<PolicyError, _>(node, None, &mut |rel, n| {
                if let Node::Leaf(leaf) = n {
                    let path: NodePath = target
                        .segments()
                        .iter()
                        .chain(rel.segments())
                        .cloned()
                        .collect();
                    let narrowing = from_proof
                        && matches!(leaf.format(), Some(Format::Hashed | Format::Masked));
                    if !narrowing {
                        check_format_free(&path, leaf)?;
                    }
                    if seen.insert(path.clone()) {
                        leaves.push(path);
                    }
                }
                Ok(())
            })?;
        }
        self.apply_format(&leaves, Format::Redacted)
    }

    /// Disclose Hashable leaves as their digest only.
    pub fn set_hashed(&mut self, paths: &str) -> Result<(), PolicyError> {
        self.set_leaf_format(paths, Format::Hashed, BaseKind::Hashable)
    }

    /// Disclose Maskable leaves in masked form.
    pub fn set_masked(&mut self, paths: &str) -> Result<(), PolicyError> {
        self.set_leaf_format(paths, Format::Masked, BaseKind::Maskable)
    }

    fn set_leaf_format(&mut self, paths: &str, format: Format, base: BaseKind) -> Result<(), PolicyError> {
        let targets = self.leaf_targets(paths, true)?;
        for path in &targets {
            let leaf = self.leaf_at(path)?;
            check_format_free(path, leaf)?;
            if leaf.base() != base {
                return Err(PolicyError::FormatMismatch {
                    path: path.render(),
                    format: format.name(),
                    base: leaf.base().name(),
                });
            }
        }
        self.apply_format(&targets, format)
    }

    fn apply_format(&mut self, paths: &[NodePath], format: Format) -> Result<(), PolicyError> {
        for path in paths {
            self.leaf_at_mut(path)?.format = Some(format);
        }
        Ok(())
    }

    // -- finalize and commitments --------------------------------------------

    /// Freeze payloads and channel sets.
    ///
    /// Fails if a leaf has no channel, names an undeclared channel, or (on
    /// trees not read from a proof) an array has an index gap.
    pub fn finalize(&mut self) -> Result<(), RecordError> {
        if let Some(root) = self.root.as_mut() {
            let channels = &self.channels;
            for_each_leaf_mut::<PolicyError, _>(root, &mut NodePath::root(), &mut |path, leaf| {
                let id = leaf.channel.ok_or_else(|| PolicyError::ChannelUnset {
                    path: path.render(),
                })?;
                channels.get(id)?;
                leaf.payload = Some(leaf.content.payload());
                Ok(())
            })?;
            root.refresh_channels();
            if !self.from_proof {
                root.check_contiguous(&mut NodePath::root())?;
            }
        }
        if !self.from_proof {
            for channel in self.channels.iter_mut() {
                if channel.is_private() && channel.pepper().is_none() {
                    channel.set_pepper(Pepper::generate());
                    tracing::debug!(channel = %channel.id(), "drew pepper for private channel");
                }
            }
        }
        self.finalized = true;
        Ok(())
    }

    /// The Merkle root committing a private channel. Public channels have
    /// no commitment and return `None`.
    pub fn channel_root(&self, id: ChannelId) -> Result<Option<Hash32>, RecordError> {
        if !self.channels.get(id)?.is_private() {
            return Ok(None);
        }
        if let Some(tree) = self.verified.get(&id) {
            return Ok(Some(tree.root()));
        }
        Ok(Some(self.commit_channel(id)?.tree.root()))
    }

    /// Every leaf of a channel in traversal order.
    pub(crate) fn channel_leaves(&self, id: ChannelId) -> Result<Vec<(NodePath, &Leaf)>, PolicyError> {
        if !self.finalized {
            return Err(PolicyError::NotFinalized);
        }
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            walk::<PolicyError, _>(root, Some(id), &mut |path, node| {
                if let Node::Leaf(leaf) = node {
                    out.push((path.clone(), leaf));
                }
                Ok(())
            })?;
        }
        Ok(out)
    }

    /// Commit a private channel with its pepper.
    pub(crate) fn commit_channel(&self, id: ChannelId) -> Result<ChannelCommitment<'_>, RecordError> {
        let pepper = self
            .channels
            .get(id)?
            .pepper()
            .cloned()
            .ok_or(PolicyError::MissingPepper(id))?;
        let mut merklizer = CommittingMerklizer::new(pepper);
        let mut sealed = Vec::new();
        for (path, leaf) in self.channel_leaves(id)? {
            let payload = leaf.payload().ok_or(PolicyError::NotFinalized)?;
            let tag = leaf_tag(leaf.type_byte(), &path.render())?;
            let seal = merklizer.add_leaf(&tag, &payload.material())?;
            sealed.push((path, leaf, seal));
        }
        let tree = merklizer.generate_tree()?;
        let leaf_count = sealed.len();
        let leaves = sealed
            .into_iter()
            .enumerate()
            .map(|(ordinal, (path, leaf, seal))| {
                let index = tree
                    .leaf_index(ordinal)
                    .ok_or(MerkleError::PositionOutOfRange {
                        position: ordinal,
                        leaf_count,
                    })?;
                Ok(CommittedLeaf {
                    path,
                    leaf,
                    seal,
                    index,
                })
            })
            .collect::<Result<Vec<_>, MerkleError>>()?;
        Ok(ChannelCommitment { leaves, tree })
    }

    // -- helpers -------------------------------------------------------------

    pub(crate) fn root_ref(&self) -> Result<&Node, PolicyError> {
        self.root.as_ref().ok_or(PolicyError::EmptyDocument)
    }

    fn root_mut(&mut self) -> Result<&mut Node, PolicyError> {
        self.root.as_mut().ok_or(PolicyError::EmptyDocument)
    }

    fn ensure_unlocked(&self, path: &NodePath) -> Result<(), PolicyError> {
        if self.from_proof {
            return Err(PolicyError::ProofTreeLocked { path: path.render() });
        }
        Ok(())
    }

    fn leaf_targets(&self, paths: &str, allow_wildcard: bool) -> Result<Vec<NodePath>, PolicyError> {
        let targets = resolve_list(self.root_ref()?, paths, allow_wildcard)?;
        for path in &targets {
            self.leaf_at(path)?;
        }
        Ok(targets)
    }

    fn leaf_at(&self, path: &NodePath) -> Result<&Leaf, PolicyError> {
        self.root_ref()?
            .at(path)
            .ok_or_else(|| PolicyError::PathNotFound(path.render()))?
            .as_leaf()
            .ok_or_else(|| PolicyError::NotALeaf { path: path.render() })
    }

    fn leaf_at_mut(&mut self, path: &NodePath) -> Result<&mut Leaf, PolicyError> {
        self.root_mut()?
            .at_mut(path)
            .ok_or_else(|| PolicyError::PathNotFound(path.render()))?
            .as_leaf_mut()
            .ok_or_else(|| PolicyError::NotALeaf { path: path.render() })
    }

    fn check_base_change(&self, path: &NodePath, requested: BaseKind) -> Result<(), PolicyError> {
        self.ensure_unlocked(path)?;
        let leaf = self.leaf_at(path)?;
        check_format_free(path, leaf)?;
        let current = leaf.base();
        if current != BaseKind::Plain && current != requested {
            return Err(PolicyError::BaseKindConflict {
                path: path.render(),
                current: current.name(),
                requested: requested.name(),
            });
        }
        if requested == BaseKind::Maskable && leaf.kind() != LeafKind::String {
            return Err(PolicyError::NotAString { path: path.render() });
        }
        Ok(())
    }
}

fn check_format_free(path: &NodePath, leaf: &Leaf) -> Result<(), PolicyError> {
    match leaf.format() {
        Some(format) => Err(PolicyError::FormatAlreadySet {
            path: path.render(),
            format: format.name(),
        }),
        None => Ok(()),
    }
}
