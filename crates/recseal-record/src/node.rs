//! # Record Nodes
//!
//! The intermediate representation every import and export goes through.
//!
//! A [`Node`] is an object (named children), an array (indexed children) or
//! a [`Leaf`]. Containers remember the set of channels present among their
//! descendant leaves; that set is what lets a per-channel walk skip whole
//! subtrees, and it is recomputed bottom-up on every finalize.
//!
//! A leaf carries two independent disclosure axes:
//!
//! - **Base kind** ([`BaseKind`]): Plain, Hashable or Maskable. Part of the
//!   leaf's commitment, so it is fixed before anything is sealed.
//! - **Format** ([`Format`]): Redacted, Hashed or Masked. Chosen at proof
//!   time, write-once, never part of a commitment.
//!
//! ## Node Kinds
//!
//! | Kind    | Code |
//! |---------|------|
//! | Array   | 0    |
//! | Object  | 1    |
//! | String  | 2    |
//! | Number  | 3    |
//! | Boolean | 4    |
//! | Null    | 5    |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use recseal_core::{
    ByteReader, ByteWriter, ChannelId, DecodeError, Hash32, NodePath, PolicyError, Segment,
};
use recseal_crypto::{value_digest, Inner, LeafMaterial, LeafSalts};

use crate::mask;

/// Node kind code of arrays.
pub const KIND_ARRAY: u8 = 0;
/// Node kind code of objects.
pub const KIND_OBJECT: u8 = 1;

// ---------------------------------------------------------------------------
// Kinds and attributes
// ---------------------------------------------------------------------------

/// The scalar type of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON null.
    Null,
}

impl LeafKind {
    /// Node kind code.
    pub fn code(self) -> u8 {
        match self {
            LeafKind::String => 2,
            LeafKind::Number => 3,
            LeafKind::Boolean => 4,
            LeafKind::Null => 5,
        }
    }

    /// Inverse of [`Self::code`]. Container codes are not leaf kinds.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(LeafKind::String),
            3 => Some(LeafKind::Number),
            4 => Some(LeafKind::Boolean),
            5 => Some(LeafKind::Null),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            LeafKind::String => "string",
            LeafKind::Number => "number",
            LeafKind::Boolean => "boolean",
            LeafKind::Null => "null",
        }
    }
}

/// How a leaf is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKind {
    /// The payload is committed directly.
    Plain,
    /// The payload digest is committed, so the leaf can be disclosed as that
    /// digest alone.
    Hashable,
    /// The string is split into visible and hidden parts committed
    /// separately. String leaves only.
    Maskable,
}

impl BaseKind {
    /// Attribute bits written in node tags.
    pub fn bits(self) -> u8 {
        match self {
            BaseKind::Plain => 0,
            BaseKind::Hashable => 0x01,
            BaseKind::Maskable => 0x02,
        }
    }

    /// Inverse of [`Self::bits`]. Any other bit pattern is invalid in a
    /// section.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(BaseKind::Plain),
            0x01 => Some(BaseKind::Hashable),
            0x02 => Some(BaseKind::Maskable),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            BaseKind::Plain => "plain",
            BaseKind::Hashable => "hashable",
            BaseKind::Maskable => "maskable",
        }
    }
}

/// Proof-time disclosure format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Left out of the proof entirely.
    Redacted,
    /// Disclosed as the payload digest. Hashable leaves only.
    Hashed,
    /// Disclosed as the visible parts plus the hidden sub-commitment.
    /// Maskable leaves only.
    Masked,
}

impl Format {
    /// Attribute bits. Never written into sections.
    pub fn bits(self) -> u8 {
        match self {
            Format::Redacted => 0x04,
            Format::Hashed => 0x08,
            Format::Masked => 0x10,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Format::Redacted => "redacted",
            Format::Hashed => "hashed",
            Format::Masked => "masked",
        }
    }
}

// ---------------------------------------------------------------------------
// Leaf values
// ---------------------------------------------------------------------------

/// A scalar JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    /// String value.
    String(String),
    /// Number, kept as serde_json holds it so its text round-trips.
    Number(serde_json::Number),
    /// Boolean value.
    Boolean(bool),
    /// Null.
    Null,
}

impl LeafValue {
    /// Convert a scalar JSON value. Containers return `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(LeafValue::String(s.clone())),
            Value::Number(n) => Some(LeafValue::Number(n.clone())),
            Value::Bool(b) => Some(LeafValue::Boolean(*b)),
            Value::Null => Some(LeafValue::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert a JSON value that must be of `kind`.
    pub fn from_json_as(kind: LeafKind, value: &Value) -> Option<Self> {
        LeafValue::from_json(value).filter(|v| v.kind() == kind)
    }

    /// The value's kind.
    pub fn kind(&self) -> LeafKind {
        match self {
            LeafValue::String(_) => LeafKind::String,
            LeafValue::Number(_) => LeafKind::Number,
            LeafValue::Boolean(_) => LeafKind::Boolean,
            LeafValue::Null => LeafKind::Null,
        }
    }

    /// The string, for String values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeafValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Back to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            LeafValue::String(s) => Value::String(s.clone()),
            LeafValue::Number(n) => Value::Number(n.clone()),
            LeafValue::Boolean(b) => Value::Bool(*b),
            LeafValue::Null => Value::Null,
        }
    }

    /// Append the canonical payload encoding.
    pub fn encode(&self, w: &mut ByteWriter) {
        match self {
            LeafValue::String(s) => w.write_str(s),
            LeafValue::Number(n) => w.write_str(&n.to_string()),
            LeafValue::Boolean(b) => w.write_u8(u8::from(*b)),
            LeafValue::Null => {}
        }
    }

    /// The canonical payload bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Read a payload of `kind` from a node stream.
    pub fn decode(kind: LeafKind, r: &mut ByteReader<'_>, path: &NodePath) -> Result<Self, DecodeError> {
        let invalid = |reason: String| DecodeError::InvalidValue {
            path: path.render(),
            reason,
        };
        match kind {
            LeafKind::String => Ok(LeafValue::String(r.read_str()?.to_string())),
            LeafKind::Number => {
                let text = r.read_str()?;
                let n = text
                    .parse::<serde_json::Number>()
                    .map_err(|_| invalid(format!("{text:?} is not a JSON number")))?;
                Ok(LeafValue::Number(n))
            }
            LeafKind::Boolean => match r.read_u8()? {
                0 => Ok(LeafValue::Boolean(false)),
                1 => Ok(LeafValue::Boolean(true)),
                b => Err(invalid(format!("boolean byte {b}"))),
            },
            LeafKind::Null => Ok(LeafValue::Null),
        }
    }
}

/// A value that may only be known by its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Concealable<T> {
    /// The value itself.
    Clear(T),
    /// Only the digest, as read back from a proof.
    Digest(Hash32),
}

impl<T> Concealable<T> {
    /// The clear value, if known.
    pub fn clear(&self) -> Option<&T> {
        match self {
            Concealable::Clear(v) => Some(v),
            Concealable::Digest(_) => None,
        }
    }
}

impl Concealable<Vec<u8>> {
    fn as_inner(&self) -> Inner<'_> {
        match self {
            Concealable::Clear(bytes) => Inner::Clear(bytes),
            Concealable::Digest(d) => Inner::Digest(*d),
        }
    }
}

/// What is known about a leaf's value, shaped by its base kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafContent {
    /// Plain leaf.
    Plain(LeafValue),
    /// Hashable leaf.
    Hashable(Concealable<LeafValue>),
    /// Maskable string. `visible` is `[v0, r0, v1, r1, ..., vn]`, kept text
    /// alternating with the replacement shown for each hidden part.
    Maskable {
        /// Kept text and replacements.
        visible: Vec<String>,
        /// Hidden parts, or their sub-commitment.
        hidden: Concealable<Vec<String>>,
    },
}

impl LeafContent {
    /// The base kind this content encodes.
    pub fn base(&self) -> BaseKind {
        match self {
            LeafContent::Plain(_) => BaseKind::Plain,
            LeafContent::Hashable(_) => BaseKind::Hashable,
            LeafContent::Maskable { .. } => BaseKind::Maskable,
        }
    }

    /// Serialize into commitment payloads.
    pub fn payload(&self) -> LeafPayload {
        match self {
            LeafContent::Plain(v) => LeafPayload::Plain(v.to_payload()),
            LeafContent::Hashable(Concealable::Clear(v)) => {
                LeafPayload::Hashable(Concealable::Clear(v.to_payload()))
            }
            LeafContent::Hashable(Concealable::Digest(d)) => {
                LeafPayload::Hashable(Concealable::Digest(*d))
            }
            LeafContent::Maskable { visible, hidden } => LeafPayload::Maskable {
                visible: encode_parts(visible),
                hidden: match hidden {
                    Concealable::Clear(parts) => Concealable::Clear(encode_parts(parts)),
                    Concealable::Digest(d) => Concealable::Digest(*d),
                },
            },
        }
    }
}

/// `varint(count) || string*`.
pub(crate) fn encode_parts(parts: &[String]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_str_list(parts);
    w.into_bytes()
}

/// A leaf's finalized payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafPayload {
    /// Plain payload.
    Plain(Vec<u8>),
    /// Hashable payload, or its digest.
    Hashable(Concealable<Vec<u8>>),
    /// Maskable visible-list and hidden-list payloads.
    Maskable {
        /// Encoded visible list.
        visible: Vec<u8>,
        /// Encoded hidden list, or the hidden sub-commitment.
        hidden: Concealable<Vec<u8>>,
    },
}

impl LeafPayload {
    /// Borrow as merklizer input.
    pub fn material(&self) -> LeafMaterial<'_> {
        match self {
            LeafPayload::Plain(bytes) => LeafMaterial::Plain(bytes),
            LeafPayload::Hashable(inner) => LeafMaterial::Hashable(inner.as_inner()),
            LeafPayload::Maskable { visible, hidden } => LeafMaterial::Maskable {
                visible,
                hidden: hidden.as_inner(),
            },
        }
    }
}

/// Position and salts of a leaf read back from a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvenLeaf {
    /// Leaf index in the channel's Merkle tree.
    pub index: u32,
    /// Salts disclosed with the leaf.
    pub salts: LeafSalts,
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// A scalar node.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub(crate) kind: LeafKind,
    pub(crate) content: LeafContent,
    pub(crate) format: Option<Format>,
    pub(crate) channel: Option<ChannelId>,
    pub(crate) payload: Option<LeafPayload>,
    pub(crate) proven: Option<ProvenLeaf>,
}

impl Leaf {
    /// A fully disclosed Plain leaf with no channel.
    pub fn plain(value: LeafValue) -> Self {
        Self {
            kind: value.kind(),
            content: LeafContent::Plain(value),
            format: None,
            channel: None,
            payload: None,
            proven: None,
        }
    }

    pub(crate) fn with_content(kind: LeafKind, content: LeafContent, channel: ChannelId) -> Self {
        Self {
            kind,
            content,
            format: None,
            channel: Some(channel),
            payload: None,
            proven: None,
        }
    }

    /// Scalar kind.
    pub fn kind(&self) -> LeafKind {
        self.kind
    }

    /// Base kind.
    pub fn base(&self) -> BaseKind {
        self.content.base()
    }

    /// Proof-time format, if set.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Assigned channel.
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Known content.
    pub fn content(&self) -> &LeafContent {
        &self.content
    }

    /// Index and salts, on proof-reconstructed trees.
    pub fn proven(&self) -> Option<&ProvenLeaf> {
        self.proven.as_ref()
    }

    /// Payload frozen by the last finalize.
    pub fn payload(&self) -> Option<&LeafPayload> {
        self.payload.as_ref()
    }

    /// Type byte mixed into the leaf tag: `kind | base << 3`.
    pub fn type_byte(&self) -> u8 {
        self.kind.code() | (self.base().bits() << 3)
    }

    /// The full value, when it is known in clear.
    pub fn value(&self) -> Option<LeafValue> {
        match &self.content {
            LeafContent::Plain(v) => Some(v.clone()),
            LeafContent::Hashable(c) => c.clear().cloned(),
            LeafContent::Maskable { visible, hidden } => hidden
                .clear()
                .map(|h| LeafValue::String(mask::reconstruct(visible, h))),
        }
    }

    /// JSON as it would be disclosed under the leaf's format. `None` for
    /// Redacted leaves.
    pub fn disclosed_json(&self) -> Option<Value> {
        let format = self.format;
        if format == Some(Format::Redacted) {
            return None;
        }
        let json = match &self.content {
            LeafContent::Plain(v) => v.to_json(),
            LeafContent::Hashable(Concealable::Clear(v)) if format == Some(Format::Hashed) => {
                Value::String(value_digest(&v.to_payload()).to_hex())
            }
            LeafContent::Hashable(Concealable::Clear(v)) => v.to_json(),
            LeafContent::Hashable(Concealable::Digest(d)) => Value::String(d.to_hex()),
            LeafContent::Maskable {
                visible,
                hidden: Concealable::Clear(h),
            } if format != Some(Format::Masked) => Value::String(mask::reconstruct(visible, h)),
            LeafContent::Maskable { visible, .. } => Value::String(mask::render(visible)),
        };
        Some(json)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Object node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub(crate) members: BTreeMap<String, Node>,
    pub(crate) channels: BTreeSet<ChannelId>,
}

impl ObjectNode {
    /// Members in name order.
    pub fn members(&self) -> &BTreeMap<String, Node> {
        &self.members
    }
}

/// Array node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayNode {
    pub(crate) items: BTreeMap<u32, Node>,
    pub(crate) channels: BTreeSet<ChannelId>,
}

impl ArrayNode {
    /// Items in index order.
    pub fn items(&self) -> &BTreeMap<u32, Node> {
        &self.items
    }
}

/// A record tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Named children.
    Object(ObjectNode),
    /// Indexed children.
    Array(ArrayNode),
    /// Scalar.
    Leaf(Leaf),
}

impl Node {
    /// Build from a JSON document. Every scalar becomes a Plain leaf with no
    /// channel.
    pub fn from_json(value: &Value) -> Result<Self, PolicyError> {
        Self::from_json_at(value, &mut NodePath::root())
    }

    fn from_json_at(value: &Value, path: &mut NodePath) -> Result<Self, PolicyError> {
        let node = match value {
            Value::Object(map) => {
                let mut members = BTreeMap::new();
                for (name, child) in map {
                    if !Segment::is_valid_member(name) {
                        return Err(PolicyError::InvalidMemberName(name.clone()));
                    }
                    path.push(Segment::Member(name.clone()));
                    members.insert(name.clone(), Self::from_json_at(child, path)?);
                    path.pop();
                }
                Node::Object(ObjectNode {
                    members,
                    channels: BTreeSet::new(),
                })
            }
            Value::Array(entries) => {
                let mut items = BTreeMap::new();
                for (i, child) in entries.iter().enumerate() {
                    let index = u32::try_from(i).map_err(|_| {
                        PolicyError::InvalidPath(format!("array at {path:?} exceeds 32-bit indices", path = path.render()))
                    })?;
                    path.push(Segment::Index(index));
                    items.insert(index, Self::from_json_at(child, path)?);
                    path.pop();
                }
                Node::Array(ArrayNode {
                    items,
                    channels: BTreeSet::new(),
                })
            }
            Value::String(s) => Node::Leaf(Leaf::plain(LeafValue::String(s.clone()))),
            Value::Number(n) => Node::Leaf(Leaf::plain(LeafValue::Number(n.clone()))),
            Value::Bool(b) => Node::Leaf(Leaf::plain(LeafValue::Boolean(*b))),
            Value::Null => Node::Leaf(Leaf::plain(LeafValue::Null)),
        };
        Ok(node)
    }

    /// Node kind code.
    pub fn kind_code(&self) -> u8 {
        match self {
            Node::Array(_) => KIND_ARRAY,
            Node::Object(_) => KIND_OBJECT,
            Node::Leaf(leaf) => leaf.kind.code(),
        }
    }

    /// The leaf, if this is one.
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> Option<&mut Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Direct child by segment.
    pub fn child(&self, segment: &Segment) -> Option<&Node> {
        match (self, segment) {
            (Node::Object(obj), Segment::Member(name)) => obj.members.get(name),
            (Node::Array(arr), Segment::Index(i)) => arr.items.get(i),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut Node> {
        match (self, segment) {
            (Node::Object(obj), Segment::Member(name)) => obj.members.get_mut(name),
            (Node::Array(arr), Segment::Index(i)) => arr.items.get_mut(i),
            _ => None,
        }
    }

    /// Descendant by path.
    pub fn at(&self, path: &NodePath) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(self, |node, seg| node.child(seg))
    }

    pub(crate) fn at_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let mut node = self;
        for seg in path.segments() {
            node = node.child_mut(seg)?;
        }
        Some(node)
    }

    /// True if a leaf of `channel` lies at or below this node.
    ///
    /// Container sets are only current after finalize.
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        match self {
            Node::Object(obj) => obj.channels.contains(&channel),
            Node::Array(arr) => arr.channels.contains(&channel),
            Node::Leaf(leaf) => leaf.channel == Some(channel),
        }
    }

    /// Channels at or below this node, as of the last finalize.
    pub fn channels(&self) -> BTreeSet<ChannelId> {
        match self {
            Node::Object(obj) => obj.channels.clone(),
            Node::Array(arr) => arr.channels.clone(),
            Node::Leaf(leaf) => leaf.channel.into_iter().collect(),
        }
    }

    /// Number of direct children that carry `channel`.
    pub(crate) fn child_count_in(&self, channel: ChannelId) -> usize {
        match self {
            Node::Object(obj) => obj.members.values().filter(|c| c.has_channel(channel)).count(),
            Node::Array(arr) => arr.items.values().filter(|c| c.has_channel(channel)).count(),
            Node::Leaf(_) => 0,
        }
    }

    /// Recompute container channel sets bottom-up and return this node's.
    pub(crate) fn refresh_channels(&mut self) -> BTreeSet<ChannelId> {
        match self {
            Node::Object(obj) => {
                let mut set = BTreeSet::new();
                for child in obj.members.values_mut() {
                    set.extend(child.refresh_channels());
                }
                obj.channels = set.clone();
                set
            }
            Node::Array(arr) => {
                let mut set = BTreeSet::new();
                for child in arr.items.values_mut() {
                    set.extend(child.refresh_channels());
                }
                arr.channels = set.clone();
                set
            }
            Node::Leaf(leaf) => leaf.channel.into_iter().collect(),
        }
    }

    /// Fail on the first array whose indices are not exactly `0..n`.
    pub(crate) fn check_contiguous(&self, path: &mut NodePath) -> Result<(), DecodeError> {
        match self {
            Node::Object(obj) => {
                for (name, child) in &obj.members {
                    path.push(Segment::Member(name.clone()));
                    child.check_contiguous(path)?;
                    path.pop();
                }
            }
            Node::Array(arr) => {
                for (expected, (&index, child)) in arr.items.iter().enumerate() {
                    let expected = expected as u32;
                    if index != expected {
                        return Err(DecodeError::ArrayGap {
                            path: path.render(),
                            missing: expected,
                        });
                    }
                    path.push(Segment::Index(index));
                    child.check_contiguous(path)?;
                    path.pop();
                }
            }
            Node::Leaf(_) => {}
        }
        Ok(())
    }

    /// JSON rendering. With `disclosed`, leaves render under their formats:
    /// Redacted leaves disappear and arrays close up around them.
    pub fn to_json(&self, disclosed: bool) -> Option<Value> {
        match self {
            Node::Object(obj) => {
                let map = obj
                    .members
                    .iter()
                    .filter_map(|(name, child)| Some((name.clone(), child.to_json(disclosed)?)))
                    .collect();
                Some(Value::Object(map))
            }
            Node::Array(arr) => Some(Value::Array(
                arr.items
                    .values()
                    .filter_map(|child| child.to_json(disclosed))
                    .collect(),
            )),
            Node::Leaf(leaf) if disclosed => leaf.disclosed_json(),
            Node::Leaf(leaf) => Some(leaf.value().map_or_else(
                || leaf.disclosed_json().unwrap_or(Value::Null),
                |v| v.to_json(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Depth-first preorder walk yielding `(path, node)`.
///
/// With a channel filter, nodes that carry no leaf of that channel are
/// skipped together with their subtrees.
pub fn walk<'a, E, F>(root: &'a Node, channel: Option<ChannelId>, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&NodePath, &'a Node) -> Result<(), E>,
{
    walk_at(root, &mut NodePath::root(), channel, visit)
}

fn walk_at<'a, E, F>(
    node: &'a Node,
    path: &mut NodePath,
    channel: Option<ChannelId>,
    visit: &mut F,
) -> Result<(), E>
where
    F: FnMut(&NodePath, &'a Node) -> Result<(), E>,
{
    if let Some(id) = channel {
        if !node.has_channel(id) {
            return Ok(());
        }
    }
    visit(path, node)?;
    match node {
        Node::Object(obj) => {
            for (name, child) in &obj.members {
                path.push(Segment::Member(name.clone()));
                walk_at(child, path, channel, visit)?;
                path.pop();
            }
        }
        Node::Array(arr) => {
            for (&index, child) in &arr.items {
                path.push(Segment::Index(index));
                walk_at(child, path, channel, visit)?;
                path.pop();
            }
        }
        Node::Leaf(_) => {}
    }
    Ok(())
}

/// Visit every leaf at or below `node`, mutably.
pub(crate) fn for_each_leaf_mut<E, F>(node: &mut Node, path: &mut NodePath, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&NodePath, &mut Leaf) -> Result<(), E>,
{
    match node {
        Node::Object(obj) => {
            for (name, child) in obj.members.iter_mut() {
                path.push(Segment::Member(name.clone()));
                for_each_leaf_mut(child, path, visit)?;
                path.pop();
            }
        }
        Node::Array(arr) => {
            for (&index, child) in arr.items.iter_mut() {
                path.push(Segment::Index(index));
                for_each_leaf_mut(child, path, visit)?;
                path.pop();
            }
        }
        Node::Leaf(leaf) => visit(path, leaf)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf_paths(node: &Node, channel: Option<ChannelId>) -> Vec<String> {
        let mut out = Vec::new();
        walk::<(), _>(node, channel, &mut |path, n| {
            if n.as_leaf().is_some() {
                out.push(path.render());
            }
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn from_json_builds_plain_leaves() {
        let node = Node::from_json(&json!({"a": "x", "b": [1, true, null]})).unwrap();
        assert_eq!(node.kind_code(), KIND_OBJECT);
        assert_eq!(leaf_paths(&node, None), vec![".a", ".b[0]", ".b[1]", ".b[2]"]);

        let b1 = node
            .at(&[Segment::Member("b".into()), Segment::Index(1)].into_iter().collect())
            .and_then(Node::as_leaf)
            .unwrap();
        assert_eq!(b1.kind(), LeafKind::Boolean);
        assert_eq!(b1.base(), BaseKind::Plain);
        assert_eq!(b1.channel(), None);
        assert_eq!(b1.type_byte(), 4);
    }

    #[test]
    fn from_json_rejects_separator_member_names() {
        for doc in [json!({"a.b": 1}), json!({"x": {"list[0]": true}}), json!([{"]": null}])] {
            assert!(matches!(
                Node::from_json(&doc),
                Err(PolicyError::InvalidMemberName(_))
            ));
        }
    }

    #[test]
    fn to_json_inverts_from_json() {
        let doc = json!({"name": "Ada", "n": 1.5, "tags": ["x", {"deep": null}], "e": {}, "z": []});
        let node = Node::from_json(&doc).unwrap();
        assert_eq!(node.to_json(false), Some(doc.clone()));
        assert_eq!(node.to_json(true), Some(doc));
    }

    #[test]
    fn payload_encodings() {
        assert_eq!(LeafValue::String("hi".into()).to_payload(), vec![2, b'h', b'i']);
        assert_eq!(
            LeafValue::Number(serde_json::Number::from(42)).to_payload(),
            vec![2, b'4', b'2']
        );
        assert_eq!(LeafValue::Boolean(true).to_payload(), vec![1]);
        assert!(LeafValue::Null.to_payload().is_empty());
    }

    #[test]
    fn decode_rejects_bad_scalars() {
        let path = NodePath::root();
        let mut r = ByteReader::new(&[2]);
        assert!(matches!(
            LeafValue::decode(LeafKind::Boolean, &mut r, &path),
            Err(DecodeError::InvalidValue { .. })
        ));
        let bytes = [3, b'a', b'b', b'c'];
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            LeafValue::decode(LeafKind::Number, &mut r, &path),
            Err(DecodeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn walker_filters_by_channel() {
        let mut node = Node::from_json(&json!({"a": 1, "b": {"c": 2, "d": 3}})).unwrap();
        let mut i = 0u16;
        for_each_leaf_mut::<(), _>(&mut node, &mut NodePath::root(), &mut |_, leaf| {
            leaf.channel = Some(ChannelId(i % 2));
            i += 1;
            Ok(())
        })
        .unwrap();
        node.refresh_channels();
        assert_eq!(leaf_paths(&node, Some(ChannelId(0))), vec![".a", ".b.d"]);
        assert_eq!(leaf_paths(&node, Some(ChannelId(1))), vec![".b.c"]);
        assert!(leaf_paths(&node, Some(ChannelId(9))).is_empty());
        assert_eq!(node.child_count_in(ChannelId(1)), 1);
    }

    #[test]
    fn contiguity_check_reports_first_gap() {
        let mut items = BTreeMap::new();
        items.insert(0, Node::Leaf(Leaf::plain(LeafValue::Null)));
        items.insert(2, Node::Leaf(Leaf::plain(LeafValue::Null)));
        let node = Node::Array(ArrayNode {
            items,
            channels: BTreeSet::new(),
        });
        assert_eq!(
            node.check_contiguous(&mut NodePath::root()),
            Err(DecodeError::ArrayGap {
                path: String::new(),
                missing: 1
            })
        );
    }

    #[test]
    fn disclosed_json_follows_format() {
        let mut leaf = Leaf::plain(LeafValue::String("secret".into()));
        leaf.content = LeafContent::Hashable(Concealable::Clear(LeafValue::String("secret".into())));
        assert_eq!(leaf.disclosed_json(), Some(json!("secret")));
        leaf.format = Some(Format::Hashed);
        let digest = value_digest(&LeafValue::String("secret".into()).to_payload());
        assert_eq!(leaf.disclosed_json(), Some(json!(digest.to_hex())));
        leaf.format = Some(Format::Redacted);
        assert_eq!(leaf.disclosed_json(), None);
    }
}
