//! # Per-Channel Sections
//!
//! One channel's share of a record, as stored on the ledger:
//!
//! ```text
//! [pepper: 32 bytes, private channels only]
//! [varint dictSize] [dictSize x string]          member names
//! [node stream]                                  preorder
//!
//! container := [id?] [tag] [varint childCount]
//! leaf      := [id?] [tag] [payload]
//! tag       := nodeKind | (baseKindBits << 3)
//! ```
//!
//! `id` is a dictionary index under an object and the item index under an
//! array. The root has none. The dictionary lists the member names the
//! channel uses, most frequent first, ties broken by name.
//!
//! Sections only carry base-kind bits. Formats are proof-time choices and
//! are never stored.
//!
//! Importing is one call per channel, in any order. Containers merge by
//! identity across calls. A leaf identity may be defined only once. Array
//! contiguity is checked by the `finalize` that follows the last import.

use std::cmp::Reverse;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use recseal_core::{
    ByteReader, ByteWriter, ChannelId, DecodeError, NodePath, PolicyError, RecordError, Segment,
};
use recseal_crypto::salt::PEPPER_LEN;
use recseal_crypto::Pepper;

use crate::mask;
use crate::node::{
    walk, ArrayNode, BaseKind, Concealable, Leaf, LeafContent, LeafKind, LeafValue, Node, ObjectNode,
    KIND_ARRAY, KIND_OBJECT,
};
use crate::tree::RecordTree;

/// Nesting limit for decoded node streams.
const MAX_DEPTH: usize = 256;

const KIND_MASK: u8 = 0x07;

impl RecordTree {
    /// Encode one channel's section.
    pub fn export_section(&self, id: ChannelId) -> Result<Vec<u8>, RecordError> {
        if !self.finalized {
            return Err(PolicyError::NotFinalized.into());
        }
        let channel = self.channels.get(id)?;

        let mut nodes: Vec<(NodePath, &Node)> = Vec::new();
        if let Some(root) = &self.root {
            walk::<PolicyError, _>(root, Some(id), &mut |path, node| {
                nodes.push((path.clone(), node));
                Ok(())
            })?;
        }
        let dictionary = build_dictionary(&nodes);
        let positions: BTreeMap<&str, u64> = dictionary
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i as u64))
            .collect();

        let mut w = ByteWriter::new();
        if channel.is_private() {
            let pepper = channel.pepper().ok_or(PolicyError::MissingPepper(id))?;
            w.write_raw(pepper.as_bytes());
        }
        w.write_str_list(&dictionary);
        for (path, node) in &nodes {
            match path.last() {
                Some(Segment::Member(name)) => {
                    let position = positions
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| PolicyError::PathNotFound(path.render()))?;
                    w.write_varint(position);
                }
                Some(Segment::Index(i)) => w.write_varint(u64::from(*i)),
                None => {}
            }
            match node {
                Node::Object(_) | Node::Array(_) => {
                    w.write_u8(node.kind_code());
                    w.write_varint(node.child_count_in(id) as u64);
                }
                Node::Leaf(leaf) => {
                    w.write_u8(leaf.type_byte());
                    encode_leaf(&mut w, leaf, path)?;
                }
            }
        }

        tracing::debug!(
            channel = %id,
            nodes = nodes.len(),
            names = dictionary.len(),
            bytes = w.len(),
            "exported channel section"
        );
        Ok(w.into_bytes())
    }

    /// Merge one channel's section into this tree.
    ///
    /// The channel must already be registered. Call [`RecordTree::finalize`]
    /// once every section is in.
    pub fn import_section(&mut self, id: ChannelId, data: &[u8]) -> Result<(), RecordError> {
        if self.from_proof {
            return Err(PolicyError::ProofTreeLocked {
                path: String::new(),
            }
            .into());
        }
        let channel = self.channels.get(id)?;

        let mut r = ByteReader::new(data);
        let pepper = if channel.is_private() {
            let pepper = Pepper::from_bytes(r.read_array::<PEPPER_LEN>()?);
            if channel.pepper().is_some_and(|known| *known != pepper) {
                return Err(DecodeError::PepperConflict(id).into());
            }
            Some(pepper)
        } else {
            None
        };
        let dictionary = r.read_str_list()?;
        if let Some(name) = dictionary.iter().find(|n| !Segment::is_valid_member(n)) {
            return Err(DecodeError::InvalidMemberName(name.clone()).into());
        }
        let incoming = if r.is_at_end() {
            None
        } else {
            Some(decode_node(&mut r, &dictionary, id, &mut NodePath::root(), 0)?)
        };
        r.finish()?;

        if let Some(node) = incoming {
            let merged = match self.root.clone() {
                Some(mut existing) => {
                    merge(&mut existing, node, &mut NodePath::root())?;
                    existing
                }
                None => node,
            };
            self.root = Some(merged);
        }
        if let Some(pepper) = pepper {
            self.channels.get_mut(id)?.set_pepper(pepper);
        }
        self.finalized = false;

        tracing::debug!(channel = %id, bytes = data.len(), "imported channel section");
        Ok(())
    }
}

/// Member names in descending frequency, ties by name.
fn build_dictionary(nodes: &[(NodePath, &Node)]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (path, _) in nodes {
        if let Some(Segment::Member(name)) = path.last() {
            *counts.entry(name.as_str()).or_default() += 1;
        }
    }
    let mut names: Vec<(&str, usize)> = counts.into_iter().collect();
    names.sort_by_key(|&(name, count)| (Reverse(count), name));
    names.into_iter().map(|(name, _)| name.to_string()).collect()
}

fn encode_leaf(w: &mut ByteWriter, leaf: &Leaf, path: &NodePath) -> Result<(), PolicyError> {
    match leaf.content() {
        LeafContent::Plain(v) | LeafContent::Hashable(Concealable::Clear(v)) => v.encode(w),
        LeafContent::Maskable {
            visible,
            hidden: Concealable::Clear(hidden),
        } => {
            w.write_str_list(visible);
            w.write_str_list(hidden);
        }
        LeafContent::Hashable(Concealable::Digest(_)) | LeafContent::Maskable { .. } => {
            return Err(PolicyError::ConcealedValue { path: path.render() });
        }
    }
    Ok(())
}

fn decode_node(
    r: &mut ByteReader<'_>,
    dictionary: &[String],
    channel: ChannelId,
    path: &mut NodePath,
    depth: usize,
) -> Result<Node, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::InvalidValue {
            path: path.render(),
            reason: format!("nesting deeper than {MAX_DEPTH}"),
        });
    }
    let tag = r.read_u8()?;
    let kind = tag & KIND_MASK;
    let attrs = tag >> 3;

    if kind == KIND_OBJECT || kind == KIND_ARRAY {
        if attrs != 0 {
            return Err(DecodeError::InvalidAttributes {
                path: path.render(),
                bits: attrs,
            });
        }
        let count = r.read_varint()?;
        if kind == KIND_OBJECT {
            let mut members = BTreeMap::new();
            for _ in 0..count {
                let index = r.read_varint()?;
                let name = usize::try_from(index)
                    .ok()
                    .and_then(|i| dictionary.get(i))
                    .ok_or(DecodeError::DictionaryIndex {
                        index,
                        size: dictionary.len(),
                    })?;
                path.push(Segment::Member(name.clone()));
                let child = decode_node(r, dictionary, channel, path, depth + 1)?;
                if members.insert(name.clone(), child).is_some() {
                    return Err(DecodeError::DuplicateNode { path: path.render() });
                }
                path.pop();
            }
            return Ok(Node::Object(ObjectNode {
                members,
                channels: BTreeSet::new(),
            }));
        }
        let mut items = BTreeMap::new();
        for _ in 0..count {
            let index = r.read_varint_u32()?;
            path.push(Segment::Index(index));
            let child = decode_node(r, dictionary, channel, path, depth + 1)?;
            if items.insert(index, child).is_some() {
                return Err(DecodeError::DuplicateNode { path: path.render() });
            }
            path.pop();
        }
        return Ok(Node::Array(ArrayNode {
            items,
            channels: BTreeSet::new(),
        }));
    }

    let leaf_kind = LeafKind::from_code(kind).ok_or(DecodeError::UnknownNodeKind(kind))?;
    let base = BaseKind::from_bits(attrs)
        .filter(|b| *b != BaseKind::Maskable || leaf_kind == LeafKind::String)
        .ok_or_else(|| DecodeError::InvalidAttributes {
            path: path.render(),
            bits: attrs,
        })?;
    let content = match base {
        BaseKind::Plain => LeafContent::Plain(LeafValue::decode(leaf_kind, r, path)?),
        BaseKind::Hashable => {
            LeafContent::Hashable(Concealable::Clear(LeafValue::decode(leaf_kind, r, path)?))
        }
        BaseKind::Maskable => {
            let visible = r.read_str_list()?;
            let hidden = r.read_str_list()?;
            if !mask::is_well_formed(&visible, hidden.len()) {
                return Err(DecodeError::InvalidValue {
                    path: path.render(),
                    reason: format!(
                        "{} visible parts do not fit {} hidden parts",
                        visible.len(),
                        hidden.len()
                    ),
                });
            }
            LeafContent::Maskable {
                visible,
                hidden: Concealable::Clear(hidden),
            }
        }
    };
    Ok(Node::Leaf(Leaf::with_content(leaf_kind, content, channel)))
}

/// Merge a decoded subtree into the existing one.
fn merge(into: &mut Node, from: Node, path: &mut NodePath) -> Result<(), DecodeError> {
    match (into, from) {
        (Node::Object(into), Node::Object(from)) => {
            for (name, child) in from.members {
                path.push(Segment::Member(name.clone()));
                match into.members.entry(name) {
                    Entry::Occupied(mut slot) => merge(slot.get_mut(), child, path)?,
                    Entry::Vacant(slot) => {
                        slot.insert(child);
                    }
                }
                path.pop();
            }
            Ok(())
        }
        (Node::Array(into), Node::Array(from)) => {
            for (index, child) in from.items {
                path.push(Segment::Index(index));
                match into.items.entry(index) {
                    Entry::Occupied(mut slot) => merge(slot.get_mut(), child, path)?,
                    Entry::Vacant(slot) => {
                        slot.insert(child);
                    }
                }
                path.pop();
            }
            Ok(())
        }
        (Node::Leaf(_), Node::Leaf(_)) => Err(DecodeError::DuplicateNode { path: path.render() }),
        _ => Err(DecodeError::KindConflict { path: path.render() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Visibility;
    use crate::mask::MaskSpec;
    use crate::node::Format;
    use serde_json::{json, Value};

    fn two_channel_tree(doc: Value) -> (RecordTree, ChannelId, ChannelId) {
        let mut tree = RecordTree::from_json(&doc).unwrap();
        let public = tree.declare_channel("public", Visibility::Public).unwrap();
        let private = tree.declare_channel("private", Visibility::Private).unwrap();
        tree.set_channel("this", public).unwrap();
        (tree, public, private)
    }

    fn reimport(tree: &RecordTree, order: &[ChannelId]) -> Result<RecordTree, RecordError> {
        let mut out = RecordTree::new();
        for channel in tree.channels().iter() {
            out.register_channel(channel.id(), channel.name(), channel.visibility())?;
        }
        for &id in order {
            out.import_section(id, &tree.export_section(id)?)?;
        }
        out.finalize()?;
        Ok(out)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn round_trip_in_either_order() {
        let doc = json!({
            "name": "Ada",
            "contact": {"email": "ada@example.com", "phone": "555"},
            "items": [{"sku": "a", "qty": 2}, {"sku": "b", "qty": 1.5}],
            "flag": false,
            "none": null
        });
        let (mut tree, _, private) = two_channel_tree(doc.clone());
        tree.set_channel("this.contact, this.items[1].qty", private).unwrap();
        tree.set_hashable("this.contact.phone").unwrap();
        tree.set_maskable(
            "this.contact.email",
            &MaskSpec::pattern("^(.)(.*?)(@.*)$", "$1***$3"),
        )
        .unwrap();
        tree.finalize().unwrap();

        for order in [[ChannelId(0), ChannelId(1)], [ChannelId(1), ChannelId(0)]] {
            let back = reimport(&tree, &order).unwrap();
            assert_eq!(back.to_json(), doc);
            assert_eq!(back.channel_root(private).unwrap(), tree.channel_root(private).unwrap());
            assert_eq!(back.leaf("this.contact.phone").unwrap().base(), BaseKind::Hashable);
            assert_eq!(back.leaf("this.contact.email").unwrap().base(), BaseKind::Maskable);
        }
    }

    #[test]
    fn formats_are_not_stored() {
        let (mut tree, public, _) = two_channel_tree(json!({"a": 1}));
        tree.finalize().unwrap();
        tree.set_redacted("this.a").unwrap();
        let back = reimport(&tree, &[public]).unwrap();
        assert_eq!(back.leaf("this.a").unwrap().format(), None);
        assert_ne!(tree.leaf("this.a").unwrap().format(), back.leaf("this.a").unwrap().format());
        assert_eq!(tree.leaf("this.a").unwrap().format(), Some(Format::Redacted));
    }

    #[test]
    fn dictionary_orders_by_frequency_then_name() {
        let (mut tree, public, _) =
            two_channel_tree(json!({"b": [{"x": 1}, {"x": 2}], "a": {"x": 3, "y": 4}}));
        tree.finalize().unwrap();
        let bytes = tree.export_section(public).unwrap();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_str_list().unwrap(), vec!["x", "a", "b", "y"]);
        // Root object with two members.
        assert_eq!(r.read_u8().unwrap(), KIND_OBJECT);
        assert_eq!(r.read_varint().unwrap(), 2);
    }

    #[test]
    fn channels_are_isolated() {
        let (mut tree, public, private) =
            two_channel_tree(json!({"open": "visible-text", "secret": "hidden-text"}));
        tree.set_channel("this.secret", private).unwrap();
        tree.finalize().unwrap();

        let public_bytes = tree.export_section(public).unwrap();
        let private_bytes = tree.export_section(private).unwrap();
        assert!(contains(&public_bytes, b"visible-text"));
        assert!(!contains(&public_bytes, b"hidden-text"));
        assert!(!contains(&public_bytes, b"secret"));
        assert!(contains(&private_bytes, b"hidden-text"));
        assert!(!contains(&private_bytes, b"visible-text"));
        assert_eq!(&private_bytes[..PEPPER_LEN], tree.channels().get(private).unwrap().pepper().unwrap().as_bytes());
    }

    #[test]
    fn empty_containers_do_not_survive() {
        let (mut tree, public, _) = two_channel_tree(json!({"a": {}, "b": [], "c": 1}));
        tree.finalize().unwrap();
        let back = reimport(&tree, &[public]).unwrap();
        assert_eq!(back.to_json(), json!({"c": 1}));
    }

    #[test]
    fn importing_twice_is_a_duplicate() {
        let (mut tree, public, _) = two_channel_tree(json!({"a": 1}));
        tree.finalize().unwrap();
        let bytes = tree.export_section(public).unwrap();
        let mut back = RecordTree::new();
        back.register_channel(public, "public", Visibility::Public).unwrap();
        back.import_section(public, &bytes).unwrap();
        assert!(matches!(
            back.import_section(public, &bytes),
            Err(RecordError::Decode(DecodeError::DuplicateNode { ref path })) if path == ".a"
        ));
    }

    #[test]
    fn missing_channel_leaves_an_array_gap() {
        let (mut tree, public, private) = two_channel_tree(json!({"list": ["p", "q"]}));
        tree.set_channel("this.list[0]", private).unwrap();
        tree.finalize().unwrap();
        let err = reimport(&tree, &[public]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Decode(DecodeError::ArrayGap { ref path, missing: 0 }) if path == ".list"
        ));
    }

    fn import_raw(bytes: &[u8]) -> Result<(), RecordError> {
        let mut tree = RecordTree::new();
        tree.register_channel(ChannelId(0), "c", Visibility::Public)?;
        tree.import_section(ChannelId(0), bytes)
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(
            import_raw(&[0x00, 0x06]),
            Err(RecordError::Decode(DecodeError::UnknownNodeKind(6)))
        ));
        let redacted_string = LeafKind::String.code() | (Format::Redacted.bits() << 3);
        assert!(matches!(
            import_raw(&[0x00, redacted_string, 0x00]),
            Err(RecordError::Decode(DecodeError::InvalidAttributes { bits: 0x04, .. }))
        ));
        let maskable_number = LeafKind::Number.code() | (BaseKind::Maskable.bits() << 3);
        assert!(matches!(
            import_raw(&[0x00, maskable_number]),
            Err(RecordError::Decode(DecodeError::InvalidAttributes { bits: 0x02, .. }))
        ));
        assert!(matches!(
            import_raw(&[0x00, KIND_OBJECT, 0x01, 0x05]),
            Err(RecordError::Decode(DecodeError::DictionaryIndex { index: 5, size: 0 }))
        ));
        assert!(matches!(
            import_raw(&[0x00, 0x05, 0xff]),
            Err(RecordError::Decode(DecodeError::TrailingBytes { offset: 2, remaining: 1 }))
        ));
        assert!(matches!(
            import_raw(&[0x00, 0x02, 0x05, b'a']),
            Err(RecordError::Decode(DecodeError::UnexpectedEof { .. }))
        ));
        assert!(matches!(
            import_raw(&[0x00, 0x04, 0x07]),
            Err(RecordError::Decode(DecodeError::InvalidValue { .. }))
        ));
        assert!(matches!(
            import_raw(&[0x01, 0x03, b'a', b'.', b'b', KIND_OBJECT, 0x01, 0x00, 0x05]),
            Err(RecordError::Decode(DecodeError::InvalidMemberName(ref name))) if name == "a.b"
        ));
    }

    #[test]
    fn kind_conflicts_are_detected() {
        let mut tree = RecordTree::new();
        tree.register_channel(ChannelId(0), "a", Visibility::Public).unwrap();
        tree.register_channel(ChannelId(1), "b", Visibility::Public).unwrap();
        // Root object in one section, root array in the other.
        tree.import_section(ChannelId(0), &[0x00, KIND_OBJECT, 0x00]).unwrap();
        assert!(matches!(
            tree.import_section(ChannelId(1), &[0x00, KIND_ARRAY, 0x00]),
            Err(RecordError::Decode(DecodeError::KindConflict { .. }))
        ));
    }

    #[test]
    fn pepper_conflict_is_detected() {
        let (mut tree, _, private) = two_channel_tree(json!({"s": "x"}));
        tree.set_channel("this.s", private).unwrap();
        tree.set_pepper(private, Pepper::from_bytes([1; 32])).unwrap();
        tree.finalize().unwrap();
        let bytes = tree.export_section(private).unwrap();

        let mut other = RecordTree::new();
        other.register_channel(private, "private", Visibility::Private).unwrap();
        other.set_pepper(private, Pepper::from_bytes([2; 32])).unwrap();
        assert!(matches!(
            other.import_section(private, &bytes),
            Err(RecordError::Decode(DecodeError::PepperConflict(_)))
        ));
    }

    #[test]
    fn export_requires_finalize() {
        let (tree, public, _) = two_channel_tree(json!({"a": 1}));
        assert!(matches!(
            tree.export_section(public),
            Err(RecordError::Policy(PolicyError::NotFinalized))
        ));
    }
}
