//! # Merkle Tree
//!
//! A fixed binary hash tree over 32-byte leaf hashes.
//!
//! ## Shape
//!
//! - Internal node: `SHA256(0x01 || left || right)`.
//! - Padding: an odd trailing node at any level is promoted unchanged to the
//!   next level. Full and sparse builds share this rule.
//! - The empty tree's root is 32 zero bytes; a single leaf is its own root.
//!
//! ## Batch Witnesses
//!
//! [`MerkleTree::witnesses`] takes the set of leaf positions a verifier
//! *will* have and returns the hashes of the topmost nodes whose whole leaf
//! range is unknown, ordered bottom-up by level and left-to-right within a
//! level. That is the smallest set of hashes that, together with the known
//! leaves, determines the root. [`MerkleTree::from_sparse`] walks the same
//! slots in the same order to put the witnesses back.
//!
//! Slots are found from the known positions upward, so a sparse build costs
//! `O(known * depth)` whatever the claimed leaf count. Only known hashes are
//! stored; a sparse tree can still serve witnesses for any subset of its own
//! known positions (re-redaction of an already-open proof).

use std::collections::{BTreeMap, BTreeSet};

use recseal_core::{Hash32, MerkleError};

use crate::sha256::node_hash;

/// Largest leaf count a tree accepts.
pub const MAX_LEAVES: usize = 1 << 24;

/// Binary Merkle tree, possibly sparse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// Width of each level, leaves first. The last level has width one
    /// unless the tree is empty.
    widths: Vec<usize>,
    /// Known hashes of each level by index.
    levels: Vec<BTreeMap<usize, Hash32>>,
}

/// `(level, index)` address of a node.
type Slot = (usize, usize);

impl MerkleTree {
    /// Build a complete tree from every leaf.
    pub fn from_leaves(leaves: Vec<Hash32>) -> Self {
        let widths = level_widths(leaves.len());
        let base = leaves.into_iter().enumerate().collect();
        let mut tree = Self {
            widths,
            levels: vec![base],
        };
        tree.fill_upward(std::iter::empty());
        tree
    }

    /// Build a sparse tree from the known leaves and the witnesses for every
    /// remaining position, in [`MerkleTree::witnesses`] order.
    pub fn from_sparse(
        leaf_count: usize,
        known: &BTreeMap<usize, Hash32>,
        witnesses: &[Hash32],
    ) -> Result<Self, MerkleError> {
        if leaf_count > MAX_LEAVES {
            return Err(MerkleError::TooManyLeaves(leaf_count));
        }
        if let Some((&position, _)) = known.range(leaf_count..).next() {
            return Err(MerkleError::PositionOutOfRange {
                position,
                leaf_count,
            });
        }
        let widths = level_widths(leaf_count);
        let positions: BTreeSet<usize> = known.keys().copied().collect();
        let slots = witness_slots(&widths, &positions);
        if slots.len() != witnesses.len() {
            return Err(MerkleError::WitnessCount {
                expected: slots.len(),
                actual: witnesses.len(),
            });
        }

        let mut tree = Self {
            widths,
            levels: vec![known.clone()],
        };
        tree.fill_upward(slots.into_iter().zip(witnesses.iter().copied()));

        if leaf_count > 0 && tree.root_hash().is_none() {
            let top = tree.widths.len() - 1;
            return Err(MerkleError::MissingNode {
                level: top,
                index: 0,
            });
        }
        Ok(tree)
    }

    /// Compute every level above the leaves, dropping injected hashes into
    /// their slots as each level is reached. Injections must be ordered by
    /// level.
    fn fill_upward<I>(&mut self, injected: I)
    where
        I: Iterator<Item = (Slot, Hash32)>,
    {
        let mut injected = injected.peekable();
        for level in 0..self.widths.len() {
            while let Some(&((l, i), h)) = injected.peek() {
                if l != level {
                    break;
                }
                self.levels[level].insert(i, h);
                injected.next();
            }
            if level + 1 == self.widths.len() {
                break;
            }
            let width = self.widths[level];
            let current = &self.levels[level];
            let parents: BTreeSet<usize> = current.keys().map(|i| i / 2).collect();
            let mut next = BTreeMap::new();
            for p in parents {
                let (left, right) = (2 * p, 2 * p + 1);
                let hash = if right >= width {
                    current.get(&left).copied()
                } else {
                    match (current.get(&left), current.get(&right)) {
                        (Some(l), Some(r)) => Some(node_hash(l, r)),
                        _ => None,
                    }
                };
                if let Some(hash) = hash {
                    next.insert(p, hash);
                }
            }
            self.levels.push(next);
        }
    }

    fn root_hash(&self) -> Option<Hash32> {
        let top = self.widths.len() - 1;
        self.levels.get(top).and_then(|nodes| nodes.get(&0).copied())
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.widths[0]
    }

    /// The root hash. All-zero for the empty tree.
    pub fn root(&self) -> Hash32 {
        self.root_hash().unwrap_or(Hash32::ZERO)
    }

    /// The leaf hash at `position`, if known.
    pub fn leaf(&self, position: usize) -> Option<Hash32> {
        self.levels[0].get(&position).copied()
    }

    /// Minimal ordered witnesses for a verifier holding exactly the `known`
    /// positions.
    pub fn witnesses(&self, known: &BTreeSet<usize>) -> Result<Vec<Hash32>, MerkleError> {
        let leaf_count = self.leaf_count();
        if let Some(&position) = known.range(leaf_count..).next() {
            return Err(MerkleError::PositionOutOfRange {
                position,
                leaf_count,
            });
        }
        witness_slots(&self.widths, known)
            .into_iter()
            .map(|(level, index)| {
                self.levels[level]
                    .get(&index)
                    .copied()
                    .ok_or(MerkleError::MissingNode { level, index })
            })
            .collect()
    }
}

/// Width of every level for `leaf_count` leaves.
fn level_widths(leaf_count: usize) -> Vec<usize> {
    let mut widths = vec![leaf_count];
    let mut width = leaf_count;
    while width > 1 {
        width = width.div_ceil(2);
        widths.push(width);
    }
    widths
}

/// Slots of the topmost fully-unknown nodes, bottom-up then left-to-right.
///
/// A node needs a witness when none of its leaves is known but its
/// parent's range holds a known leaf, so every slot is the sibling of a
/// node on a known leaf's path to the root.
fn witness_slots(widths: &[usize], known: &BTreeSet<usize>) -> Vec<Slot> {
    let top = widths.len() - 1;
    if widths[0] == 0 {
        return Vec::new();
    }
    if known.is_empty() {
        return vec![(top, 0)];
    }

    let mut slots = Vec::new();
    let mut current = known.clone();
    for (level, &width) in widths.iter().enumerate().take(top) {
        let parents: BTreeSet<usize> = current.iter().map(|i| i / 2).collect();
        for &p in &parents {
            for child in [2 * p, 2 * p + 1] {
                if child < width && !current.contains(&child) {
                    slots.push((level, child));
                }
            }
        }
        current = parents;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256::sha256;

    fn leaves(n: usize) -> Vec<Hash32> {
        (0..n).map(|i| sha256(format!("leaf-{i}").as_bytes())).collect()
    }

    fn except(n: usize, unknown: &[usize]) -> BTreeSet<usize> {
        (0..n).filter(|i| !unknown.contains(i)).collect()
    }

    fn known_leaves(all: &[Hash32], known: &BTreeSet<usize>) -> BTreeMap<usize, Hash32> {
        known.iter().map(|&i| (i, all[i])).collect()
    }

    /// Slots found top-down over a dense unknown mask.
    fn dense_slots(n: usize, known: &BTreeSet<usize>) -> Vec<Slot> {
        let mut masks: Vec<Vec<bool>> = vec![(0..n).map(|i| !known.contains(&i)).collect()];
        while masks[masks.len() - 1].len() > 1 {
            let next = masks[masks.len() - 1]
                .chunks(2)
                .map(|pair| pair.iter().all(|&u| u))
                .collect();
            masks.push(next);
        }
        let top = masks.len() - 1;
        let mut slots = Vec::new();
        for (level, mask) in masks.iter().enumerate() {
            for (index, &unknown) in mask.iter().enumerate() {
                if unknown && !(level < top && masks[level + 1][index / 2]) {
                    slots.push((level, index));
                }
            }
        }
        slots
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let tree = MerkleTree::from_leaves(Vec::new());
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.root(), Hash32::ZERO);
        assert_eq!(tree.witnesses(&BTreeSet::new()).unwrap(), Vec::new());
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaves(1);
        assert_eq!(MerkleTree::from_leaves(l.clone()).root(), l[0]);
    }

    #[test]
    fn three_leaves_promote_the_odd_node() {
        let l = leaves(3);
        let expected = node_hash(&node_hash(&l[0], &l[1]), &l[2]);
        assert_eq!(MerkleTree::from_leaves(l).root(), expected);
    }

    #[test]
    fn five_leaves_shape() {
        let l = leaves(5);
        let left = node_hash(&node_hash(&l[0], &l[1]), &node_hash(&l[2], &l[3]));
        let expected = node_hash(&left, &l[4]);
        assert_eq!(MerkleTree::from_leaves(l).root(), expected);
    }

    #[test]
    fn witnesses_for_one_unknown_leaf_are_a_single_leaf() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(l.clone());
        assert_eq!(tree.witnesses(&except(4, &[2])).unwrap(), vec![l[2]]);
    }

    #[test]
    fn witnesses_merge_sibling_unknowns_into_parent() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(l.clone());
        assert_eq!(
            tree.witnesses(&except(4, &[2, 3])).unwrap(),
            vec![node_hash(&l[2], &l[3])]
        );
    }

    #[test]
    fn nothing_known_needs_only_the_root() {
        let tree = MerkleTree::from_leaves(leaves(6));
        assert_eq!(tree.witnesses(&BTreeSet::new()).unwrap(), vec![tree.root()]);
    }

    #[test]
    fn witnesses_reject_out_of_range_positions() {
        let tree = MerkleTree::from_leaves(leaves(3));
        let known: BTreeSet<usize> = [0, 3].into_iter().collect();
        assert_eq!(
            tree.witnesses(&known),
            Err(MerkleError::PositionOutOfRange {
                position: 3,
                leaf_count: 3
            })
        );
    }

    #[test]
    fn slots_from_known_positions_match_the_dense_walk() {
        for n in 1..=9usize {
            let widths = level_widths(n);
            for mask in 0u32..(1 << n) {
                let known: BTreeSet<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
                assert_eq!(
                    witness_slots(&widths, &known),
                    dense_slots(n, &known),
                    "n={n} mask={mask:b}"
                );
            }
        }
    }

    #[test]
    fn sparse_build_matches_full_build_for_every_subset() {
        for n in 1..=7usize {
            let l = leaves(n);
            let full = MerkleTree::from_leaves(l.clone());
            for mask in 0u32..(1 << n) {
                let known: BTreeSet<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
                let witnesses = full.witnesses(&known).unwrap();
                let sparse =
                    MerkleTree::from_sparse(n, &known_leaves(&l, &known), &witnesses).unwrap();
                assert_eq!(sparse.root(), full.root(), "n={n} mask={mask:b}");
            }
        }
    }

    #[test]
    fn sparse_tree_serves_witnesses_for_subsets() {
        let n = 7;
        let l = leaves(n);
        let full = MerkleTree::from_leaves(l.clone());
        let first = except(n, &[1, 4]);
        let sparse = MerkleTree::from_sparse(
            n,
            &known_leaves(&l, &first),
            &full.witnesses(&first).unwrap(),
        )
        .unwrap();

        let narrower = except(n, &[0, 1, 4, 5, 6]);
        let derived = sparse.witnesses(&narrower).unwrap();
        assert_eq!(derived, full.witnesses(&narrower).unwrap());

        let again = MerkleTree::from_sparse(n, &known_leaves(&l, &narrower), &derived).unwrap();
        assert_eq!(again.root(), full.root());
    }

    #[test]
    fn sparse_tree_cannot_reveal_more() {
        let n = 4;
        let l = leaves(n);
        let full = MerkleTree::from_leaves(l.clone());
        let known = except(n, &[2, 3]);
        let sparse = MerkleTree::from_sparse(
            n,
            &known_leaves(&l, &known),
            &full.witnesses(&known).unwrap(),
        )
        .unwrap();
        assert_eq!(
            sparse.witnesses(&except(n, &[3])),
            Err(MerkleError::MissingNode { level: 0, index: 3 })
        );
    }

    #[test]
    fn wrong_witness_count_is_rejected() {
        let l = leaves(4);
        let known = except(4, &[0]);
        let err = MerkleTree::from_sparse(4, &known_leaves(&l, &known), &[]).unwrap_err();
        assert_eq!(
            err,
            MerkleError::WitnessCount {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn known_leaf_out_of_range_is_rejected() {
        let mut known = BTreeMap::new();
        known.insert(5, Hash32::ZERO);
        assert!(matches!(
            MerkleTree::from_sparse(2, &known, &[]),
            Err(MerkleError::PositionOutOfRange { position: 5, .. })
        ));
    }

    #[test]
    fn leaf_count_is_capped() {
        assert_eq!(
            MerkleTree::from_sparse(MAX_LEAVES + 1, &BTreeMap::new(), &[Hash32::ZERO]),
            Err(MerkleError::TooManyLeaves(MAX_LEAVES + 1))
        );
    }

    #[test]
    fn large_claimed_leaf_count_stays_sparse() {
        // One known leaf under the largest tree: only its path is walked.
        let leaf = sha256(b"only");
        let known: BTreeMap<usize, Hash32> = [(MAX_LEAVES - 1, leaf)].into();
        let depth = level_widths(MAX_LEAVES).len() - 1;
        assert_eq!(
            MerkleTree::from_sparse(MAX_LEAVES, &known, &[]),
            Err(MerkleError::WitnessCount {
                expected: depth,
                actual: 0
            })
        );

        let witnesses = vec![sha256(b"w"); depth];
        let tree = MerkleTree::from_sparse(MAX_LEAVES, &known, &witnesses).unwrap();
        assert_eq!(tree.leaf_count(), MAX_LEAVES);
        assert_eq!(tree.leaf(MAX_LEAVES - 1), Some(leaf));
        assert_ne!(tree.root(), Hash32::ZERO);
    }

    #[test]
    fn tampered_witness_changes_root() {
        let l = leaves(5);
        let full = MerkleTree::from_leaves(l.clone());
        let known = except(5, &[4]);
        let mut witnesses = full.witnesses(&known).unwrap();
        witnesses[0] = sha256(b"forged");
        let sparse = MerkleTree::from_sparse(5, &known_leaves(&l, &known), &witnesses).unwrap();
        assert_ne!(sparse.root(), full.root());
    }
}
