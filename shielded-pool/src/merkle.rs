//! Append-only, fixed-depth Merkle tree of note commitments.
//!
//! Nodes live in an arena indexed by `(level, position)`. Level 0 holds the leaves;
//! a level only stores the nodes that cover at least one leaf, everything to the
//! right of them is an empty subtree whose hash is precomputed per level.
//!
//! Appending a leaf rehashes exactly one node per level, so the root is maintained
//! in O(depth) per insert. Two trees fed the same ordered leaves have identical roots.

use crate::constants::MAX_TREE_DEPTH;
use crate::hash::hash2;
use ark_bn254::Fr;
use ark_std::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree depth must be in 1..={max}, got {got}")]
    InvalidDepth { got: u8, max: u8 },

    #[error("accumulator is full ({capacity} leaves)")]
    CapacityExceeded { capacity: u64 },

    #[error("leaf index {index} out of range (len {len})")]
    IndexOutOfRange { index: u64, len: u64 },
}

/// Sibling path from a leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub index: u64,
    /// Siblings bottom-up; `siblings[0]` is the leaf's neighbour.
    #[serde(with = "crate::field::hex_vec_serde")]
    pub siblings: Vec<Fr>,
}

impl MerklePath {
    /// Fold `leaf` up the path.
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        let mut node = leaf;
        let mut idx = self.index;
        for sibling in &self.siblings {
            node = if idx & 1 == 0 {
                hash2(node, *sibling)
            } else {
                hash2(*sibling, node)
            };
            idx >>= 1;
        }
        node
    }
}

pub fn verify_path(leaf: Fr, path: &MerklePath, root: Fr) -> bool {
    path.compute_root(leaf) == root
}

/// Opaque marker for [`NoteMerkleTree::rollback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeCheckpoint {
    len: u64,
}

#[derive(Clone, Debug)]
pub struct NoteMerkleTree {
    depth: u8,
    /// `levels[l][i]` is the node at level `l`, position `i`.
    levels: Vec<Vec<Fr>>,
    /// `zeros[l]` is the root of an empty subtree of height `l`.
    zeros: Vec<Fr>,
}

impl NoteMerkleTree {
    pub fn new(depth: u8) -> Result<Self, MerkleError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(MerkleError::InvalidDepth {
                got: depth,
                max: MAX_TREE_DEPTH,
            });
        }

        let mut zeros = Vec::with_capacity(depth as usize + 1);
        zeros.push(Fr::zero());
        for l in 0..depth as usize {
            zeros.push(hash2(zeros[l], zeros[l]));
        }

        Ok(Self {
            depth,
            levels: vec![Vec::new(); depth as usize + 1],
            zeros,
        })
    }

    /// Build a tree by appending `leaves` in order.
    pub fn from_leaves(depth: u8, leaves: &[Fr]) -> Result<Self, MerkleError> {
        let mut tree = Self::new(depth)?;
        tree.insert_batch(leaves)?;
        Ok(tree)
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn len(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn remaining(&self) -> u64 {
        self.capacity() - self.len()
    }

    pub fn leaves(&self) -> &[Fr] {
        &self.levels[0]
    }

    /// Root of the empty tree of this depth.
    pub fn empty_root(&self) -> Fr {
        self.zeros[self.depth as usize]
    }

    pub fn root(&self) -> Fr {
        self.levels[self.depth as usize]
            .first()
            .copied()
            .unwrap_or_else(|| self.empty_root())
    }

    /// Append a commitment, returning its leaf index.
    pub fn insert(&mut self, commitment: Fr) -> Result<u64, MerkleError> {
        if self.remaining() == 0 {
            return Err(MerkleError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        let index = self.len();
        self.levels[0].push(commitment);
        self.rehash_from(index as usize);
        Ok(index)
    }

    /// Append several commitments. Either all are appended or none are.
    pub fn insert_batch(&mut self, commitments: &[Fr]) -> Result<Vec<u64>, MerkleError> {
        if (commitments.len() as u64) > self.remaining() {
            return Err(MerkleError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        commitments.iter().map(|c| self.insert(*c)).collect()
    }

    pub fn path_to(&self, index: u64) -> Result<MerklePath, MerkleError> {
        if index >= self.len() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let mut siblings = Vec::with_capacity(self.depth as usize);
        let mut idx = index as usize;
        for l in 0..self.depth as usize {
            siblings.push(self.node(l, idx ^ 1));
            idx >>= 1;
        }

        Ok(MerklePath { index, siblings })
    }

    pub fn checkpoint(&self) -> TreeCheckpoint {
        TreeCheckpoint { len: self.len() }
    }

    /// Drop every leaf appended after `cp` and restore the right edge of each level.
    ///
    /// Only meant for undoing staged appends that were never committed.
    pub fn rollback(&mut self, cp: TreeCheckpoint) {
        if cp.len >= self.len() {
            return;
        }

        let len = cp.len as usize;
        self.levels[0].truncate(len);
        for l in 1..=self.depth as usize {
            let count = nodes_covering(len, l);
            self.levels[l].truncate(count);
            if count > 0 {
                let pos = count - 1;
                let parent = hash2(self.node(l - 1, 2 * pos), self.node(l - 1, 2 * pos + 1));
                self.levels[l][pos] = parent;
            }
        }
    }

    /// Node at `(level, position)`, falling back to the empty-subtree hash.
    fn node(&self, level: usize, pos: usize) -> Fr {
        self.levels[level]
            .get(pos)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn rehash_from(&mut self, leaf_index: usize) {
        let mut pos = leaf_index;
        for l in 0..self.depth as usize {
            let left = self.node(l, pos & !1);
            let right = self.node(l, pos | 1);
            let parent = hash2(left, right);

            let parent_pos = pos >> 1;
            let parents = &mut self.levels[l + 1];
            if parent_pos < parents.len() {
                parents[parent_pos] = parent;
            } else {
                parents.push(parent);
            }
            pos = parent_pos;
        }
    }
}

/// Number of level-`l` nodes that cover at least one of the first `len` leaves.
fn nodes_covering(len: usize, level: usize) -> usize {
    // u64 so level 32 does not overflow on 32-bit targets.
    let width = 1u64 << level;
    (len as u64).div_ceil(width) as usize
}
