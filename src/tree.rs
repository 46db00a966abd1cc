// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Geometry of the bucket tree.
//!
//! Nodes are identified by their level-order index: the root is 0, the
//! children of node `i` are `2i + 1` and `2i + 2`, and the leaves occupy the
//! last `num_leaves` indices.

use crate::{OramError, TreeHeight, TreeIndex};
use rand::{CryptoRng, Rng, RngCore};
use std::ops::RangeInclusive;

/// The smallest block count an ORAM tree can be built over.
pub const MIN_BLOCKS: u64 = 2;

// At height 62 the tree has 2^63 - 1 buckets, the largest size whose
// node count still fits in a `TreeIndex`.
const MAXIMUM_TREE_HEIGHT: TreeHeight = 62;

/// Returns the parent of `node`, or `None` for the root.
pub fn parent(node: TreeIndex) -> Option<TreeIndex> {
    if node == 0 {
        None
    } else {
        Some((node - 1) / 2)
    }
}

/// The shape of a complete binary tree of buckets sized for `N` blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeGeometry {
    height: TreeHeight,
    num_leaves: TreeIndex,
    tree_size: TreeIndex,
}

impl TreeGeometry {
    /// Computes the geometry for `num_blocks` logical blocks:
    /// `height = ceil(log2(num_blocks))`, `num_leaves = 2^height`, and
    /// `tree_size = 2 * num_leaves - 1` buckets.
    pub fn new(num_blocks: u64) -> Result<Self, OramError> {
        if num_blocks < MIN_BLOCKS {
            return Err(OramError::InvalidConfiguration {
                reason: "an ORAM must hold at least two blocks",
            });
        }

        let height: TreeHeight = num_blocks.next_power_of_two().ilog2();
        if height > MAXIMUM_TREE_HEIGHT {
            return Err(OramError::InvalidConfiguration {
                reason: "block count exceeds the maximum tree height",
            });
        }

        let num_leaves: TreeIndex = 1 << height;
        Ok(Self {
            height,
            num_leaves,
            tree_size: 2 * num_leaves - 1,
        })
    }

    /// The height of the tree; paths have `height + 1` nodes.
    pub fn height(&self) -> TreeHeight {
        self.height
    }

    /// The number of leaf buckets, `2^height`.
    pub fn num_leaves(&self) -> TreeIndex {
        self.num_leaves
    }

    /// The total number of buckets in the tree.
    pub fn tree_size(&self) -> TreeIndex {
        self.tree_size
    }

    /// The level-order indices of the leaf buckets.
    pub fn leaf_range(&self) -> RangeInclusive<TreeIndex> {
        self.num_leaves - 1..=self.tree_size - 1
    }

    /// Whether `node` is a leaf of this tree.
    pub fn is_leaf(&self, node: TreeIndex) -> bool {
        self.leaf_range().contains(&node)
    }

    /// Returns the nodes from the root down to `leaf`, inclusive.
    pub fn path_nodes(&self, leaf: TreeIndex) -> Result<Vec<TreeIndex>, OramError> {
        if !self.is_leaf(leaf) {
            return Err(OramError::NodeOutOfBounds {
                node: leaf,
                capacity: self.tree_size,
            });
        }

        let mut path = Vec::with_capacity(self.height as usize + 1);
        let mut node = leaf;
        path.push(node);
        while let Some(ancestor) = parent(node) {
            path.push(ancestor);
            node = ancestor;
        }
        path.reverse();
        Ok(path)
    }

    /// Draws a uniformly random leaf.
    pub fn random_leaf<R: RngCore + CryptoRng>(&self, rng: &mut R) -> TreeIndex {
        (self.num_leaves - 1) + rng.gen_range(0..self.num_leaves)
    }
}
