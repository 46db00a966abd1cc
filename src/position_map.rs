// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client-side position map.

use crate::{tree::TreeGeometry, Address, OramError, TreeIndex};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A total mapping from logical block address to the leaf currently assigned
/// to that address. Only the client holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMap(Vec<TreeIndex>);

impl PositionMap {
    /// Populates a fresh map by drawing a uniform leaf for every address.
    pub fn draw<R: RngCore + CryptoRng>(
        num_blocks: u64,
        geometry: &TreeGeometry,
        rng: &mut R,
    ) -> Self {
        Self((0..num_blocks).map(|_| geometry.random_leaf(rng)).collect())
    }

    /// Rebuilds a map from previously assigned leaves.
    pub fn from_positions(positions: Vec<TreeIndex>) -> Self {
        Self(positions)
    }

    /// The number of addresses mapped.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The leaf currently assigned to `address`.
    pub fn get(&self, address: Address) -> Result<TreeIndex, OramError> {
        let index = self.index_of(address)?;
        Ok(self.0[index])
    }

    /// Reassigns `address` to `leaf`.
    pub fn set(&mut self, address: Address, leaf: TreeIndex) -> Result<(), OramError> {
        let index = self.index_of(address)?;
        self.0[index] = leaf;
        Ok(())
    }

    /// The assigned leaves, indexed by address.
    pub fn positions(&self) -> &[TreeIndex] {
        &self.0
    }

    fn index_of(&self, address: Address) -> Result<usize, OramError> {
        if address < 0 || address as usize >= self.0.len() {
            return Err(OramError::AddressOutOfBounds {
                address,
                capacity: self.0.len() as Address,
            });
        }
        Ok(address as usize)
    }
}
