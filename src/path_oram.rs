// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The Path ORAM engine.
//!
//! Every logical access runs the same four phases: remap the target to a
//! fresh leaf, read one root-to-leaf path into the stash, service the
//! request from the stash, and greedily evict the stash back onto the path
//! from the leaf toward the root. The server sees one path read followed by
//! the same path written in reverse, for every access, regardless of the
//! operation or address.

use crate::{
    bucket::{Block, BlockValue, Bucket},
    position_map::PositionMap,
    stash::Stash,
    store::BucketStore,
    tree::TreeGeometry,
    Address, BlockSize, BucketSize, OramError, StashSize, TreeIndex,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Advisory bound on resident stash blocks before the engine starts warning.
pub const DEFAULT_STASH_SOFT_LIMIT: StashSize = 64;

/// A logical ORAM operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Read the block at an address.
    Read,
    /// Overwrite the block at an address.
    Write,
}

/// Client state serialized by [`PathOram::snapshot`]. The tree itself lives
/// in the store.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    num_blocks: u64,
    bucket_size: u64,
    block_len: u64,
    positions: Vec<TreeIndex>,
    stash: Vec<(Address, Vec<u8>)>,
}

/// A Path ORAM client over an untrusted bucket store.
#[derive(Debug)]
pub struct PathOram<const B: BlockSize, const Z: BucketSize, S, R> {
    /// The untrusted bucket storage (public for tests and benchmarks).
    pub store: S,
    geometry: TreeGeometry,
    position_map: PositionMap,
    stash: Stash<B>,
    rng: R,
    stash_soft_limit: StashSize,
    poisoned: bool,
}

impl<const B: BlockSize, const Z: BucketSize, S, R> PathOram<B, Z, S, R>
where
    S: BucketStore<B, Z>,
    R: RngCore + CryptoRng,
{
    /// Builds an engine over `num_blocks` logical blocks: initializes `store`
    /// to a tree of all-dummy buckets and draws a fresh position map.
    pub fn new(mut store: S, num_blocks: u64, mut rng: R) -> Result<Self, OramError> {
        if B == 0 || Z == 0 {
            return Err(OramError::InvalidConfiguration {
                reason: "block and bucket sizes must be nonzero",
            });
        }

        let geometry = TreeGeometry::new(num_blocks)?;
        log::debug!(
            "PathOram::new -- B = {}, Z = {}, N = {}, height = {}",
            B,
            Z,
            num_blocks,
            geometry.height()
        );

        store.init(geometry.tree_size())?;
        let position_map = PositionMap::draw(num_blocks, &geometry, &mut rng);

        Ok(Self {
            store,
            geometry,
            position_map,
            stash: Stash::new(),
            rng,
            stash_soft_limit: DEFAULT_STASH_SOFT_LIMIT,
            poisoned: false,
        })
    }

    /// The number of logical blocks this engine serves.
    pub fn block_capacity(&self) -> Address {
        self.position_map.len() as Address
    }

    /// The shape of the bucket tree.
    pub fn geometry(&self) -> &TreeGeometry {
        &self.geometry
    }

    /// The number of blocks currently resident in the stash.
    pub fn stash_occupancy(&self) -> StashSize {
        self.stash.occupancy()
    }

    /// Replaces the advisory stash bound.
    pub fn set_stash_soft_limit(&mut self, limit: StashSize) {
        self.stash_soft_limit = limit;
    }

    /// Consumes the engine, handing back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Performs one oblivious access: returns the previous value at
    /// `address` (or `None` if the address has never been written), storing
    /// `new_data` there if `op` is [`Operation::Write`].
    ///
    /// `new_data` must be present exactly when `op` is a write. A storage
    /// failure mid-access poisons the engine; all further accesses are
    /// refused until it is rebuilt or restored.
    pub fn access(
        &mut self,
        op: Operation,
        address: Address,
        new_data: Option<BlockValue<B>>,
    ) -> Result<Option<BlockValue<B>>, OramError> {
        if self.poisoned {
            return Err(OramError::Poisoned);
        }
        if address < 0 || address >= self.block_capacity() {
            return Err(OramError::AddressOutOfBounds {
                address,
                capacity: self.block_capacity(),
            });
        }
        if (op == Operation::Write) != new_data.is_some() {
            return Err(OramError::OperationMismatch);
        }

        // Remap the target to a fresh uniform leaf. Reads re-randomize too.
        let old_position = self.position_map.get(address)?;
        let new_position = self.geometry.random_leaf(&mut self.rng);
        self.position_map.set(address, new_position)?;

        // Read the whole path before merging it into the stash, so that a
        // corrupt bucket leaves the client state exactly as it was.
        let path = self.geometry.path_nodes(old_position)?;
        let mut fetched: Vec<Bucket<B, Z>> = Vec::with_capacity(path.len());
        for &node in &path {
            match self.store.read_bucket(node) {
                Ok(bucket) => fetched.push(bucket),
                Err(error) => {
                    self.position_map.set(address, old_position)?;
                    self.poisoned = true;
                    return Err(error);
                }
            }
        }
        for bucket in fetched {
            for block in bucket.blocks {
                // The path copy is at least as fresh as a resident one.
                if !block.is_dummy() {
                    self.stash.insert(block.address, block.value);
                }
            }
        }

        // Service the request from the stash.
        let result = self.stash.get(address);
        if let Some(data) = new_data {
            self.stash.insert(address, data);
        }

        self.evict(&path)?;

        let occupancy = self.stash.occupancy();
        if occupancy > self.stash_soft_limit {
            log::warn!(
                "stash occupancy {} exceeds the soft limit {}",
                occupancy,
                self.stash_soft_limit
            );
        }

        Ok(result)
    }

    /// Obliviously reads the value stored at `address`.
    pub fn read(&mut self, address: Address) -> Result<Option<BlockValue<B>>, OramError> {
        self.access(Operation::Read, address, None)
    }

    /// Obliviously writes `new_data` at `address`, returning the previous
    /// value.
    pub fn write(
        &mut self,
        address: Address,
        new_data: BlockValue<B>,
    ) -> Result<Option<BlockValue<B>>, OramError> {
        self.access(Operation::Write, address, Some(new_data))
    }

    /// Writes the stash back onto `path` from the leaf toward the root. Each
    /// bucket takes up to `Z` resident blocks whose assigned path agrees with
    /// `path` at that level; whatever does not fit is retried at shallower
    /// levels and the remainder stays in the stash.
    fn evict(&mut self, path: &[TreeIndex]) -> Result<(), OramError> {
        let mut stash_paths: BTreeMap<Address, Vec<TreeIndex>> = BTreeMap::new();
        for address in self.stash.addresses() {
            let leaf = self.position_map.get(address)?;
            stash_paths.insert(address, self.geometry.path_nodes(leaf)?);
        }

        for level in (0..path.len()).rev() {
            let node = path[level];

            let mut selected: Vec<Address> = Vec::with_capacity(Z);
            for (&address, assigned) in &stash_paths {
                if !self.stash.contains(address) {
                    continue;
                }
                if assigned[level] == node {
                    selected.push(address);
                    if selected.len() == Z {
                        break;
                    }
                }
            }

            let mut bucket = Bucket::<B, Z>::default();
            for (slot, &address) in selected.iter().enumerate() {
                if let Some(value) = self.stash.get(address) {
                    bucket.blocks[slot] = Block::new(address, value);
                }
            }

            // Selected blocks leave the stash only once the server holds
            // them; a failed write must not strand them in neither place.
            if let Err(error) = self.store.write_bucket(node, bucket) {
                self.poisoned = true;
                return Err(error);
            }
            for &address in &selected {
                self.stash.remove(address);
            }
        }
        Ok(())
    }

    /// Serializes the client state (position map, stash, and parameters)
    /// into an opaque byte string. The tree itself lives in the store.
    pub fn snapshot(&self) -> Result<Vec<u8>, OramError> {
        let snapshot = Snapshot {
            num_blocks: self.position_map.len() as u64,
            bucket_size: Z as u64,
            block_len: B as u64,
            positions: self.position_map.positions().to_vec(),
            stash: self
                .stash
                .iter()
                .map(|(address, value)| (*address, value.as_bytes().to_vec()))
                .collect(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Rebuilds an engine from a [`PathOram::snapshot`], bound to a store
    /// that already holds the corresponding tree.
    pub fn restore(store: S, bytes: &[u8], rng: R) -> Result<Self, OramError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        if snapshot.bucket_size != Z as u64 || snapshot.block_len != B as u64 {
            return Err(OramError::InvalidConfiguration {
                reason: "snapshot parameters do not match this engine type",
            });
        }

        let geometry = TreeGeometry::new(snapshot.num_blocks)?;
        if store.capacity() != geometry.tree_size() {
            return Err(OramError::InvalidConfiguration {
                reason: "store capacity does not match the snapshot geometry",
            });
        }
        if snapshot.positions.len() as u64 != snapshot.num_blocks
            || !snapshot
                .positions
                .iter()
                .all(|&leaf| geometry.is_leaf(leaf))
        {
            return Err(OramError::InvalidConfiguration {
                reason: "snapshot position map is malformed",
            });
        }

        let mut stash = Stash::new();
        for (address, data) in snapshot.stash {
            let data: [u8; B] = data
                .try_into()
                .map_err(|_| OramError::InvalidConfiguration {
                    reason: "snapshot stash block has the wrong length",
                })?;
            stash.insert(address, BlockValue::new(data));
        }

        Ok(Self {
            store,
            geometry,
            position_map: PositionMap::from_positions(snapshot.positions),
            stash,
            rng,
            stash_soft_limit: DEFAULT_STASH_SOFT_LIMIT,
            poisoned: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sled_store::SledStore,
        store::{AccessEvent, AccessKind, AccessLog, MemoryStore},
        tree,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    type MemoryOram<const B: BlockSize, const Z: BucketSize> =
        PathOram<B, Z, MemoryStore<B, Z>, StdRng>;

    fn memory_oram<const B: BlockSize, const Z: BucketSize>(num_blocks: u64) -> MemoryOram<B, Z> {
        PathOram::new(MemoryStore::new(), num_blocks, StdRng::seed_from_u64(0)).unwrap()
    }

    /// Asserts that `log` is exactly `accesses` repetitions of one
    /// root-to-leaf path read forward then written in reverse.
    fn assert_path_shaped(log: &[AccessEvent], geometry: &TreeGeometry, accesses: usize) {
        let path_len = geometry.height() as usize + 1;
        assert_eq!(log.len(), accesses * 2 * path_len);

        for segment in log.chunks_exact(2 * path_len) {
            let (reads, writes) = segment.split_at(path_len);
            assert!(reads.iter().all(|event| event.kind == AccessKind::Read));
            assert!(writes.iter().all(|event| event.kind == AccessKind::Write));

            let leaf = reads[path_len - 1].node;
            let path = geometry.path_nodes(leaf).unwrap();
            let read_nodes: Vec<_> = reads.iter().map(|event| event.node).collect();
            let mut write_nodes: Vec<_> = writes.iter().map(|event| event.node).collect();
            write_nodes.reverse();
            assert_eq!(read_nodes, path);
            assert_eq!(write_nodes, path);
        }
    }

    fn value<const B: BlockSize>(bytes: &[u8]) -> BlockValue<B> {
        let mut data = [0u8; B];
        data.copy_from_slice(bytes);
        BlockValue::new(data)
    }

    #[test]
    fn write_then_read_round_trips() {
        // N = 4, Z = 2, B = 4.
        let mut oram = memory_oram::<4, 2>(4);
        assert_eq!(oram.write(0, value(b"AAAA")).unwrap(), None);
        assert_eq!(oram.read(0).unwrap(), Some(value(b"AAAA")));
        assert_eq!(oram.read(3).unwrap(), None);
    }

    #[test]
    fn results_and_log_shape_over_a_short_workload() {
        // N = 8, Z = 2, B = 1; L = 3.
        let mut oram = memory_oram::<1, 2>(8);
        assert_eq!(oram.write(0, value(b"a")).unwrap(), None);
        assert_eq!(oram.write(1, value(b"b")).unwrap(), None);
        assert_eq!(oram.write(2, value(b"c")).unwrap(), None);
        assert_eq!(oram.read(0).unwrap(), Some(value(b"a")));
        assert_eq!(oram.read(1).unwrap(), Some(value(b"b")));
        assert_eq!(oram.read(2).unwrap(), Some(value(b"c")));

        assert_eq!(oram.geometry().height(), 3);
        assert_eq!(oram.store.access_log().len(), 6 * 2 * 4);
        let geometry = *oram.geometry();
        assert_path_shaped(oram.store.access_log(), &geometry, 6);
    }

    #[test]
    fn overwrites_return_the_previous_value() {
        let mut oram = memory_oram::<2, 2>(4);
        assert_eq!(oram.write(1, value(b"xy")).unwrap(), None);
        assert_eq!(oram.write(1, value(b"uv")).unwrap(), Some(value(b"xy")));
        assert_eq!(oram.read(1).unwrap(), Some(value(b"uv")));
    }

    #[test]
    fn invalid_arguments_fail_fast_without_touching_the_server() {
        let mut oram = memory_oram::<2, 2>(4);
        oram.write(0, value(b"ok")).unwrap();
        oram.store.clear_access_log();
        let before = oram.snapshot().unwrap();

        assert!(matches!(
            oram.read(-1),
            Err(OramError::AddressOutOfBounds { .. })
        ));
        assert!(matches!(
            oram.read(4),
            Err(OramError::AddressOutOfBounds { .. })
        ));
        assert!(matches!(
            oram.access(Operation::Write, 0, None),
            Err(OramError::OperationMismatch)
        ));
        assert!(matches!(
            oram.access(Operation::Read, 0, Some(value(b"no"))),
            Err(OramError::OperationMismatch)
        ));

        assert!(oram.store.access_log().is_empty());
        assert_eq!(oram.snapshot().unwrap(), before);
        assert_eq!(oram.read(0).unwrap(), Some(value(b"ok")));
    }

    #[test]
    fn repeated_reads_visit_every_leaf_uniformly() {
        // N = 2, Z = 1, B = 2; leaves are nodes 1 and 2.
        let mut oram = memory_oram::<2, 1>(2);
        let geometry = *oram.geometry();
        assert_eq!(geometry.leaf_range(), 1..=2);

        let trials = 1000;
        let mut counts = [0u32; 2];
        for _ in 0..trials {
            oram.read(0).unwrap();
        }

        let path_len = geometry.height() as usize + 1;
        let log = oram.store.access_log();
        assert_path_shaped(log, &geometry, trials);
        for segment in log.chunks_exact(2 * path_len) {
            let leaf = segment[path_len - 1].node;
            counts[leaf as usize - 1] += 1;
        }

        assert!(counts.iter().all(|&count| count > 0));

        // Chi-squared against uniform; 10.83 is the 99.9th percentile at one
        // degree of freedom.
        let expected = trials as f64 / 2.0;
        let statistic: f64 = counts
            .iter()
            .map(|&count| {
                let delta = count as f64 - expected;
                delta * delta / expected
            })
            .sum();
        assert!(statistic < 10.83, "chi-squared statistic {statistic}");
    }

    #[test]
    fn log_shape_is_independent_of_the_operation_sequence() {
        let ops = 32;

        let mut writer = memory_oram::<2, 2>(8);
        for i in 0..ops {
            writer.write(i % 8, value(&[i as u8, 0])).unwrap();
        }

        let mut reader = memory_oram::<2, 2>(8);
        for _ in 0..ops {
            reader.read(5).unwrap();
        }

        let geometry = *writer.geometry();
        assert_path_shaped(writer.store.access_log(), &geometry, ops as usize);
        assert_path_shaped(reader.store.access_log(), &geometry, ops as usize);
        assert_eq!(
            writer.store.access_log().len(),
            reader.store.access_log().len()
        );
    }

    #[test]
    fn memory_and_sled_stores_log_identically() {
        let dir = tempfile::tempdir().unwrap();
        let sled_store: SledStore<2, 2> = SledStore::open(dir.path().join("buckets")).unwrap();

        // Identical seeds, so both engines draw identical leaves.
        let mut on_memory: MemoryOram<2, 2> =
            PathOram::new(MemoryStore::new(), 8, StdRng::seed_from_u64(7)).unwrap();
        let mut on_sled: PathOram<2, 2, SledStore<2, 2>, StdRng> =
            PathOram::new(sled_store, 8, StdRng::seed_from_u64(7)).unwrap();

        for i in 0..16 {
            assert_eq!(
                on_memory.write(i % 8, value(&[i as u8, 1])).unwrap(),
                on_sled.write(i % 8, value(&[i as u8, 1])).unwrap()
            );
        }
        for i in 0..8 {
            assert_eq!(on_memory.read(i).unwrap(), on_sled.read(i).unwrap());
        }

        assert_eq!(on_memory.store.access_log(), on_sled.store.access_log());
    }

    #[test]
    fn stash_occupancy_stays_bounded() {
        let accesses = 50_000;
        let mut rng = StdRng::seed_from_u64(3);
        let mut oram = memory_oram::<1, 4>(1024);
        let height = oram.geometry().height() as usize;

        let mut max_occupancy = 0;
        for i in 0..accesses {
            let address = rng.gen_range(0..1024);
            if i % 2 == 0 {
                oram.write(address, value(&[address as u8])).unwrap();
            } else {
                oram.read(address).unwrap();
            }
            max_occupancy = max_occupancy.max(oram.stash_occupancy());
        }

        // The stash tail is O(log N) with overwhelming probability; ten
        // times the tree height is far beyond anything a healthy eviction
        // should reach.
        assert!(
            max_occupancy < 10 * height,
            "maximum stash occupancy {max_occupancy}"
        );
    }

    #[test]
    fn a_corrupt_bucket_poisons_the_engine_and_preserves_client_state() {
        let dir = tempfile::tempdir().unwrap();
        let store: SledStore<4, 2> = SledStore::open(dir.path().join("buckets")).unwrap();
        let mut oram: PathOram<4, 2, SledStore<4, 2>, StdRng> =
            PathOram::new(store, 4, StdRng::seed_from_u64(0)).unwrap();
        oram.write(2, value(b"good")).unwrap();

        // Truncate the root bucket; every path runs through it.
        let mut bytes = oram.store.read_bucket(0).unwrap().encode();
        bytes.truncate(bytes.len() - 1);
        oram.store.raw().insert(0u64.to_be_bytes(), bytes).unwrap();

        let before = oram.snapshot().unwrap();
        assert!(matches!(
            oram.read(2),
            Err(OramError::CorruptBucket { node: 0, .. })
        ));
        assert_eq!(oram.snapshot().unwrap(), before);

        assert!(matches!(oram.read(2), Err(OramError::Poisoned)));
        assert!(matches!(
            oram.write(2, value(b"more")),
            Err(OramError::Poisoned)
        ));
    }

    #[test]
    fn snapshot_restore_preserves_every_block() {
        let num_blocks = 64;
        let mut rng = StdRng::seed_from_u64(11);
        let mut oram = memory_oram::<4, 4>(num_blocks);

        let mut mirror: Vec<Option<BlockValue<4>>> = vec![None; num_blocks as usize];
        for _ in 0..500 {
            let address = rng.gen_range(0..num_blocks as Address);
            let data: BlockValue<4> = rng.gen();
            oram.write(address, data).unwrap();
            mirror[address as usize] = Some(data);
        }

        let snapshot = oram.snapshot().unwrap();
        let store = oram.into_store();
        let mut restored: MemoryOram<4, 4> =
            PathOram::restore(store, &snapshot, StdRng::seed_from_u64(12)).unwrap();

        for (address, expected) in mirror.iter().enumerate() {
            assert_eq!(restored.read(address as Address).unwrap(), *expected);
        }
    }

    #[test]
    fn snapshot_restore_works_across_sled_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store: SledStore<2, 2> = SledStore::open(dir.path().join("buckets")).unwrap();
        let mut oram: PathOram<2, 2, SledStore<2, 2>, StdRng> =
            PathOram::new(store, 8, StdRng::seed_from_u64(0)).unwrap();

        for address in 0..8 {
            oram.write(address, value(&[address as u8, 0xFF])).unwrap();
        }

        let snapshot = oram.snapshot().unwrap();
        let store = oram.into_store();
        let mut restored: PathOram<2, 2, SledStore<2, 2>, StdRng> =
            PathOram::restore(store, &snapshot, StdRng::seed_from_u64(1)).unwrap();

        for address in 0..8 {
            assert_eq!(
                restored.read(address).unwrap(),
                Some(value(&[address as u8, 0xFF]))
            );
        }
    }

    #[test]
    fn restore_rejects_mismatched_parameters() {
        let mut oram = memory_oram::<4, 2>(4);
        oram.write(0, value(b"data")).unwrap();
        let snapshot = oram.snapshot().unwrap();
        let store = oram.into_store();

        // Wrong bucket size for the snapshot.
        let result: Result<PathOram<4, 3, MemoryStore<4, 3>, StdRng>, _> =
            PathOram::restore(MemoryStore::new(), &snapshot, StdRng::seed_from_u64(0));
        assert!(matches!(
            result,
            Err(OramError::InvalidConfiguration { .. })
        ));

        // Store whose capacity does not match the snapshot geometry.
        let result: Result<MemoryOram<4, 2>, _> =
            PathOram::restore(MemoryStore::new(), &snapshot, StdRng::seed_from_u64(0));
        assert!(matches!(
            result,
            Err(OramError::InvalidConfiguration { .. })
        ));

        // The original store still restores cleanly.
        let restored: Result<MemoryOram<4, 2>, _> =
            PathOram::restore(store, &snapshot, StdRng::seed_from_u64(0));
        assert!(restored.is_ok());
    }

    #[test]
    fn engines_are_independent() {
        let mut first = memory_oram::<2, 2>(tree::MIN_BLOCKS);
        let mut second = memory_oram::<2, 2>(tree::MIN_BLOCKS);

        first.write(0, value(b"11")).unwrap();
        assert_eq!(second.read(0).unwrap(), None);
        assert_eq!(first.read(0).unwrap(), Some(value(b"11")));
    }
}
