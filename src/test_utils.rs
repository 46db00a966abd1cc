// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities: deterministic engines and mirror-array workloads.
//!
//! The seeded generators here exist only for reproducible testing and
//! benchmarking, which is why this module is feature-gated.

use crate::{
    bucket::BlockValue, path_oram::PathOram, store::MemoryStore, Address, BlockSize, BucketSize,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A deterministic in-memory engine monomorphization, to improve
/// readability in tests and benchmarks.
pub type MemoryPathOram<const B: BlockSize, const Z: BucketSize> =
    PathOram<B, Z, MemoryStore<B, Z>, StdRng>;

/// A deterministic engine over an in-memory store, seeded by `seed`.
pub fn seeded_oram<const B: BlockSize, const Z: BucketSize>(
    num_blocks: u64,
    seed: u64,
) -> MemoryPathOram<B, Z> {
    PathOram::new(MemoryStore::new(), num_blocks, StdRng::seed_from_u64(seed)).unwrap()
}

/// Exercises an engine on a workload of random reads and writes, checking
/// every result against a mirror array.
pub fn test_correctness_random_workload<const B: BlockSize, const Z: BucketSize>(
    num_blocks: u64,
    num_operations: u32,
) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut oram = seeded_oram::<B, Z>(num_blocks, 1);
    let mut mirror: Vec<Option<BlockValue<B>>> = vec![None; num_blocks as usize];

    for _ in 0..num_operations {
        let random_address = rng.gen_range(0..num_blocks) as Address;
        let random_block_value = rng.gen();

        let read_versus_write: bool = rng.gen();

        if read_versus_write {
            assert_eq!(
                oram.read(random_address).unwrap(),
                mirror[random_address as usize]
            );
        } else {
            oram.write(random_address, random_block_value).unwrap();
            mirror[random_address as usize] = Some(random_block_value);
        }
    }

    for address in 0..num_blocks as Address {
        assert_eq!(
            oram.read(address).unwrap(),
            mirror[address as usize],
            "{address}"
        );
    }
}

/// Exercises an engine on repeated sequential passes over every address.
pub fn test_correctness_linear_workload<const B: BlockSize, const Z: BucketSize>(
    num_blocks: u64,
    num_passes: u32,
) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut oram = seeded_oram::<B, Z>(num_blocks, 1);
    let mut mirror: Vec<Option<BlockValue<B>>> = vec![None; num_blocks as usize];

    for _ in 0..num_passes {
        for address in 0..num_blocks as Address {
            let random_block_value = rng.gen();

            let read_versus_write: bool = rng.gen();

            if read_versus_write {
                assert_eq!(oram.read(address).unwrap(), mirror[address as usize]);
            } else {
                oram.write(address, random_block_value).unwrap();
                mirror[address as usize] = Some(random_block_value);
            }
        }
    }

    for address in 0..num_blocks as Address {
        assert_eq!(
            oram.read(address).unwrap(),
            mirror[address as usize],
            "{address}"
        );
    }
}
