// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A persistent bucket store backed by a single `sled` tree.
//!
//! The store is one table keyed by the big-endian node id; each value is the
//! fixed-length bucket encoding from [`crate::bucket`], so bucket sizes on
//! disk are independent of the addresses stored.

use crate::{
    bucket::Bucket,
    store::{AccessEvent, AccessKind, BucketStore},
    BlockSize, BucketSize, OramError, TreeIndex,
};
use std::path::Path;

/// An on-disk reference store holding one encoded bucket per node id.
#[derive(Debug)]
pub struct SledStore<const B: BlockSize, const Z: BucketSize> {
    db: sled::Db,
    capacity: TreeIndex,
    pub(crate) log: Vec<AccessEvent>,
}

impl<const B: BlockSize, const Z: BucketSize> SledStore<B, Z> {
    /// Opens (or creates) the store at `path`. An existing store keeps its
    /// buckets; [`BucketStore::init`] resets them.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OramError> {
        let db = sled::open(path)?;
        let capacity = db.len() as TreeIndex;
        Ok(Self {
            db,
            capacity,
            log: Vec::new(),
        })
    }

    /// Flushes outstanding writes to disk.
    pub fn flush(&self) -> Result<(), OramError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn raw(&self) -> &sled::Db {
        &self.db
    }

    fn key(node: TreeIndex) -> [u8; 8] {
        node.to_be_bytes()
    }

    fn check_node(&self, node: TreeIndex) -> Result<(), OramError> {
        if node >= self.capacity {
            return Err(OramError::NodeOutOfBounds {
                node,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl<const B: BlockSize, const Z: BucketSize> BucketStore<B, Z> for SledStore<B, Z> {
    fn init(&mut self, num_buckets: TreeIndex) -> Result<(), OramError> {
        self.db.clear()?;
        let dummy = Bucket::<B, Z>::default().encode();
        for node in 0..num_buckets {
            self.db.insert(Self::key(node), dummy.clone())?;
        }
        self.db.flush()?;
        self.capacity = num_buckets;
        self.log.clear();
        Ok(())
    }

    fn capacity(&self) -> TreeIndex {
        self.capacity
    }

    fn read_bucket(&mut self, node: TreeIndex) -> Result<Bucket<B, Z>, OramError> {
        log::debug!("bucket read -- {}", node);
        self.log.push(AccessEvent {
            kind: AccessKind::Read,
            node,
        });
        self.check_node(node)?;
        let bytes = self
            .db
            .get(Self::key(node))?
            .ok_or(OramError::CorruptBucket {
                node,
                reason: "bucket missing from the store",
            })?;
        Bucket::decode(node, &bytes)
    }

    fn write_bucket(&mut self, node: TreeIndex, bucket: Bucket<B, Z>) -> Result<(), OramError> {
        log::debug!("bucket write -- {}", node);
        self.log.push(AccessEvent {
            kind: AccessKind::Write,
            node,
        });
        self.check_node(node)?;
        self.db.insert(Self::key(node), bucket.encode())?;
        Ok(())
    }
}
