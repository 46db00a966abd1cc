// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Bucket-store abstractions for the untrusted server.
//!
//! The server owns an array of fixed-size buckets indexed by tree node id and
//! records every bucket access it serves in an ordered log. The engine only
//! ever talks to the server through [`BucketStore`].

use crate::{bucket::Bucket, sled_store::SledStore, BlockSize, BucketSize, OramError, TreeIndex};
use duplicate::duplicate_item;

/// Whether a logged bucket access was a read or a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// A bucket read.
    Read,
    /// A bucket write.
    Write,
}

/// One entry of the server's ordered access log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessEvent {
    /// Whether the bucket was read or written.
    pub kind: AccessKind,
    /// The node id of the bucket accessed.
    pub node: TreeIndex,
}

/// The server's record of the bucket accesses it has served, in order.
pub trait AccessLog {
    /// The events recorded since the last [`AccessLog::clear_access_log`].
    fn access_log(&self) -> &[AccessEvent];
    /// Discards the recorded events.
    fn clear_access_log(&mut self);
}

/// The capability set the engine consumes: bucket reads and writes over a
/// fixed-size tree, with every operation recorded in the access log.
pub trait BucketStore<const B: BlockSize, const Z: BucketSize>: AccessLog {
    /// (Re)fills the store with `num_buckets` all-dummy buckets and empties
    /// the access log. Initialization is server-side setup and is not logged.
    fn init(&mut self, num_buckets: TreeIndex) -> Result<(), OramError>;

    /// The number of buckets held.
    fn capacity(&self) -> TreeIndex;

    /// Returns whatever was last written at `node`, including initial
    /// dummies.
    fn read_bucket(&mut self, node: TreeIndex) -> Result<Bucket<B, Z>, OramError>;

    /// Overwrites the bucket at `node`.
    fn write_bucket(&mut self, node: TreeIndex, bucket: Bucket<B, Z>) -> Result<(), OramError>;
}

/// An in-memory reference store.
#[derive(Debug, Default)]
pub struct MemoryStore<const B: BlockSize, const Z: BucketSize> {
    buckets: Vec<Bucket<B, Z>>,
    pub(crate) log: Vec<AccessEvent>,
}

impl<const B: BlockSize, const Z: BucketSize> MemoryStore<B, Z> {
    /// An empty store; [`BucketStore::init`] sizes it.
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            log: Vec::new(),
        }
    }
}

impl<const B: BlockSize, const Z: BucketSize> BucketStore<B, Z> for MemoryStore<B, Z> {
    fn init(&mut self, num_buckets: TreeIndex) -> Result<(), OramError> {
        self.buckets = vec![Bucket::default(); usize::try_from(num_buckets)?];
        self.log.clear();
        Ok(())
    }

    fn capacity(&self) -> TreeIndex {
        self.buckets.len() as TreeIndex
    }

    fn read_bucket(&mut self, node: TreeIndex) -> Result<Bucket<B, Z>, OramError> {
        log::debug!("bucket read -- {}", node);
        self.log.push(AccessEvent {
            kind: AccessKind::Read,
            node,
        });
        self.buckets
            .get(usize::try_from(node)?)
            .copied()
            .ok_or(OramError::NodeOutOfBounds {
                node,
                capacity: self.capacity(),
            })
    }

    fn write_bucket(&mut self, node: TreeIndex, bucket: Bucket<B, Z>) -> Result<(), OramError> {
        log::debug!("bucket write -- {}", node);
        self.log.push(AccessEvent {
            kind: AccessKind::Write,
            node,
        });
        let capacity = self.capacity();
        let slot = self
            .buckets
            .get_mut(usize::try_from(node)?)
            .ok_or(OramError::NodeOutOfBounds { node, capacity })?;
        *slot = bucket;
        Ok(())
    }
}

#[duplicate_item(
    store_type;
    [MemoryStore];
    [SledStore];
)]
impl<const B: BlockSize, const Z: BucketSize> AccessLog for store_type<B, Z> {
    fn access_log(&self) -> &[AccessEvent] {
        &self.log
    }

    fn clear_access_log(&mut self) {
        self.log.clear();
    }
}
