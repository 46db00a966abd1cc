// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An implementation of Path ORAM over an untrusted bucket store.
//!
//! The client keeps a position map and a stash; the server keeps a binary
//! tree of fixed-size buckets and an ordered access log. Each logical read
//! or write becomes one root-to-leaf path read followed by the same path
//! written in reverse, so the server observes uniformly random leaf paths
//! independent of the logical access sequence.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use thiserror::Error;

pub mod bucket;
pub mod document;
pub mod path_oram;
pub mod position_map;
pub mod sled_store;
pub mod stash;
pub mod store;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bucket::{Block, BlockValue, Bucket, DUMMY_ADDRESS};
pub use document::{Document, Library, FILLER};
pub use path_oram::{Operation, PathOram, DEFAULT_STASH_SOFT_LIMIT};
pub use position_map::PositionMap;
pub use sled_store::SledStore;
pub use stash::Stash;
pub use store::{AccessEvent, AccessKind, AccessLog, BucketStore, MemoryStore};
pub use tree::TreeGeometry;

/// The numeric type of logical block addresses. Addresses in `[0, N)` are
/// real; `-1` denotes a dummy block.
pub type Address = i64;
/// The numeric type used to specify the size of each block in bytes.
pub type BlockSize = usize;
/// The numeric type used to specify the number of blocks per bucket.
pub type BucketSize = usize;
/// The numeric type of tree node ids, in level order from the root at 0.
pub type TreeIndex = u64;
/// The numeric type of tree heights and path levels.
pub type TreeHeight = u32;
/// The numeric type used to represent the size of a stash in blocks.
pub type StashSize = usize;

/// The error type returned by ORAM operations.
#[derive(Debug, Error)]
pub enum OramError {
    /// A logical address outside `[0, N)` was passed to the engine.
    #[error("address {address} out of bounds for capacity {capacity}")]
    AddressOutOfBounds {
        /// The offending address.
        address: Address,
        /// The engine's block capacity.
        capacity: Address,
    },

    /// A read carried a payload, or a write carried none.
    #[error("operation and payload do not match: writes carry data, reads do not")]
    OperationMismatch,

    /// The requested parameters cannot form a valid ORAM.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong with the parameters.
        reason: &'static str,
    },

    /// A tree node id outside the bucket tree was requested.
    #[error("node {node} out of bounds for tree size {capacity}")]
    NodeOutOfBounds {
        /// The offending node id.
        node: TreeIndex,
        /// The number of buckets in the tree.
        capacity: TreeIndex,
    },

    /// The store returned a missing, short, or undecodable bucket.
    #[error("corrupt bucket at node {node}: {reason}")]
    CorruptBucket {
        /// The node whose bucket was corrupt.
        node: TreeIndex,
        /// What was wrong with the bucket.
        reason: &'static str,
    },

    /// A block the title index points at is absent from the ORAM.
    #[error("no block stored at address {address}")]
    MissingBlock {
        /// The address that should have held a block.
        address: Address,
    },

    /// The engine was poisoned by an earlier storage failure and refuses
    /// all further accesses until reinitialized or restored.
    #[error("engine poisoned by an earlier storage failure")]
    Poisoned,

    /// A requested document title is not in the index.
    #[error("unknown title: {title}")]
    UnknownTitle {
        /// The title that was requested.
        title: String,
    },

    /// An error from the persistent bucket store.
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// An article line could not be parsed.
    #[error("article parse error: {0}")]
    Article(#[from] serde_json::Error),

    /// An internal integer conversion overflowed.
    #[error("integer conversion error: {0}")]
    IntegerConversion(#[from] std::num::TryFromIntError),
}
