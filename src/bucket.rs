// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Block and bucket structures for Path ORAM, and the byte encoding used by
//! persistent stores.

use crate::{Address, BlockSize, BucketSize, OramError, TreeIndex};
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// The address marking a block as a dummy.
pub const DUMMY_ADDRESS: Address = -1;

/// The number of bytes an encoded block spends on its address.
pub const BLOCK_HEADER_LEN: usize = size_of::<Address>();

const_assert_eq!(BLOCK_HEADER_LEN, 8);

/// The payload of a single block: `B` unstructured bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockValue<const B: BlockSize>([u8; B]);

impl<const B: BlockSize> BlockValue<B> {
    /// Instantiates a `BlockValue` from an array of `B` bytes.
    pub fn new(data: [u8; B]) -> Self {
        Self(data)
    }

    /// The payload bytes.
    pub fn as_bytes(&self) -> &[u8; B] {
        &self.0
    }
}

impl<const B: BlockSize> Default for BlockValue<B> {
    fn default() -> Self {
        BlockValue::<B>([0u8; B])
    }
}

impl<const B: BlockSize> From<BlockValue<B>> for [u8; B] {
    fn from(value: BlockValue<B>) -> Self {
        value.0
    }
}

impl<const B: BlockSize> Distribution<BlockValue<B>> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BlockValue<B> {
        let mut result = BlockValue::default();
        for i in 0..B {
            result.0[i] = rng.gen();
        }
        result
    }
}

/// A block pairs a logical address with its payload. Addresses in `[0, N)`
/// are real; [`DUMMY_ADDRESS`] marks a dummy whose payload bytes are
/// arbitrary.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Block<const B: BlockSize> {
    /// The logical address of this block.
    pub address: Address,
    /// The payload of this block.
    pub value: BlockValue<B>,
}

impl<const B: BlockSize> Block<B> {
    /// A block holding `value` at logical address `address`.
    pub fn new(address: Address, value: BlockValue<B>) -> Self {
        Self { address, value }
    }

    /// A dummy block.
    pub fn dummy() -> Self {
        Self {
            address: DUMMY_ADDRESS,
            value: BlockValue::default(),
        }
    }

    /// Whether this block is a dummy.
    pub fn is_dummy(&self) -> bool {
        self.address == DUMMY_ADDRESS
    }
}

impl<const B: BlockSize> std::fmt::Debug for Block<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dummy() {
            write!(f, "Block::Dummy")
        } else {
            f.debug_struct("Block")
                .field("address", &self.address)
                .field("value", &self.value)
                .finish()
        }
    }
}

/// A Path ORAM bucket: exactly `Z` blocks stored at one tree node.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bucket<const B: BlockSize, const Z: BucketSize> {
    /// The blocks stored by this bucket.
    pub blocks: [Block<B>; Z],
}

impl<const B: BlockSize, const Z: BucketSize> Default for Bucket<B, Z> {
    fn default() -> Self {
        Self {
            blocks: [Block::<B>::dummy(); Z],
        }
    }
}

impl<const B: BlockSize, const Z: BucketSize> std::fmt::Debug for Bucket<B, Z> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.blocks.iter().all(Block::is_dummy) {
            write!(f, "Bucket::Dummy")
        } else {
            f.debug_struct("Bucket")
                .field("blocks", &self.blocks)
                .finish()
        }
    }
}

impl<const B: BlockSize, const Z: BucketSize> Bucket<B, Z> {
    /// The encoded size of a bucket. Every bucket encodes to exactly this
    /// many bytes, so real and dummy buckets are indistinguishable by size.
    pub const ENCODED_LEN: usize = Z * (BLOCK_HEADER_LEN + B);

    /// Encodes this bucket as `Z` fixed-length `(address, payload)` records.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);
        for block in &self.blocks {
            bytes.extend_from_slice(&block.address.to_be_bytes());
            bytes.extend_from_slice(block.value.as_bytes());
        }
        bytes
    }

    /// Decodes a bucket previously produced by [`Bucket::encode`]. `node` is
    /// used only to report where corruption was found.
    pub fn decode(node: TreeIndex, bytes: &[u8]) -> Result<Self, OramError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(OramError::CorruptBucket {
                node,
                reason: "encoded bucket has the wrong length",
            });
        }

        let mut bucket = Bucket::default();
        for (slot, record) in bytes.chunks_exact(BLOCK_HEADER_LEN + B).enumerate() {
            let mut header = [0u8; BLOCK_HEADER_LEN];
            header.copy_from_slice(&record[..BLOCK_HEADER_LEN]);
            let mut data = [0u8; B];
            data.copy_from_slice(&record[BLOCK_HEADER_LEN..]);
            bucket.blocks[slot] = Block::new(Address::from_be_bytes(header), BlockValue::new(data));
        }
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn default_bucket_is_all_dummies() {
        let bucket = Bucket::<4, 3>::default();
        assert!(bucket.blocks.iter().all(Block::is_dummy));
    }

    #[test]
    fn encoding_is_length_preserving() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut bucket = Bucket::<16, 4>::default();
        assert_eq!(bucket.encode().len(), Bucket::<16, 4>::ENCODED_LEN);

        bucket.blocks[0] = Block::new(7, rng.gen());
        bucket.blocks[2] = Block::new(13, rng.gen());
        assert_eq!(bucket.encode().len(), Bucket::<16, 4>::ENCODED_LEN);
    }

    #[test]
    fn encode_decode_preserves_blocks() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut bucket = Bucket::<16, 4>::default();
        bucket.blocks[1] = Block::new(42, rng.gen());
        bucket.blocks[3] = Block::new(0, rng.gen());

        let decoded = Bucket::<16, 4>::decode(5, &bucket.encode()).unwrap();
        assert_eq!(decoded, bucket);
    }

    #[test]
    fn truncated_encoding_is_rejected() {
        let bucket = Bucket::<16, 4>::default();
        let mut bytes = bucket.encode();
        bytes.pop();

        let result = Bucket::<16, 4>::decode(5, &bytes);
        assert!(matches!(
            result,
            Err(OramError::CorruptBucket { node: 5, .. })
        ));
    }
}
