// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The document layer: titled documents chunked into ORAM blocks.
//!
//! Documents are split into `B`-byte blocks (the last chunk right-padded
//! with [`FILLER`]), written through the engine at consecutive addresses,
//! and tracked in a title index so they can be reassembled on read.

use crate::{
    bucket::BlockValue, path_oram::PathOram, store::BucketStore, tree, Address, BlockSize,
    BucketSize, OramError,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The byte used to right-pad the last chunk of a document to a full block.
pub const FILLER: u8 = b' ';

/// A titled document to be ingested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// The lookup key for this document.
    pub title: String,
    /// The document contents.
    pub body: Vec<u8>,
}

impl Document {
    /// A document with the given title and body.
    pub fn new(title: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Parses one line of a JSON-lines article dump. The line's `title`
    /// field names the document; the raw line is stored as its body.
    pub fn from_jsonl_line(line: &str) -> Result<Self, OramError> {
        #[derive(Deserialize)]
        struct Header {
            title: String,
        }

        let line = line.trim();
        let header: Header = serde_json::from_str(line)?;
        Ok(Self {
            title: header.title,
            body: line.as_bytes().to_vec(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct LibrarySnapshot {
    engine: Vec<u8>,
    index: BTreeMap<String, Vec<Address>>,
}

/// A collection of documents served obliviously out of a Path ORAM engine.
#[derive(Debug)]
pub struct Library<const B: BlockSize, const Z: BucketSize, S, R> {
    /// The underlying engine (public for tests and audits of the access log).
    pub engine: PathOram<B, Z, S, R>,
    index: BTreeMap<String, Vec<Address>>,
}

impl<const B: BlockSize, const Z: BucketSize, S, R> Library<B, Z, S, R>
where
    S: BucketStore<B, Z>,
    R: RngCore + CryptoRng,
{
    /// Builds a library over `store` holding `documents`, sizing the engine
    /// to the total number of chunks and assigning addresses consecutively
    /// from 0. The access log accumulated by ingestion is cleared.
    pub fn ingest(store: S, documents: &[Document], rng: R) -> Result<Self, OramError> {
        if B == 0 {
            return Err(OramError::InvalidConfiguration {
                reason: "block and bucket sizes must be nonzero",
            });
        }

        let total_chunks: u64 = documents
            .iter()
            .map(|document| document.body.chunks(B).count() as u64)
            .sum();
        let num_blocks = total_chunks.max(tree::MIN_BLOCKS);

        let mut engine = PathOram::new(store, num_blocks, rng)?;
        let mut index = BTreeMap::new();
        let mut next_address: Address = 0;

        for document in documents {
            log::debug!("ingesting document -- {}", document.title);
            let mut addresses = Vec::new();
            for chunk in document.body.chunks(B) {
                let mut data = [FILLER; B];
                data[..chunk.len()].copy_from_slice(chunk);
                engine.write(next_address, BlockValue::new(data))?;
                addresses.push(next_address);
                next_address += 1;
            }
            index.insert(document.title.clone(), addresses);
        }

        engine.store.clear_access_log();
        Ok(Self { engine, index })
    }

    /// Reassembles the document stored under `title`. Trailing [`FILLER`]
    /// bytes are stripped, so a body that genuinely ends in filler loses
    /// that tail. An unknown title is a recoverable lookup failure.
    pub fn read(&mut self, title: &str) -> Result<Vec<u8>, OramError> {
        let addresses = self
            .index
            .get(title)
            .ok_or_else(|| OramError::UnknownTitle {
                title: title.to_string(),
            })?
            .clone();

        let mut bytes = Vec::with_capacity(addresses.len() * B);
        for address in addresses {
            let value = self
                .engine
                .read(address)?
                .ok_or(OramError::MissingBlock { address })?;
            bytes.extend_from_slice(value.as_bytes());
        }
        while bytes.last() == Some(&FILLER) {
            bytes.pop();
        }
        Ok(bytes)
    }

    /// The ingested titles, in order.
    pub fn titles(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    /// The title index: every document's block addresses, in read order.
    pub fn index(&self) -> &BTreeMap<String, Vec<Address>> {
        &self.index
    }

    /// Serializes the title index together with the engine's client state.
    pub fn snapshot(&self) -> Result<Vec<u8>, OramError> {
        Ok(bincode::serialize(&LibrarySnapshot {
            engine: self.engine.snapshot()?,
            index: self.index.clone(),
        })?)
    }

    /// Rebuilds a library from a [`Library::snapshot`], bound to a store
    /// that already holds the corresponding tree.
    pub fn restore(store: S, bytes: &[u8], rng: R) -> Result<Self, OramError> {
        let snapshot: LibrarySnapshot = bincode::deserialize(bytes)?;
        Ok(Self {
            engine: PathOram::restore(store, &snapshot.engine, rng)?,
            index: snapshot.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccessLog, MemoryStore};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    type MemoryLibrary<const B: BlockSize, const Z: BucketSize> =
        Library<B, Z, MemoryStore<B, Z>, StdRng>;

    fn ingest<const B: BlockSize, const Z: BucketSize>(
        documents: &[Document],
    ) -> MemoryLibrary<B, Z> {
        Library::ingest(MemoryStore::new(), documents, StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn short_and_multi_block_documents_round_trip() {
        // A 10-byte article and a 5000-byte article at B = 4096.
        let mut rng = StdRng::seed_from_u64(1);
        let long_body: Vec<u8> = (0..5000).map(|_| rng.gen_range(b'a'..=b'z')).collect();
        let documents = vec![
            Document::new("short", b"tiny entry".to_vec()),
            Document::new("long", long_body.clone()),
        ];

        let mut library = ingest::<4096, 4>(&documents);
        assert_eq!(library.read("short").unwrap(), b"tiny entry".to_vec());
        assert_eq!(library.read("long").unwrap(), long_body);
    }

    #[test]
    fn addresses_are_assigned_contiguously_from_zero() {
        let documents = vec![
            Document::new("first", vec![b'x'; 9]),
            Document::new("second", vec![b'y'; 4]),
        ];
        let library = ingest::<4, 2>(&documents);

        assert_eq!(library.index()["first"], vec![0, 1, 2]);
        assert_eq!(library.index()["second"], vec![3]);
        assert_eq!(library.engine.block_capacity(), 4);
    }

    #[test]
    fn ingestion_leaves_a_clean_access_log() {
        let documents = vec![Document::new("only", vec![b'x'; 64])];
        let mut library = ingest::<16, 2>(&documents);
        assert!(library.engine.store.access_log().is_empty());

        library.read("only").unwrap();
        let path_len = library.engine.geometry().height() as usize + 1;
        assert_eq!(library.engine.store.access_log().len(), 4 * 2 * path_len);
    }

    #[test]
    fn unknown_titles_are_recoverable() {
        let documents = vec![Document::new("present", b"here".to_vec())];
        let mut library = ingest::<4, 2>(&documents);

        assert!(matches!(
            library.read("absent"),
            Err(OramError::UnknownTitle { .. })
        ));
        // The failed lookup does not disturb later reads.
        assert_eq!(library.read("present").unwrap(), b"here".to_vec());
    }

    #[test]
    fn jsonl_lines_become_documents() {
        let line = r#"{"title": "Rust", "text": "a systems language"}"#;
        let document = Document::from_jsonl_line(line).unwrap();
        assert_eq!(document.title, "Rust");
        assert_eq!(document.body, line.as_bytes());

        assert!(Document::from_jsonl_line("not json").is_err());
    }

    #[test]
    fn titles_iterate_in_order() {
        let documents = vec![
            Document::new("b", b"2".to_vec()),
            Document::new("a", b"1".to_vec()),
        ];
        let library = ingest::<4, 2>(&documents);
        assert_eq!(library.titles().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_restore_preserves_the_collection() {
        let documents = vec![
            Document::new("alpha", vec![b'a'; 100]),
            Document::new("beta", vec![b'b'; 17]),
        ];
        let mut library = ingest::<16, 2>(&documents);
        assert_eq!(library.read("alpha").unwrap(), vec![b'a'; 100]);

        let snapshot = library.snapshot().unwrap();
        let store = library.engine.into_store();
        let mut restored: MemoryLibrary<16, 2> =
            Library::restore(store, &snapshot, StdRng::seed_from_u64(9)).unwrap();

        assert_eq!(restored.read("alpha").unwrap(), vec![b'a'; 100]);
        assert_eq!(restored.read("beta").unwrap(), vec![b'b'; 17]);
    }
}
