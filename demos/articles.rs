// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Serving a small article collection obliviously out of an on-disk store.

extern crate path_oram;

use path_oram::{AccessLog, Document, Library, OramError, SledStore};
use rand::rngs::OsRng;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

fn main() -> Result<(), OramError> {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("logger initialization");

    let directory = tempfile::tempdir().expect("temporary directory");
    let store: SledStore<4096, 4> = SledStore::open(directory.path().join("buckets"))?;

    let documents = vec![
        Document::from_jsonl_line(r#"{"title": "Oblivious RAM", "text": "hides access patterns"}"#)?,
        Document::from_jsonl_line(r#"{"title": "Path ORAM", "text": "a simple ORAM protocol"}"#)?,
    ];
    let mut library = Library::ingest(store, &documents, OsRng)?;

    let article = library.read("Path ORAM")?;
    println!("{}", String::from_utf8_lossy(&article));
    println!(
        "server observed {} bucket accesses",
        library.engine.store.access_log().len()
    );
    Ok(())
}
