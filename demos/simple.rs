// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A very simple demonstration of the use of Path ORAM.

extern crate path_oram;

use path_oram::{BlockValue, MemoryStore, OramError, PathOram};
use rand::rngs::OsRng;

fn main() -> Result<(), OramError> {
    let mut oram: PathOram<64, 4, MemoryStore<64, 4>, OsRng> =
        PathOram::new(MemoryStore::new(), 64, OsRng)?;

    oram.write(0, BlockValue::new([1u8; 64]))?;
    println!("{:?}", oram.read(0)?);
    Ok(())
}
