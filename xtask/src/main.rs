// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Developer tasks for the sigtree workspace. Run with `cargo xtask <task>`.
//!
//! - `coverage`: run the test suite under source-based coverage
//! - `ci`: formatting, clippy and tests, as run in CI

fn main() -> Result<(), anyhow::Error> {
    xtaskops::tasks::main()
}
