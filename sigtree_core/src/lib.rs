// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Core types and verification routines for the `sigtree` crate.
//! Mainly contains (1) hashing utilities, (2) type definitions for the identity
//! server's merkle tree and sigchain payloads, (3) the structural verifiers for
//! merkle paths, skip chains, reset chains and sigchain links, and (4) the
//! sigchain player which replays a verified chain into a user's current keys.
//!
//! Nothing in this crate performs I/O. Fetching is left to the `sigtree` crate,
//! which feeds the payloads it retrieves through these routines in order.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod configuration;
pub mod crypto;
pub mod freshness;
pub mod hash;
pub mod keys;
pub mod player;
pub mod reporter;
pub mod utils;
pub mod verify;

#[cfg(any(test, feature = "public_tests"))]
pub mod test_utils;

pub mod types;
pub use types::*;

pub use configuration::{Configuration, KeybaseV1Configuration};
pub use freshness::{ChainMaxes, FreshnessWarning};
pub use verify::VerificationError;
