// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verifies, without trusting the identity server, that a user's sigchain is
//! consistent with the server's blockchain-anchored merkle tree.
//!
//! # Overview
//! The identity server publishes a merkle tree mapping every UID to the tail of
//! that user's sigchain, and periodically signs the tree's root. The hash of one
//! of these root signatures is posted to a public blockchain, which makes the
//! root it signs tamper-evident. Each signed root also carries a table of
//! "skips": hashes of earlier roots at power-of-two distances.
//!
//! Verifying a user then proceeds in a fixed order:
//! - Fetch the latest merkle path for the user and check the root key's signature on it.
//! - Resolve a username to a UID, through the legacy UID tree if need be.
//! - Fetch the anchored root hash and the path from the anchored root, and check it.
//! - Walk the skip tables from the latest root back to the anchored one in O(log n) hops.
//! - Walk both paths down to the user's leaf, and check that the chain only grew.
//! - Fetch the sigchain and check every link against its successor and the tree.
//! - Check the reset chain against the leaf.
//! - Optionally fetch the user's key bundles and replay the chain's current epoch
//!   into the set of live keys.
//!
//! Every stage fails fast with an error naming the offending key, seqno or hash.
//! The only non-fatal outcome is freshness lag, which is attached to a
//! successful result as warnings.
//!
//! ## Setup
//! A [Verifier] needs a [Configuration] (which pins the root signing key) and a
//! [fetcher::Fetcher] for transport. An in-memory fetcher is provided for tests
//! and for replaying captured responses:
//! ```no_run
//! use sigtree::fetcher::memory::InMemoryFetcher;
//! use sigtree::{KeybaseV1Configuration, Verifier, VerifyMode};
//!
//! # async fn example() -> Result<(), sigtree::errors::SigtreeError> {
//! let fetcher = InMemoryFetcher::new();
//! let verifier = Verifier::<KeybaseV1Configuration, _>::new(fetcher);
//! let verified = verifier.verify("max", VerifyMode::Full).await?;
//! for warning in &verified.warnings {
//!     println!("{warning}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress
//! Verification reports its checkpoints to a [reporter::Reporter]. The default
//! is silent; [reporter::LogReporter] forwards them to the `log` facade.
//!
//! ## Concurrency
//! A verification holds no state shared with other verifications, so several
//! users may be verified concurrently from separate tasks. The library doesn't
//! coordinate that itself, nor does it retry failed fetches.

#![warn(missing_docs)]
#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod errors;
pub mod fetcher;
pub mod reporter;
pub mod verifier;

#[cfg(test)]
pub mod test_utils;
#[cfg(test)]
mod tests;

pub use sigtree_core::{
    configuration, crypto, hash, keys, player, types, verify, ChainMaxes, Configuration,
    FreshnessWarning, KeybaseV1Configuration, UserSigChain, VerificationError,
};
pub use verifier::{VerifiedUser, Verifier, VerifyMode};
