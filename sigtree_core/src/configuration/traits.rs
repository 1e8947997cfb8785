// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Defines the configuration trait for pinning the trust anchors of a deployment

use crate::types::Kid;

/// Trait for pinning the trust anchors a verifier checks against. Nothing the
/// server returns can override these.
pub trait Configuration: Clone + Send + Sync + 'static {
    /// The key which signs every merkle root
    fn root_signing_kid() -> Kid;

    /// The blockchain account whose transactions carry the anchored root hash
    fn anchor_account() -> &'static str;

    /// Base URI of the blockchain's query API
    fn anchor_api_uri() -> &'static str;

    /// Base URI of the identity server's API
    fn server_api_uri() -> &'static str;

    /// `(uid, seqno)` pairs where an eldest link that predates reset
    /// tracking starts a new subchain despite matching the previous eldest key
    fn hardcoded_resets() -> &'static [(&'static str, u64)];

    /// Whether or not the link at `seqno` of `uid` is a hardcoded reset point
    fn is_hardcoded_reset(uid: &str, seqno: u64) -> bool {
        Self::hardcoded_resets()
            .iter()
            .any(|(u, s)| *u == uid && *s == seqno)
    }
}
