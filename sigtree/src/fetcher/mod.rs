// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The transport collaborator. A [Fetcher] retrieves the anchored root hash,
//! merkle paths, sigchains and key bundles; nothing it returns is trusted until
//! the verifier has checked it.
//!
//! An in-memory implementation is provided in [memory].

use crate::errors::{SigtreeError, TransportError};
use async_trait::async_trait;
use sigtree_core::hash::{Sha256Hash, TreeDigest};
use sigtree_core::{PathAndSigs, RawLink, Uid};

pub mod memory;


/// Who a merkle path lookup is for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Look up by UID
    Uid(Uid),
    /// Look up by (lowercased) username
    Username(String),
}

impl Subject {
    /// Dispatch a caller-supplied string: anything shaped like a UID is a UID,
    /// everything else must be a plausible username
    pub fn parse(input: &str) -> Result<Self, SigtreeError> {
        let input = input.trim();
        if Uid::is_uid_like(input) {
            return Uid::parse(input)
                .map(Subject::Uid)
                .map_err(SigtreeError::InvalidInput);
        }
        if input.is_empty()
            || !input
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SigtreeError::InvalidInput(format!(
                "{input:?} is neither a UID nor a username"
            )));
        }
        Ok(Subject::Username(input.to_lowercase()))
    }

    /// The string the server indexes this subject by
    pub fn as_str(&self) -> &str {
        match self {
            Subject::Uid(uid) => uid.as_str(),
            Subject::Username(name) => name,
        }
    }
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Subject::Uid(uid) => write!(f, "uid {uid}"),
            Subject::Username(name) => write!(f, "username {name}"),
        }
    }
}

/// A merkle path lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    /// The user
    pub subject: Subject,
    /// Hash of the anchored root signature to walk from, for historical lookups
    pub anchor: Option<Sha256Hash>,
    /// Seqno of the latest root, so the server can attach the skip walk's
    /// intermediate roots
    pub last: Option<u64>,
}

impl PathQuery {
    /// A lookup against the server's latest root
    pub fn latest(subject: Subject) -> Self {
        Self {
            subject,
            anchor: None,
            last: None,
        }
    }

    /// A lookup against the root anchored at `anchor`, with intermediates up to
    /// the latest root `last`
    pub fn historical(uid: Uid, anchor: Sha256Hash, last: u64) -> Self {
        Self {
            subject: Subject::Uid(uid),
            anchor: Some(anchor),
            last: Some(last),
        }
    }

    /// The query string parameters of the identity server's `merkle/path.json`
    pub fn to_query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = match &self.subject {
            Subject::Uid(uid) => vec![("uid", uid.to_string())],
            Subject::Username(name) => vec![("username", name.clone())],
        };
        if let Some(anchor) = &self.anchor {
            params.push(("start_hash256", anchor.to_hex()));
        }
        if let Some(last) = self.last {
            params.push(("last", last.to_string()));
        }
        params.push(("load_reset_chain", "1".to_string()));
        params
    }
}

/// Retrieves everything verification needs. Implementations return what the
/// remote side said verbatim; a non-zero `status` in a [PathAndSigs] is
/// surfaced by the verifier.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The SHA-256 of the root signature most recently anchored to the blockchain
    async fn fetch_latest_anchor_hash(&self) -> Result<Sha256Hash, TransportError>;

    /// A merkle path (plus root signatures, reset chain and skip intermediates)
    async fn fetch_merkle_path(&self, query: &PathQuery) -> Result<PathAndSigs, TransportError>;

    /// The user's sigchain, oldest link first
    async fn fetch_sig_chain(&self, uid: &Uid) -> Result<Vec<RawLink>, TransportError>;

    /// Every public key bundle the user ever had
    async fn fetch_public_keys(&self, uid: &Uid) -> Result<Vec<String>, TransportError>;
}
