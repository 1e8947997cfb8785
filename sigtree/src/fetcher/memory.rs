// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An in-memory fetcher, for tests and for replaying captured server responses

use super::{Fetcher, PathQuery};
use crate::errors::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use sigtree_core::hash::Sha256Hash;
use sigtree_core::{PathAndSigs, RawLink, Uid};
use std::sync::Arc;
use tokio::sync::RwLock;

type PathKey = (String, Option<Sha256Hash>);

/// Serves whatever it was loaded with. Paths are keyed by the subject string
/// (UID or username) and the anchor they were requested against.
#[derive(Default, Clone, Debug)]
pub struct InMemoryFetcher {
    anchor: Arc<RwLock<Option<Sha256Hash>>>,
    paths: Arc<DashMap<PathKey, PathAndSigs>>,
    chains: Arc<DashMap<Uid, Vec<RawLink>>>,
    keys: Arc<DashMap<Uid, Vec<String>>>,
}

impl InMemoryFetcher {
    /// Creates an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hash the "blockchain" reports as most recently anchored
    pub async fn set_anchor(&self, anchor: Sha256Hash) {
        *self.anchor.write().await = Some(anchor);
    }

    /// Serve `path` for lookups of `subject` against `anchor` (or the latest
    /// root when `None`), replacing anything already there
    pub fn set_path(&self, subject: &str, anchor: Option<Sha256Hash>, path: PathAndSigs) {
        self.paths.insert((subject.to_string(), anchor), path);
    }

    /// A copy of what would be served for `subject` against `anchor`
    pub fn get_path(&self, subject: &str, anchor: Option<Sha256Hash>) -> Option<PathAndSigs> {
        self.paths
            .get(&(subject.to_string(), anchor))
            .map(|entry| entry.value().clone())
    }

    /// Serve `links` as `uid`'s sigchain
    pub fn set_sig_chain(&self, uid: &Uid, links: Vec<RawLink>) {
        self.chains.insert(uid.clone(), links);
    }

    /// Serve `bundles` as `uid`'s public keys
    pub fn set_public_keys(&self, uid: &Uid, bundles: Vec<String>) {
        self.keys.insert(uid.clone(), bundles);
    }

    /// Forget everything
    pub async fn clear(&self) {
        *self.anchor.write().await = None;
        self.paths.clear();
        self.chains.clear();
        self.keys.clear();
    }
}

#[async_trait]
impl Fetcher for InMemoryFetcher {
    async fn fetch_latest_anchor_hash(&self) -> Result<Sha256Hash, TransportError> {
        let anchor = *self.anchor.read().await;
        anchor.ok_or_else(|| TransportError::NotFound("no anchored root".to_string()))
    }

    async fn fetch_merkle_path(&self, query: &PathQuery) -> Result<PathAndSigs, TransportError> {
        self.get_path(query.subject.as_str(), query.anchor)
            .ok_or_else(|| TransportError::NotFound(format!("merkle path for {}", query.subject)))
    }

    async fn fetch_sig_chain(&self, uid: &Uid) -> Result<Vec<RawLink>, TransportError> {
        self.chains
            .get(uid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::NotFound(format!("sigchain for {uid}")))
    }

    async fn fetch_public_keys(&self, uid: &Uid) -> Result<Vec<String>, TransportError> {
        // a user without keys is not an error
        Ok(self
            .keys
            .get(uid)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
