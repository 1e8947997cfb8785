// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Contains the tests for the verification pipeline, run against a simulated
//! identity server

mod test_errors;

use crate::fetcher::memory::InMemoryFetcher;
use crate::Configuration;
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};
use sigtree_core::crypto::envelope::dearmor;
use sigtree_core::crypto::{nacl, CryptoError};
use sigtree_core::hash::{sha256, Sha256Hash, Sha512Hash};
use sigtree_core::test_utils::{build_path, root_payload, sign_root, ChainBuilder};
use sigtree_core::types::{username_hash, Kid, PathAndSigs, RawLink, SignedRoot, Status, Uid};
use sigtree_core::verify::generate_log_sequence;
use std::collections::{BTreeMap, BTreeSet};

// ============================================
// Configuration and keys
// ============================================

pub(crate) fn root_key() -> SigningKey {
    SigningKey::from_bytes(&[0x42; 32])
}

pub(crate) fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub(crate) fn kid(key: &SigningKey) -> Kid {
    nacl::signing_kid(&key.verifying_key())
}

pub(crate) fn enc_kid(seed: u8) -> Kid {
    nacl::encryption_kid(&[seed; 32])
}

#[derive(Clone)]
pub(crate) struct TestConfig;

impl Configuration for TestConfig {
    fn root_signing_kid() -> Kid {
        kid(&root_key())
    }
    fn anchor_account() -> &'static str {
        "GTESTANCHOR"
    }
    fn anchor_api_uri() -> &'static str {
        "http://localhost:8000"
    }
    fn server_api_uri() -> &'static str {
        "http://localhost:3000/_/api/1.0/"
    }
    fn hardcoded_resets() -> &'static [(&'static str, u64)] {
        &[]
    }
}

// ============================================
// A simulated server
// ============================================

/// What the server publishes about one user
pub(crate) struct Publication {
    pub uid: Uid,
    pub username: String,
    /// Leaf committed to by the latest root
    pub latest_leaf: Value,
    /// Leaf committed to by the anchored root
    pub anchored_leaf: Value,
    pub latest_seqno: u64,
    pub anchored_seqno: u64,
    pub reset_chain: Option<Vec<String>>,
    pub links: Vec<RawLink>,
    pub bundles: Vec<String>,
    /// Key for signing tree roots
    pub root_key: SigningKey,
}

/// A published user along with the responses the server serves
pub(crate) struct World {
    pub fetcher: InMemoryFetcher,
    pub uid: Uid,
    pub username: String,
    pub anchor: Sha256Hash,
    pub latest: PathAndSigs,
    pub historical: PathAndSigs,
    pub roots: Vec<String>,
}

impl Publication {
    /// Publish `chain` as it stands, already anchored, 3 roots ago
    pub fn of(chain: &ChainBuilder, username: &str) -> Self {
        let kids: BTreeSet<String> = chain
            .links()
            .iter()
            .map(|link| link.kid.as_str().to_string())
            .collect();
        Self {
            uid: chain.uid().clone(),
            username: username.to_string(),
            latest_leaf: chain.leaf(),
            anchored_leaf: chain.leaf(),
            latest_seqno: 10,
            anchored_seqno: 7,
            reset_chain: chain.reset_chain(),
            links: chain.links().to_vec(),
            bundles: kids.into_iter().collect(),
            root_key: root_key(),
        }
    }

    /// Sign everything and load it into a fresh in-memory fetcher
    pub async fn publish(&self) -> Result<World, CryptoError> {
        let (anchored_root, anchored_path) =
            build_path::<Sha512Hash>(self.uid.as_str(), self.anchored_leaf.clone(), 4);
        let (latest_root, latest_path) =
            build_path::<Sha512Hash>(self.uid.as_str(), self.latest_leaf.clone(), 4);
        let (legacy_root, uid_proof_path) = build_path::<Sha256Hash>(
            &username_hash(&self.username).to_string(),
            json!(self.uid.as_str()),
            3,
        );

        let mut roots: Vec<String> = Vec::new();
        let mut hashes: Vec<Sha256Hash> = Vec::new();
        for seqno in 1..=self.latest_seqno {
            let mut skips = BTreeMap::new();
            let mut jump = 1;
            while jump < seqno {
                skips.insert(seqno - jump, hashes[(seqno - jump - 1) as usize]);
                jump <<= 1;
            }
            let main = if seqno <= self.anchored_seqno {
                &anchored_root
            } else {
                &latest_root
            };
            let payload = root_payload(seqno, main, &legacy_root, &skips);
            hashes.push(sha256(payload.as_bytes()));
            roots.push(payload);
        }

        let signed_latest = self.sign(self.latest_seqno, &roots)?;
        let signed_anchored = self.sign(self.anchored_seqno, &roots)?;
        let anchor = anchor_of(&signed_anchored)?;

        let latest = PathAndSigs {
            status: Status::default(),
            root: signed_latest,
            path: latest_path,
            uid: Some(self.uid.clone()),
            uid_proof_path,
            reset_chain: self.reset_chain.clone(),
            skips: vec![],
        };
        let historical = PathAndSigs {
            status: Status::default(),
            root: signed_anchored,
            path: anchored_path,
            uid: Some(self.uid.clone()),
            uid_proof_path: vec![],
            reset_chain: self.reset_chain.clone(),
            skips: intermediates(&roots, self.latest_seqno, self.anchored_seqno),
        };

        let fetcher = InMemoryFetcher::new();
        fetcher.set_anchor(anchor).await;
        fetcher.set_path(self.uid.as_str(), None, latest.clone());
        fetcher.set_path(&self.username, None, latest.clone());
        fetcher.set_path(self.uid.as_str(), Some(anchor), historical.clone());
        fetcher.set_sig_chain(&self.uid, self.links.clone());
        fetcher.set_public_keys(&self.uid, self.bundles.clone());

        Ok(World {
            fetcher,
            uid: self.uid.clone(),
            username: self.username.clone(),
            anchor,
            latest,
            historical,
            roots,
        })
    }

    fn sign(&self, seqno: u64, roots: &[String]) -> Result<SignedRoot, CryptoError> {
        sign_root(&self.root_key, seqno, &roots[(seqno - 1) as usize])
    }
}

impl World {
    /// Serve `latest` for both the UID and the username
    pub fn serve_latest(&self, latest: PathAndSigs) {
        self.fetcher.set_path(self.uid.as_str(), None, latest.clone());
        self.fetcher.set_path(&self.username, None, latest);
    }

    /// Serve `historical` for the anchored lookup
    pub fn serve_historical(&self, historical: PathAndSigs) {
        self.fetcher
            .set_path(self.uid.as_str(), Some(self.anchor), historical);
    }
}

/// Hash of the de-armored root signature, as the blockchain would record it
pub(crate) fn anchor_of(root: &SignedRoot) -> Result<Sha256Hash, CryptoError> {
    let sig = root
        .sigs
        .values()
        .next()
        .ok_or_else(|| CryptoError::Decode("unsigned root".to_string()))?;
    Ok(sha256(&dearmor(&sig.sig)?))
}

/// The serialized roots visited walking the skip tables from `latest` to `historical`
fn intermediates(roots: &[String], latest: u64, historical: u64) -> Vec<String> {
    let mut out = Vec::new();
    let mut curr = latest;
    for jump in generate_log_sequence(latest - historical) {
        curr -= jump;
        if curr != historical {
            out.push(roots[(curr - 1) as usize].clone());
        }
    }
    out
}
