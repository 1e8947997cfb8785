// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Walks merkle paths from a trusted root down to a leaf

use super::VerificationError;
use crate::hash::{Sha256Hash, Sha512Hash, TreeDigest};
use crate::types::{username_hash, ChainTails, NodeType, NodeValue, PathNode, Uid};

/// Walk `path` from the node hashing to `expected` down to the leaf holding
/// `key`, returning the leaf's value for `key`.
///
/// Every node's prefix must be a prefix of `key`, and interior node `i`
/// (zero-based) points at its child through the prefix `key[..i + 1]`.
pub fn walk_path<H: TreeDigest>(
    expected: H,
    key: &str,
    path: &[PathNode],
) -> Result<serde_json::Value, VerificationError> {
    let mut expected = expected;
    for (i, step) in path.iter().enumerate() {
        if !key.starts_with(step.prefix.as_str()) {
            return Err(VerificationError::TreeIntegrity(format!(
                "Node {i} has prefix {:?} which doesn't lead to {key}",
                step.prefix
            )));
        }

        let got = H::digest(step.node.val.as_bytes());
        if got != expected {
            return Err(VerificationError::TreeIntegrity(format!(
                "Hash mismatch at node {i}: expected {expected} but got {got}"
            )));
        }
        if let Some(claimed) = &step.node.hash {
            if !claimed.eq_ignore_ascii_case(&got.to_hex()) {
                return Err(VerificationError::TreeIntegrity(format!(
                    "Node {i} claims hash {claimed} but hashes to {got}"
                )));
            }
        }

        let value: NodeValue = serde_json::from_str(&step.node.val).map_err(|err| {
            VerificationError::TreeIntegrity(format!("Node {i} is not a valid node: {err}"))
        })?;

        match step.node.node_type {
            NodeType::Leaf => {
                return value.tab.get(key).cloned().ok_or_else(|| {
                    VerificationError::TreeIntegrity(format!("Leaf doesn't contain {key}"))
                });
            }
            NodeType::Interior => {
                let prefix = key.get(..i + 1).ok_or_else(|| {
                    VerificationError::TreeIntegrity(format!("Path is deeper than the key {key}"))
                })?;
                let child = value
                    .tab
                    .get(prefix)
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| {
                        VerificationError::TreeIntegrity(format!(
                            "Node {i} has no child at prefix {prefix}"
                        ))
                    })?;
                expected = H::try_parse_hex(child).map_err(|err| {
                    VerificationError::TreeIntegrity(format!("Node {i} child hash: {err}"))
                })?;
            }
        }
    }
    Err(VerificationError::TreeIntegrity(format!(
        "Walked off the end of the tree looking for {key}"
    )))
}

/// Walk the main tree for `uid` and decode the chain tails in its leaf
pub fn walk_to_leaf(
    root: Sha512Hash,
    uid: &Uid,
    path: &[PathNode],
) -> Result<ChainTails, VerificationError> {
    let leaf = walk_path(root, uid.as_str(), path)?;
    ChainTails::from_leaf(&leaf).map_err(VerificationError::TreeIntegrity)
}

/// Resolve a username to the UID the server claims for it. Modern UIDs derive
/// from the username hash; anything else must be proven through the legacy
/// username tree.
pub fn extract_uid(
    username: &str,
    claimed: Option<&Uid>,
    legacy_root: Sha256Hash,
    uid_proof_path: &[PathNode],
) -> Result<Uid, VerificationError> {
    let hash = username_hash(username);
    let claimed = claimed.ok_or_else(|| {
        VerificationError::TreeIntegrity(format!("Server didn't return a UID for {username}"))
    })?;
    if Uid::from_username_hash(&hash) == *claimed {
        return Ok(claimed.clone());
    }

    let leaf = walk_path(legacy_root, &hash.to_hex(), uid_proof_path)?;
    match leaf.as_str() {
        Some(uid) if uid == claimed.as_str() => Ok(claimed.clone()),
        Some(uid) => Err(VerificationError::TreeIntegrity(format!(
            "Legacy tree maps {username} to {uid}, not {claimed}"
        ))),
        None => Err(VerificationError::TreeIntegrity(format!(
            "Legacy tree leaf for {username} is not a UID"
        ))),
    }
}
