// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Merkle tree payloads: paths, signed roots and the chain tails stored in leaves

use crate::hash::{Sha256Hash, Sha512Hash, TreeDigest};
use crate::types::{Kid, Uid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The tag of a merkle node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeType {
    /// Maps key prefixes to child hashes
    Interior = 1,
    /// Maps full keys to values
    Leaf = 2,
}

impl TryFrom<u8> for NodeType {
    type Error = String;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Interior),
            2 => Ok(Self::Leaf),
            other => Err(format!("Unknown merkle node type {other}")),
        }
    }
}

impl From<NodeType> for u8 {
    fn from(t: NodeType) -> Self {
        t as u8
    }
}

/// A node as carried along a merkle path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    /// The hex hash the server claims for `val`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// The serialized node, exactly as it was hashed
    pub val: String,
    /// Interior or leaf
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

/// One step of a merkle path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    /// The key prefix which leads to this node
    pub prefix: String,
    /// The node itself
    pub node: MerkleNode,
}

/// The parsed contents of [MerkleNode::val]
#[derive(Debug, Clone, Deserialize)]
pub struct NodeValue {
    /// prefix -> child hash for interior nodes, key -> value for leaves
    pub tab: BTreeMap<String, serde_json::Value>,
}

/// The server response code attached to a path lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Zero on success
    #[serde(default)]
    pub code: i64,
    /// Human readable status
    #[serde(default)]
    pub desc: Option<String>,
}

/// A signature over a [TreeRoots] payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSig {
    /// Base64 armored signature blob
    pub sig: String,
}

/// The signed root a path was computed against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRoot {
    /// The sequence number the server claims for this root
    #[serde(default)]
    pub seqno: u64,
    /// Signatures keyed by signing key id
    #[serde(default)]
    pub sigs: BTreeMap<String, RootSig>,
}

/// The server's answer to a merkle path lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAndSigs {
    /// Server status
    #[serde(default)]
    pub status: Status,
    /// The root this path hangs from
    pub root: SignedRoot,
    /// The path through the main tree
    #[serde(default)]
    pub path: Vec<PathNode>,
    /// The UID the path was computed for (present on username lookups)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    /// The path through the legacy username -> UID tree
    #[serde(default)]
    pub uid_proof_path: Vec<PathNode>,
    /// Serialized reset chain links, oldest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_chain: Option<Vec<String>>,
    /// Serialized intermediate roots for the skip walk
    #[serde(default)]
    pub skips: Vec<String>,
}

/// The body of a signed root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRootsBody {
    /// Position in the global root sequence
    pub seqno: u64,
    /// Root of the main tree
    pub root: Sha512Hash,
    /// Root of the legacy username -> UID tree
    pub legacy_uid_root: Sha256Hash,
    /// seqno -> hash of the serialized root at that seqno
    #[serde(default)]
    pub skips: BTreeMap<u64, Sha256Hash>,
}

/// A signed tree root, as recovered from a root signature or a skip payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRoots {
    /// The signed body
    pub body: TreeRootsBody,
}

impl TreeRoots {
    /// Parse a serialized root
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(payload).map_err(|err| format!("Bad tree root payload: {err}"))
    }

    /// The sequence number of this root
    pub fn seqno(&self) -> u64 {
        self.body.seqno
    }
}

/// The sigchain tail stored in a main tree leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigChainTail {
    /// The newest seqno committed to
    pub seqno: u64,
    /// Hash of the link at `seqno`
    pub link_hash: Sha256Hash,
    /// Hash of that link's signature, unused by verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_hash: Option<String>,
}

/// The reset chain tail stored in a main tree leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetChainTail {
    /// Number of resets
    pub count: u64,
    /// Hash of the newest reset link
    pub head: Option<Sha512Hash>,
}

/// The decoded leaf value of a main tree leaf:
/// `[version, [seqno, link_hash, sig_hash], reserved, eldest_kid, [count, head]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTails {
    /// Leaf format version
    pub version: u64,
    /// Public sigchain tail
    pub sig_tail: SigChainTail,
    /// Current eldest key, if the account has one
    pub eldest_kid: Option<Kid>,
    /// Reset chain tail, if the account was ever reset
    pub reset_tail: Option<ResetChainTail>,
}

impl ChainTails {
    /// Decode a leaf value
    pub fn from_leaf(value: &serde_json::Value) -> Result<Self, String> {
        let arr = value
            .as_array()
            .ok_or_else(|| "Leaf value is not an array".to_string())?;
        let version = arr
            .first()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "Leaf is missing a version".to_string())?;

        let tail = arr
            .get(1)
            .and_then(|v| v.as_array())
            .ok_or_else(|| "Leaf is missing a sigchain tail".to_string())?;
        let seqno = tail
            .first()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "Sigchain tail is missing a seqno".to_string())?;
        let link_hash = tail
            .get(1)
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Sigchain tail is missing a link hash".to_string())
            .and_then(|h| Sha256Hash::try_parse_hex(h).map_err(|err| err.to_string()))?;
        let sig_hash = tail.get(2).and_then(|v| v.as_str()).map(str::to_string);

        let eldest_kid = match arr.get(3) {
            Some(serde_json::Value::String(kid)) => Some(Kid::new(kid)),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => return Err(format!("Bad eldest kid in leaf: {other}")),
        };

        let reset_tail = match arr.get(4) {
            Some(serde_json::Value::Array(reset)) => {
                let count = reset
                    .first()
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| "Reset tail is missing a count".to_string())?;
                let head = match reset.get(1) {
                    Some(serde_json::Value::String(h)) => {
                        Some(Sha512Hash::try_parse_hex(h).map_err(|err| err.to_string())?)
                    }
                    _ => None,
                };
                Some(ResetChainTail { count, head })
            }
            Some(serde_json::Value::Null) | None => None,
            Some(other) => return Err(format!("Bad reset tail in leaf: {other}")),
        };

        Ok(Self {
            version,
            sig_tail: SigChainTail {
                seqno,
                link_hash,
                sig_hash,
            },
            eldest_kid,
            reset_tail,
        })
    }
}
