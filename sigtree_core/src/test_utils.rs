// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Fixture builders shared by this crate's tests and downstream test suites

use crate::crypto::{
    nacl, CryptoError, ImportedKey, KeyImporter, SigEnvelope, SignatureVerifier, VerifiedPayload,
};
use crate::hash::{sha256, sha512, Sha256Hash, Sha512Hash, TreeDigest};
use crate::types::{
    Kid, MerkleNode, NodeType, OuterLink, PathNode, RawLink, RootSig, SigChainTail, SignedRoot, Uid,
};
use crate::utils::canonical_json;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a path of `depth` interior nodes above a leaf mapping `key` to
/// `value`. Every node also carries a sibling entry so that no node is trivially
/// small. Returns the root hash along with the path, root first.
pub fn build_path<H: TreeDigest>(key: &str, value: Value, depth: usize) -> (H, Vec<PathNode>) {
    let depth = depth.min(key.len());
    let mut tab = Map::new();
    tab.insert(key.to_string(), value);
    tab.insert(format!("{}~sibling", &key[..depth]), json!("unrelated"));
    let val = canonical_json(&json!({ "tab": tab, "type": 2 }));
    let mut child = H::digest(val.as_bytes());
    let mut nodes = vec![PathNode {
        prefix: key[..depth].to_string(),
        node: MerkleNode {
            hash: Some(child.to_hex()),
            val,
            node_type: NodeType::Leaf,
        },
    }];

    for level in (0..depth).rev() {
        let mut tab = Map::new();
        tab.insert(key[..level + 1].to_string(), json!(child.to_hex()));
        tab.insert(format!("{}~", &key[..level]), json!(H::digest(b"sibling").to_hex()));
        let val = canonical_json(&json!({ "tab": tab, "type": 1 }));
        child = H::digest(val.as_bytes());
        nodes.push(PathNode {
            prefix: key[..level].to_string(),
            node: MerkleNode {
                hash: Some(child.to_hex()),
                val,
                node_type: NodeType::Interior,
            },
        });
    }
    nodes.reverse();
    (child, nodes)
}

/// Serialize a tree root payload the way the server signs it
pub fn root_payload(
    seqno: u64,
    root: &Sha512Hash,
    legacy_uid_root: &Sha256Hash,
    skips: &BTreeMap<u64, Sha256Hash>,
) -> String {
    let skips: Map<String, Value> = skips
        .iter()
        .map(|(seqno, hash)| (seqno.to_string(), json!(hash.to_hex())))
        .collect();
    canonical_json(&json!({
        "body": {
            "legacy_uid_root": legacy_uid_root.to_hex(),
            "root": root.to_hex(),
            "seqno": seqno,
            "skips": skips,
        },
        "ctime": 1_600_000_000 + seqno,
        "tag": "signature",
    }))
}

/// Sign a root payload with `key`, producing the `root` object of a path lookup
pub fn sign_root(key: &SigningKey, seqno: u64, payload: &str) -> Result<SignedRoot, CryptoError> {
    let kid = nacl::signing_kid(&key.verifying_key());
    let sig = nacl::sign(key, payload.as_bytes())?;
    let mut sigs = BTreeMap::new();
    sigs.insert(kid.as_str().to_string(), RootSig { sig });
    Ok(SignedRoot { seqno, sigs })
}

/// A stand-in for PGP: bundles look like `fakepgp:<kid>:<seed>:<version>` and
/// verify ed25519 signatures made with `SigningKey::from_bytes(&[seed; 32])`
/// regardless of the key id in the envelope
pub struct FakePgpImporter;

/// The bundle [FakePgpImporter] understands
pub fn fake_pgp_bundle(kid: &Kid, seed: u8, version: u8) -> String {
    format!("fakepgp:{kid}:{seed}:{version}")
}

struct FakePgpVerifier(VerifyingKey);

impl SignatureVerifier for FakePgpVerifier {
    fn verify(&self, sig: &str) -> Result<VerifiedPayload, CryptoError> {
        let (envelope, raw) = SigEnvelope::decode_armored(sig)?;
        let sig: [u8; 64] = envelope
            .sig
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Decode("bad signature length".to_string()))?;
        self.0
            .verify_strict(&envelope.payload, &Signature::from_bytes(&sig))
            .map_err(|err| CryptoError::BadSignature(err.to_string()))?;
        Ok(VerifiedPayload {
            payload: envelope.payload,
            raw,
        })
    }
}

impl KeyImporter for FakePgpImporter {
    fn import(&self, bundle: &str) -> Result<ImportedKey, CryptoError> {
        let parts: Vec<&str> = bundle.trim().split(':').collect();
        match parts.as_slice() {
            ["fakepgp", kid, seed, _version] => {
                let seed: u8 = seed
                    .parse()
                    .map_err(|_| CryptoError::KeyImport(format!("bad seed in {bundle}")))?;
                Ok(ImportedKey {
                    kid: Kid::new(kid),
                    bundle: bundle.to_string(),
                    verifier: Arc::new(FakePgpVerifier(
                        SigningKey::from_bytes(&[seed; 32]).verifying_key(),
                    )),
                })
            }
            _ => Err(CryptoError::KeyImport(format!("not a fake PGP bundle: {bundle}"))),
        }
    }
}

/// Builds a user's sigchain (and reset chain) link by link, signing as it goes
pub struct ChainBuilder {
    uid: Uid,
    username: String,
    sig_version: u8,
    corrupt_next_outer: bool,
    links: Vec<RawLink>,
    last_hash: Option<Sha256Hash>,
    eldest: Option<Kid>,
    resets: Vec<String>,
    reset_head: Option<Sha512Hash>,
}

impl ChainBuilder {
    /// An empty chain for `username`, owned by `uid`
    pub fn new(uid: Uid, username: &str) -> Self {
        Self {
            uid,
            username: username.to_string(),
            sig_version: 1,
            corrupt_next_outer: false,
            links: Vec::new(),
            last_hash: None,
            eldest: None,
            resets: Vec::new(),
            reset_head: None,
        }
    }

    /// Sign subsequent links with version `version` signatures
    pub fn sig_version(&mut self, version: u8) -> &mut Self {
        self.sig_version = version;
        self
    }

    /// Make the next v2 link's outer link commit to the wrong inner hash
    pub fn corrupt_next_outer(&mut self) -> &mut Self {
        self.corrupt_next_outer = true;
        self
    }

    /// Append a link of any type, signed by `signer` under key id `kid`. If
    /// `reverse` names a section and key, that key reverse-signs the link.
    pub fn push(
        &mut self,
        signer: &SigningKey,
        kid: &Kid,
        link_type: &str,
        sections: Map<String, Value>,
        reverse: Option<(&str, &SigningKey)>,
    ) -> Result<&mut Self, CryptoError> {
        let seqno = self.links.len() as u64 + 1;
        let eldest = self.eldest.clone().unwrap_or_else(|| kid.clone());
        let mut body = sections;
        body.insert("type".to_string(), json!(link_type));
        body.insert("version".to_string(), json!(self.sig_version));
        body.insert(
            "key".to_string(),
            json!({
                "eldest_kid": eldest.as_str(),
                "kid": kid.as_str(),
                "uid": self.uid.as_str(),
                "username": self.username,
            }),
        );
        let mut payload = json!({
            "body": body,
            "ctime": 1_500_000_000 + seqno,
            "prev": self.last_hash.map(|h| h.to_hex()),
            "seqno": seqno,
            "tag": "signature",
        });
        if let Some((section, key)) = reverse {
            payload["body"][section]["reverse_sig"] = Value::Null;
            let reverse_sig = nacl::sign(key, canonical_json(&payload).as_bytes())?;
            payload["body"][section]["reverse_sig"] = json!(reverse_sig);
        }
        let inner = canonical_json(&payload);
        let inner_hash = sha256(inner.as_bytes());

        let (sig, link_hash) = if self.sig_version == 2 {
            let curr = if self.corrupt_next_outer {
                self.corrupt_next_outer = false;
                sha256(b"not the inner payload")
            } else {
                inner_hash
            };
            let outer = OuterLink {
                version: 2,
                seqno,
                prev: self.last_hash,
                curr,
                link_type: 1,
                seq_type: 1,
                ignore_if_unsupported: false,
            }
            .encode()
            .map_err(CryptoError::Decode)?;
            (nacl::sign(signer, &outer)?, sha256(&outer))
        } else {
            (nacl::sign(signer, inner.as_bytes())?, inner_hash)
        };

        self.links.push(RawLink {
            seqno,
            payload_json: inner,
            sig,
            kid: kid.clone(),
            sig_version: self.sig_version,
        });
        self.last_hash = Some(link_hash);
        if link_type == "eldest" {
            self.eldest = Some(kid.clone());
        }
        Ok(self)
    }

    /// Start a new epoch with a NaCl eldest key
    pub fn eldest(&mut self, key: &SigningKey, device: Option<&str>) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&key.verifying_key());
        self.eldest = None;
        let mut sections = Map::new();
        if let Some(device) = device {
            sections.insert("device".to_string(), device_section(device));
        }
        self.push(key, &kid, "eldest", sections, None)
    }

    /// Delegate `new_key` to a new device
    pub fn sibkey(
        &mut self,
        signer: &SigningKey,
        new_key: &SigningKey,
        device: &str,
    ) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&signer.verifying_key());
        let new_kid = nacl::signing_kid(&new_key.verifying_key());
        let mut sections = Map::new();
        sections.insert("device".to_string(), device_section(device));
        sections.insert(
            "sibkey".to_string(),
            json!({ "kid": new_kid.as_str(), "reverse_sig": null }),
        );
        self.push(signer, &kid, "sibkey", sections, Some(("sibkey", new_key)))
    }

    /// Delegate an encryption key to `device`
    pub fn subkey(&mut self, signer: &SigningKey, enc: &Kid, device: &str) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&signer.verifying_key());
        let mut sections = Map::new();
        sections.insert("device".to_string(), device_section(device));
        sections.insert(
            "subkey".to_string(),
            json!({ "kid": enc.as_str(), "parent_kid": kid.as_str() }),
        );
        self.push(signer, &kid, "subkey", sections, None)
    }

    /// Rotate the per-user key
    pub fn per_user_key(
        &mut self,
        signer: &SigningKey,
        puk: &SigningKey,
        enc: &Kid,
        generation: u64,
    ) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&signer.verifying_key());
        let mut sections = Map::new();
        sections.insert(
            "per_user_key".to_string(),
            json!({
                "encryption_kid": enc.as_str(),
                "generation": generation,
                "reverse_sig": null,
                "signing_kid": nacl::signing_kid(&puk.verifying_key()).as_str(),
            }),
        );
        self.push(signer, &kid, "per_user_key", sections, Some(("per_user_key", puk)))
    }

    /// A link carrying only a revocation
    pub fn revoke(&mut self, signer: &SigningKey, revoke: Value) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&signer.verifying_key());
        let mut sections = Map::new();
        sections.insert("revoke".to_string(), revoke);
        self.push(signer, &kid, "revoke", sections, None)
    }

    /// A link with no key effect
    pub fn other(&mut self, signer: &SigningKey, link_type: &str) -> Result<&mut Self, CryptoError> {
        let kid = nacl::signing_kid(&signer.verifying_key());
        self.push(signer, &kid, link_type, Map::new(), None)
    }

    /// Reset the account, closing the current epoch
    pub fn reset(&mut self) -> &mut Self {
        let reset_seqno = self.resets.len() as u64 + 1;
        let entry = canonical_json(&json!({
            "ctime": 1_700_000_000 + reset_seqno,
            "prev": {
                "eldest_kid": self.eldest.as_ref().map(|k| k.as_str().to_string()),
                "public_seqno": self.links.len(),
                "reset": self.reset_head.map(|h| h.to_hex()),
            },
            "reset_seqno": reset_seqno,
            "type": "reset",
            "uid": self.uid.as_str(),
        }));
        self.reset_head = Some(sha512(entry.as_bytes()));
        self.resets.push(entry);
        self.eldest = None;
        self
    }

    /// The chain's owner
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Links so far, oldest first
    pub fn links(&self) -> &[RawLink] {
        &self.links
    }

    /// The current eldest key
    pub fn eldest_kid(&self) -> Option<&Kid> {
        self.eldest.as_ref()
    }

    /// The sigchain tail a merkle leaf would commit to now
    pub fn tail(&self) -> SigChainTail {
        SigChainTail {
            seqno: self.links.len() as u64,
            link_hash: self.last_hash.unwrap_or(Sha256Hash([0u8; 32])),
            sig_hash: None,
        }
    }

    /// Serialized reset links, oldest first
    pub fn reset_chain(&self) -> Option<Vec<String>> {
        if self.resets.is_empty() {
            None
        } else {
            Some(self.resets.clone())
        }
    }

    /// The main tree leaf value for the chain as it stands
    pub fn leaf(&self) -> Value {
        let tail = self.tail();
        let reset_tail = match self.reset_head {
            Some(head) => json!([self.resets.len(), head.to_hex()]),
            None => Value::Null,
        };
        json!([
            2,
            [tail.seqno, tail.link_hash.to_hex(), null],
            null,
            self.eldest.as_ref().map(|k| k.as_str().to_string()),
            reset_tail
        ])
    }
}

fn device_section(id: &str) -> Value {
    json!({ "id": id, "name": format!("{id} device"), "type": "desktop" })
}
