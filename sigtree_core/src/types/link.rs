// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Sigchain payloads: the raw links served by the identity server, the parsed
//! link bodies, the v2 outer link and the reset chain

use crate::freshness::ChainMaxes;
use crate::hash::{Sha256Hash, Sha512Hash, TreeDigest};
use crate::types::{DeviceId, Kid, SigId, Uid};
use crate::utils::canonical_json;
use serde::{Deserialize, Serialize};

// ============================================
// Raw links
// ============================================

/// A sigchain link as served by the identity server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLink {
    /// The server's idea of the link's seqno, informational only
    #[serde(default)]
    pub seqno: u64,
    /// The inner JSON payload, exactly as it was hashed
    pub payload_json: String,
    /// Base64 armored signature blob
    pub sig: String,
    /// The key which signed the link
    pub kid: Kid,
    /// 1 or 2
    #[serde(default = "default_sig_version")]
    pub sig_version: u8,
}

fn default_sig_version() -> u8 {
    1
}

// ============================================
// Link body sections
// ============================================

/// The `body.key` section, present on every link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySection {
    /// The eldest key of the epoch this link was signed in
    #[serde(default)]
    pub eldest_kid: Option<Kid>,
    /// The key which signed this link
    pub kid: Kid,
    /// The owner of the chain
    pub uid: Uid,
    /// The owner's username at signing time
    #[serde(default)]
    pub username: Option<String>,
}

/// The `body.revoke` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeSection {
    /// A single revoked signature
    #[serde(default)]
    pub sig_id: Option<SigId>,
    /// Several revoked signatures
    #[serde(default)]
    pub sig_ids: Vec<SigId>,
    /// A single revoked key
    #[serde(default)]
    pub kid: Option<Kid>,
    /// Several revoked keys
    #[serde(default)]
    pub kids: Vec<Kid>,
}

/// The `body.device` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Device identifier
    pub id: DeviceId,
    /// Device name
    #[serde(default)]
    pub name: Option<String>,
    /// "desktop", "mobile", "backup" and friends
    #[serde(default, rename = "type")]
    pub device_type: Option<String>,
}

/// The `body.sibkey` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SibkeySection {
    /// The delegated signing key
    pub kid: Kid,
    /// The new key's signature over this link, with this field nulled out
    #[serde(default)]
    pub reverse_sig: Option<String>,
}

/// The `body.subkey` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubkeySection {
    /// The delegated encryption key
    pub kid: Kid,
    /// The signing key this encryption key belongs to
    #[serde(default)]
    pub parent_kid: Option<Kid>,
}

/// The `body.per_user_key` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerUserKeySection {
    /// PUK generation, increasing with every rotation
    pub generation: u64,
    /// Per-user signing key
    pub signing_kid: Kid,
    /// Per-user encryption key
    pub encryption_kid: Kid,
    /// The signing key's signature over this link, with this field nulled out
    #[serde(default)]
    pub reverse_sig: Option<String>,
}

/// The `body.pgp_update` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpUpdateSection {
    /// The PGP key being updated
    pub kid: Kid,
    /// The hash of the key version now in effect
    pub full_hash: Sha256Hash,
}

/// The `body` of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBody {
    /// Link type, e.g. "eldest" or "sibkey"
    #[serde(rename = "type")]
    pub link_type: String,
    /// Body version
    #[serde(default)]
    pub version: u64,
    /// Signing key and owner
    pub key: KeySection,
    /// Revocations carried by this link
    #[serde(default)]
    pub revoke: Option<RevokeSection>,
    /// Device metadata
    #[serde(default)]
    pub device: Option<DeviceSection>,
    /// Signing key delegation
    #[serde(default)]
    pub sibkey: Option<SibkeySection>,
    /// Encryption key delegation
    #[serde(default)]
    pub subkey: Option<SubkeySection>,
    /// Per-user key rotation
    #[serde(default)]
    pub per_user_key: Option<PerUserKeySection>,
    /// PGP key update
    #[serde(default)]
    pub pgp_update: Option<PgpUpdateSection>,
}

/// The inner payload of a sigchain link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    /// The link body
    pub body: LinkBody,
    /// Creation time
    #[serde(default)]
    pub ctime: i64,
    /// Hash of the previous link, null on the first link
    #[serde(default)]
    pub prev: Option<Sha256Hash>,
    /// Position in the chain, starting at 1
    pub seqno: u64,
}

/// The effect a link has on the key family, borrowed out of a [ChainLink]
#[derive(Debug, Clone, Copy)]
pub enum LinkKind<'a> {
    /// Starts a new subchain
    Eldest(Option<&'a DeviceSection>),
    /// Delegates a signing key
    Sibkey(&'a SibkeySection, Option<&'a DeviceSection>),
    /// Delegates an encryption key
    Subkey(&'a SubkeySection, Option<&'a DeviceSection>),
    /// Selects a PGP key version
    PgpUpdate(&'a PgpUpdateSection),
    /// Rotates the per-user key
    PerUserKey(&'a PerUserKeySection),
    /// No key effect besides revocations (e.g. "revoke", "track", "web_service_binding")
    Other(&'a str),
}

/// A parsed inner link, keeping the original JSON so that reverse signatures
/// can be checked against it
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    payload: LinkPayload,
    json: serde_json::Value,
}

impl ChainLink {
    /// Parse the inner JSON of a link
    pub fn parse(payload_json: &str) -> Result<Self, String> {
        let json: serde_json::Value = serde_json::from_str(payload_json)
            .map_err(|err| format!("Link payload is not JSON: {err}"))?;
        let payload: LinkPayload = serde_json::from_value(json.clone())
            .map_err(|err| format!("Malformed link payload: {err}"))?;
        Ok(Self { payload, json })
    }

    /// The typed payload
    pub fn payload(&self) -> &LinkPayload {
        &self.payload
    }

    /// The payload as generic JSON
    pub fn json(&self) -> &serde_json::Value {
        &self.json
    }

    /// The link's seqno
    pub fn seqno(&self) -> u64 {
        self.payload.seqno
    }

    /// Hash of the previous link
    pub fn prev(&self) -> Option<&Sha256Hash> {
        self.payload.prev.as_ref()
    }

    /// The link's type string
    pub fn link_type(&self) -> &str {
        &self.payload.body.link_type
    }

    /// The chain owner
    pub fn uid(&self) -> &Uid {
        &self.payload.body.key.uid
    }

    /// The key which signed this link
    pub fn signing_kid(&self) -> &Kid {
        &self.payload.body.key.kid
    }

    /// The eldest key this link claims, falling back to the signing key
    pub fn eldest_kid(&self) -> &Kid {
        self.payload
            .body
            .key
            .eldest_kid
            .as_ref()
            .unwrap_or(&self.payload.body.key.kid)
    }

    /// Is this link of type eldest
    pub fn is_eldest(&self) -> bool {
        self.link_type() == "eldest"
    }

    /// Revocations carried by this link
    pub fn revokes(&self) -> Option<&RevokeSection> {
        self.payload.body.revoke.as_ref()
    }

    /// Classify the link by its key effect
    pub fn kind(&self) -> Result<LinkKind<'_>, String> {
        let body = &self.payload.body;
        let missing = |section: &str| {
            format!(
                "Link {} of type {} is missing its {section} section",
                self.seqno(),
                body.link_type
            )
        };
        Ok(match body.link_type.as_str() {
            "eldest" => LinkKind::Eldest(body.device.as_ref()),
            "sibkey" => LinkKind::Sibkey(
                body.sibkey.as_ref().ok_or_else(|| missing("sibkey"))?,
                body.device.as_ref(),
            ),
            "subkey" => LinkKind::Subkey(
                body.subkey.as_ref().ok_or_else(|| missing("subkey"))?,
                body.device.as_ref(),
            ),
            "pgp_update" => {
                LinkKind::PgpUpdate(body.pgp_update.as_ref().ok_or_else(|| missing("pgp_update"))?)
            }
            "per_user_key" => LinkKind::PerUserKey(
                body.per_user_key
                    .as_ref()
                    .ok_or_else(|| missing("per_user_key"))?,
            ),
            other => LinkKind::Other(other),
        })
    }

    /// The canonical serialization of this link with `body.<section>.reverse_sig`
    /// set to null. This is what a reverse signature signs.
    pub fn payload_for_reverse_sig(&self, section: &str) -> Result<String, String> {
        let mut json = self.json.clone();
        let slot = json
            .get_mut("body")
            .and_then(|body| body.get_mut(section))
            .and_then(|section| section.as_object_mut())
            .ok_or_else(|| format!("Link {} has no {section} section", self.seqno()))?;
        slot.insert("reverse_sig".to_string(), serde_json::Value::Null);
        Ok(canonical_json(&json))
    }
}

impl Serialize for ChainLink {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.json.serialize(s)
    }
}

// ============================================
// Version 2 outer links
// ============================================

/// The MessagePack-encoded outer link signed by version 2 signatures:
/// `[version, seqno, prev, curr, type, seq_type, ignore_if_unsupported]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OuterLink {
    /// Outer format version (2)
    pub version: u64,
    /// Position in the chain
    pub seqno: u64,
    /// Hash of the previous link's signed payload
    pub prev: Option<Sha256Hash>,
    /// Hash of the inner JSON payload
    pub curr: Sha256Hash,
    /// Numeric link type
    pub link_type: u64,
    /// Public or semi-private chain
    pub seq_type: u64,
    /// Whether clients may skip this link if they don't understand it
    pub ignore_if_unsupported: bool,
}

fn msgpack_hash(value: &rmpv::Value, field: &str) -> Result<Option<Sha256Hash>, String> {
    if value.is_nil() {
        return Ok(None);
    }
    let bytes = value
        .as_slice()
        .ok_or_else(|| format!("Outer link {field} is not binary"))?;
    Sha256Hash::try_from_slice(bytes)
        .map(Some)
        .map_err(|err| format!("Outer link {field}: {err}"))
}

impl OuterLink {
    /// Decode an outer link from its MessagePack bytes
    pub fn decode(mut bytes: &[u8]) -> Result<Self, String> {
        let value = rmpv::decode::read_value(&mut bytes)
            .map_err(|err| format!("Outer link is not msgpack: {err}"))?;
        let arr = value
            .as_array()
            .ok_or_else(|| "Outer link is not an array".to_string())?;
        if arr.len() < 4 {
            return Err(format!("Outer link has only {} fields", arr.len()));
        }
        let uint = |idx: usize, field: &str| -> Result<u64, String> {
            match arr.get(idx) {
                Some(v) => v
                    .as_u64()
                    .ok_or_else(|| format!("Outer link {field} is not an integer")),
                None => Ok(0),
            }
        };
        Ok(Self {
            version: uint(0, "version")?,
            seqno: uint(1, "seqno")?,
            prev: msgpack_hash(&arr[2], "prev")?,
            curr: msgpack_hash(&arr[3], "curr")?
                .ok_or_else(|| "Outer link is missing its curr hash".to_string())?,
            link_type: uint(4, "type")?,
            seq_type: uint(5, "seq_type")?,
            ignore_if_unsupported: arr.get(6).and_then(|v| v.as_bool()).unwrap_or(false),
        })
    }

    /// Encode the outer link as MessagePack
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let hash = |h: &Option<Sha256Hash>| match h {
            Some(h) => rmpv::Value::from(h.as_bytes().to_vec()),
            None => rmpv::Value::Nil,
        };
        let value = rmpv::Value::Array(vec![
            rmpv::Value::from(self.version),
            rmpv::Value::from(self.seqno),
            hash(&self.prev),
            hash(&Some(self.curr)),
            rmpv::Value::from(self.link_type),
            rmpv::Value::from(self.seq_type),
            rmpv::Value::from(self.ignore_if_unsupported),
        ]);
        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &value)
            .map_err(|err| format!("Failed to encode outer link: {err}"))?;
        Ok(out)
    }
}

// ============================================
// Verified chains
// ============================================

/// A link which passed the structural checks: its hash chain and merkle
/// assertions line up. Its signature is not yet verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainLinkBundle {
    /// The parsed inner link
    pub inner: ChainLink,
    /// The outer link, for version 2 signatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outer: Option<OuterLink>,
    /// Base64 armored signature blob
    pub sig: String,
    /// The key which signed the link
    pub kid: Kid,
    /// Hash of the signed payload (the inner JSON for v1, the outer link for v2)
    pub payload_hash: Sha256Hash,
}

impl ChainLinkBundle {
    /// The link's seqno
    pub fn seqno(&self) -> u64 {
        self.inner.seqno()
    }
}

/// The kind of a reset chain link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetType {
    /// The user reset the account
    Reset,
    /// The user deleted the account
    Delete,
}

/// What a reset closed off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPrev {
    /// The eldest key of the epoch that ended
    #[serde(default)]
    pub eldest_kid: Option<Kid>,
    /// The last public seqno of the epoch that ended
    pub public_seqno: u64,
    /// Hash of the previous reset link, null on the first
    #[serde(default)]
    pub reset: Option<Sha512Hash>,
}

/// One account reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetChainLink {
    /// Position in the reset chain, starting at 1
    pub reset_seqno: u64,
    /// Reset or delete
    #[serde(rename = "type")]
    pub reset_type: ResetType,
    /// The epoch this reset ended
    pub prev: ResetPrev,
    /// Creation time
    #[serde(default)]
    pub ctime: i64,
}

/// The result of walking a user: every structurally verified link, the
/// verified resets and how fresh the result is
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSigChain {
    /// The chain owner
    pub uid: Uid,
    /// The eldest key according to the latest tree leaf
    pub eldest: Option<Kid>,
    /// Links, oldest first
    pub links: Vec<ChainLinkBundle>,
    /// Resets, oldest first
    pub resets: Option<Vec<ResetChainLink>>,
    /// Freshness
    pub maxes: ChainMaxes,
}
