// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains the identifier types shared by every verification stage,
//! along with the wire formats returned by the identity server
//!
//! 1. Identifiers (UIDs, key ids, signature ids, device ids)
//! 2. Merkle tree payloads (paths, signed roots, leaf tails)
//! 3. Sigchain payloads (raw links, parsed links, reset chains)

use crate::hash::{sha256, Sha256Hash};
use serde::{Deserialize, Serialize};

pub mod link;
pub mod tree;

pub use link::*;
pub use tree::*;


// ============================================
// Typedefs and constants
// ============================================

/// The number of hex characters in a [Uid]
pub const UID_HEX_LEN: usize = 32;
/// The suffix carried by UIDs derived from a username hash
pub const USER_UID_SUFFIX: &str = "19";
/// The suffix carried by legacy (randomly assigned) UIDs
pub const LEGACY_UID_SUFFIX: &str = "00";

/// The key-id prefix of a NaCl (ed25519) signing key
pub const NACL_SIG_KID_PREFIX: &str = "0120";
/// The key-id prefix of a NaCl (curve25519) encryption key
pub const NACL_ENC_KID_PREFIX: &str = "0121";

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// ============================================
// Identifiers
// ============================================

/// A stable user identifier: 32 lowercase hex characters whose last byte
/// is either `00` (legacy) or `19` (derived from the username)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Parse a UID, validating its shape
    pub fn parse(value: &str) -> Result<Self, String> {
        if Self::is_uid_like(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(format!("Malformed UID {value:?}"))
        }
    }

    /// Whether or not the string looks like a UID (`^[0-9a-f]{30}(00|19)$`)
    pub fn is_uid_like(value: &str) -> bool {
        value.len() == UID_HEX_LEN
            && is_lower_hex(value)
            && (value.ends_with(USER_UID_SUFFIX) || value.ends_with(LEGACY_UID_SUFFIX))
    }

    /// The UID a username maps to under the modern derivation: the first 15
    /// bytes of `sha256(lowercase(username))` followed by `0x19`
    pub fn from_username(username: &str) -> Self {
        Self::from_username_hash(&username_hash(username))
    }

    /// The UID derived from an already computed username hash
    pub fn from_username_hash(hash: &Sha256Hash) -> Self {
        let hex = hash.to_string();
        Self(format!("{}{}", &hex[..UID_HEX_LEN - 2], USER_UID_SUFFIX))
    }

    /// The UID as a hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uid {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl core::fmt::Display for Uid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The hash used to key a username: `sha256(lowercase(username))`
pub fn username_hash(username: &str) -> Sha256Hash {
    sha256(username.to_lowercase().as_bytes())
}

/// The family a key id belongs to, as determined by its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// An ed25519 signing key
    NaclSig,
    /// A curve25519 encryption key
    NaclEnc,
    /// Anything else is treated as PGP
    Pgp,
}

/// A key identifier, as a lowercase hex string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kid(String);

impl Kid {
    /// Wrap a key id, normalizing to lowercase
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_lowercase())
    }

    /// The family this key id belongs to
    pub fn key_type(&self) -> KeyType {
        if self.0.starts_with(NACL_SIG_KID_PREFIX) {
            KeyType::NaclSig
        } else if self.0.starts_with(NACL_ENC_KID_PREFIX) {
            KeyType::NaclEnc
        } else {
            KeyType::Pgp
        }
    }

    /// Is this an ed25519 signing key
    pub fn is_nacl_sig(&self) -> bool {
        self.key_type() == KeyType::NaclSig
    }

    /// Is this a PGP key
    pub fn is_pgp(&self) -> bool {
        self.key_type() == KeyType::Pgp
    }

    /// The key id as a hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Kid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl core::fmt::Display for Kid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signature identifier, `sha256(raw signature)` in hex, sometimes carrying
/// a one-byte type suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigId(String);

/// A normalized [SigId], suitable for indexing revocations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigIdKey(String);

impl SigId {
    /// The signature id of a raw signature
    pub fn from_raw_signature(raw: &[u8]) -> Self {
        Self(sha256(raw).to_string())
    }

    /// Wrap a signature id string
    pub fn new(value: &str) -> Self {
        Self(value.to_lowercase())
    }

    /// Strip a `0f` or `22` suffix from a 66-char signature id. Every other
    /// length besides 64 is rejected, as is anything that isn't hex.
    pub fn to_map_key(&self) -> Result<SigIdKey, String> {
        let mut tmp = self.0.as_str();
        if !tmp.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("Bad signature id {}", self.0));
        }
        if tmp.len() == 66 {
            let suffix = &tmp[64..];
            if suffix == "0f" || suffix == "22" {
                tmp = &tmp[..64];
            }
        }
        if tmp.len() != 64 {
            return Err(format!("Bad signature id {}", self.0));
        }
        Ok(SigIdKey(tmp.to_ascii_lowercase()))
    }

    /// The signature id as a hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SigId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
