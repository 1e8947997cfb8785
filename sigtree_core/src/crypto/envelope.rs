// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The MessagePack signature envelope carried (base64 armored) by NaCl signatures:
//!
//! ```text
//! { body: { detached, hash_type, key, payload, sig, sig_type }, tag, version }
//! ```

use crate::crypto::CryptoError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rmpv::Value;

/// The envelope tag of a signature
pub const SIG_TAG: u64 = 514;
/// The `sig_type` of an ed25519 signature
pub const SIG_TYPE_ED25519: u64 = 32;
/// The `hash_type` of a SHA2-512 prehash
pub const HASH_TYPE_SHA512: u64 = 10;

/// A decoded signature envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigEnvelope {
    /// The signed payload
    pub payload: Vec<u8>,
    /// Binary key id of the signer
    pub key: Vec<u8>,
    /// The raw signature
    pub sig: Vec<u8>,
    /// Signature algorithm
    pub sig_type: u64,
    /// Hash algorithm
    pub hash_type: u64,
    /// Whether the payload travels separately
    pub detached: bool,
    /// Envelope tag
    pub tag: u64,
    /// Envelope version
    pub version: u64,
}

fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn get_bytes(map: &[(Value, Value)], key: &str) -> Result<Vec<u8>, CryptoError> {
    map_get(map, key)
        .and_then(|v| v.as_slice())
        .map(|v| v.to_vec())
        .ok_or_else(|| CryptoError::Decode(format!("Signature envelope is missing {key}")))
}

fn get_uint(map: &[(Value, Value)], key: &str) -> u64 {
    map_get(map, key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Strip the base64 armor from a signature
pub fn dearmor(sig: &str) -> Result<Vec<u8>, CryptoError> {
    let compact: String = sig.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|err| CryptoError::Decode(format!("Signature is not base64: {err}")))
}

impl SigEnvelope {
    /// Decode an armored envelope, also returning the de-armored bytes
    pub fn decode_armored(sig: &str) -> Result<(Self, Vec<u8>), CryptoError> {
        let raw = dearmor(sig)?;
        let envelope = Self::decode(&raw)?;
        Ok((envelope, raw))
    }

    /// Decode an envelope from its MessagePack bytes
    pub fn decode(mut raw: &[u8]) -> Result<Self, CryptoError> {
        let value = rmpv::decode::read_value(&mut raw)
            .map_err(|err| CryptoError::Decode(format!("Signature is not msgpack: {err}")))?;
        let outer = value
            .as_map()
            .ok_or_else(|| CryptoError::Decode("Signature envelope is not a map".to_string()))?;
        let body = map_get(outer, "body")
            .and_then(|b| b.as_map())
            .ok_or_else(|| CryptoError::Decode("Signature envelope has no body".to_string()))?;
        Ok(Self {
            payload: get_bytes(body, "payload")?,
            key: get_bytes(body, "key")?,
            sig: get_bytes(body, "sig")?,
            sig_type: get_uint(body, "sig_type"),
            hash_type: get_uint(body, "hash_type"),
            detached: map_get(body, "detached")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            tag: get_uint(outer, "tag"),
            version: get_uint(outer, "version"),
        })
    }

    /// Encode the envelope as MessagePack
    pub fn encode(&self) -> Result<Vec<u8>, CryptoError> {
        let entry = |k: &str, v: Value| (Value::from(k), v);
        let body = Value::Map(vec![
            entry("detached", Value::from(self.detached)),
            entry("hash_type", Value::from(self.hash_type)),
            entry("key", Value::from(self.key.clone())),
            entry("payload", Value::from(self.payload.clone())),
            entry("sig", Value::from(self.sig.clone())),
            entry("sig_type", Value::from(self.sig_type)),
        ]);
        let value = Value::Map(vec![
            entry("body", body),
            entry("tag", Value::from(self.tag)),
            entry("version", Value::from(self.version)),
        ]);
        let mut out = Vec::new();
        rmpv::encode::write_value(&mut out, &value)
            .map_err(|err| CryptoError::Decode(format!("Failed to encode envelope: {err}")))?;
        Ok(out)
    }

    /// Encode and armor the envelope
    pub fn to_armored(&self) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.encode()?))
    }
}
