// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! NaCl (ed25519) signing keys. The key id embeds the public key:
//! `0x01 0x20 || pubkey || 0x0a`.

use crate::crypto::envelope::{SigEnvelope, SIG_TAG, SIG_TYPE_ED25519};
use crate::crypto::{CryptoError, SignatureVerifier, VerifiedPayload};
use crate::types::Kid;
use ed25519_dalek::{Signature, VerifyingKey};

const KID_VERSION: u8 = 0x01;
const KID_SIG_TYPE: u8 = 0x20;
const KID_ENC_TYPE: u8 = 0x21;
const KID_SUFFIX: u8 = 0x0a;
const KID_BYTES: usize = 35;

/// An ed25519 public key, addressed by its key id
#[derive(Debug, Clone)]
pub struct NaclSigningKey {
    kid: Kid,
    kid_bytes: Vec<u8>,
    key: VerifyingKey,
}

impl NaclSigningKey {
    /// Recover the public key embedded in a NaCl signing key id
    pub fn from_kid(kid: &Kid) -> Result<Self, CryptoError> {
        let kid_bytes = hex::decode(kid.as_str())
            .map_err(|err| CryptoError::KeyImport(format!("Key id {kid} is not hex: {err}")))?;
        if kid_bytes.len() != KID_BYTES
            || kid_bytes[0] != KID_VERSION
            || kid_bytes[1] != KID_SIG_TYPE
            || kid_bytes[KID_BYTES - 1] != KID_SUFFIX
        {
            return Err(CryptoError::KeyImport(format!(
                "Key id {kid} is not a NaCl signing key"
            )));
        }
        let mut public = [0u8; 32];
        public.copy_from_slice(&kid_bytes[2..KID_BYTES - 1]);
        let key = VerifyingKey::from_bytes(&public)
            .map_err(|err| CryptoError::KeyImport(format!("Bad ed25519 key {kid}: {err}")))?;
        Ok(Self {
            kid: kid.clone(),
            kid_bytes,
            key,
        })
    }

    /// The key's id
    pub fn kid(&self) -> &Kid {
        &self.kid
    }
}

impl SignatureVerifier for NaclSigningKey {
    fn verify(&self, sig: &str) -> Result<VerifiedPayload, CryptoError> {
        let (envelope, raw) = SigEnvelope::decode_armored(sig)?;
        if envelope.tag != SIG_TAG || envelope.sig_type != SIG_TYPE_ED25519 {
            return Err(CryptoError::Unsupported(format!(
                "Signature tag {} of type {} is not an ed25519 signature",
                envelope.tag, envelope.sig_type
            )));
        }
        if envelope.key != self.kid_bytes {
            return Err(CryptoError::BadSignature(format!(
                "Signature was made by {} not {}",
                hex::encode(&envelope.key),
                self.kid
            )));
        }
        let sig_bytes: [u8; 64] = envelope.sig.as_slice().try_into().map_err(|_| {
            CryptoError::Decode(format!(
                "ed25519 signatures are 64 bytes, got {}",
                envelope.sig.len()
            ))
        })?;
        self.key
            .verify_strict(&envelope.payload, &Signature::from_bytes(&sig_bytes))
            .map_err(|err| CryptoError::BadSignature(format!("{}: {err}", self.kid)))?;
        Ok(VerifiedPayload {
            payload: envelope.payload,
            raw,
        })
    }
}

fn kid_from_parts(key_type: u8, public: &[u8; 32]) -> Kid {
    let mut bytes = Vec::with_capacity(KID_BYTES);
    bytes.push(KID_VERSION);
    bytes.push(key_type);
    bytes.extend_from_slice(public);
    bytes.push(KID_SUFFIX);
    Kid::new(&hex::encode(bytes))
}

/// The key id of an ed25519 public key
pub fn signing_kid(public: &VerifyingKey) -> Kid {
    kid_from_parts(KID_SIG_TYPE, public.as_bytes())
}

/// The key id of a curve25519 public key
pub fn encryption_kid(public: &[u8; 32]) -> Kid {
    kid_from_parts(KID_ENC_TYPE, public)
}

/// Produce an armored attached signature over `payload`
#[cfg(any(test, feature = "public_tests"))]
pub fn sign(key: &ed25519_dalek::SigningKey, payload: &[u8]) -> Result<String, CryptoError> {
    use crate::crypto::envelope::HASH_TYPE_SHA512;
    use ed25519_dalek::Signer;

    let kid = signing_kid(&key.verifying_key());
    let kid_bytes = hex::decode(kid.as_str())
        .map_err(|err| CryptoError::Decode(format!("Bad key id: {err}")))?;
    SigEnvelope {
        payload: payload.to_vec(),
        key: kid_bytes,
        sig: key.sign(payload).to_bytes().to_vec(),
        sig_type: SIG_TYPE_ED25519,
        hash_type: HASH_TYPE_SHA512,
        detached: true,
        tag: SIG_TAG,
        version: 1,
    }
    .to_armored()
}
