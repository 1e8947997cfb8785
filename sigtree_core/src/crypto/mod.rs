// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains the signature verification seam: armored signature
//! envelopes, the built-in NaCl (ed25519) verifier and the key importer used to
//! turn server-supplied key bundles into verifiers
//!
//! PGP is not implemented here. Callers that need it supply their own
//! [KeyImporter] to [StandardKeyImporter::with_pgp].

use crate::types::{KeyType, Kid, SigId};
use std::sync::Arc;

pub mod envelope;
pub mod nacl;

pub use envelope::SigEnvelope;
pub use nacl::NaclSigningKey;


/// Errors thrown while verifying signatures or importing keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The signature blob or key material couldn't be decoded
    Decode(String),
    /// A key bundle couldn't be imported
    KeyImport(String),
    /// The signature did not verify
    BadSignature(String),
    /// No key with the given id is known
    UnknownKey(Kid),
    /// The key or signature type is not supported
    Unsupported(String),
}

impl std::error::Error for CryptoError {}

impl core::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let code = match &self {
            CryptoError::Decode(msg) => format!("(Decode) - {msg}"),
            CryptoError::KeyImport(msg) => format!("(Key import) - {msg}"),
            CryptoError::BadSignature(msg) => format!("(Bad signature) - {msg}"),
            CryptoError::UnknownKey(kid) => format!("(Unknown key) - {kid}"),
            CryptoError::Unsupported(msg) => format!("(Unsupported) - {msg}"),
        };
        write!(f, "Crypto error: {code}")
    }
}

/// The output of a successful signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    /// The signed payload
    pub payload: Vec<u8>,
    /// The raw (de-armored) signature, from which the signature id derives
    pub raw: Vec<u8>,
}

impl VerifiedPayload {
    /// The id of the signature which produced this payload
    pub fn sig_id(&self) -> SigId {
        SigId::from_raw_signature(&self.raw)
    }
}

/// Anything that can check an armored signature and return what it signed
pub trait SignatureVerifier: Send + Sync {
    /// Verify an armored signature, returning the payload it covers
    fn verify(&self, sig: &str) -> Result<VerifiedPayload, CryptoError>;
}

/// A key bundle turned into something that can verify signatures
#[derive(Clone)]
pub struct ImportedKey {
    /// The key's id
    pub kid: Kid,
    /// The bundle the key was imported from
    pub bundle: String,
    /// Verifies signatures made by this key
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl core::fmt::Debug for ImportedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImportedKey").field("kid", &self.kid).finish()
    }
}

/// Turns a key bundle (a NaCl key id or an armored PGP key) into an [ImportedKey]
pub trait KeyImporter: Send + Sync {
    /// Import a single bundle
    fn import(&self, bundle: &str) -> Result<ImportedKey, CryptoError>;
}

/// Encryption keys are tracked but can never sign
struct EncryptionOnly(Kid);

impl SignatureVerifier for EncryptionOnly {
    fn verify(&self, _sig: &str) -> Result<VerifiedPayload, CryptoError> {
        Err(CryptoError::Unsupported(format!(
            "{} is an encryption key and can't verify signatures",
            self.0
        )))
    }
}

/// Imports NaCl keys natively and hands anything else to an optional PGP importer
#[derive(Clone, Default)]
pub struct StandardKeyImporter {
    pgp: Option<Arc<dyn KeyImporter>>,
}

impl StandardKeyImporter {
    /// An importer which can only handle NaCl keys
    pub fn new() -> Self {
        Self::default()
    }

    /// An importer which delegates non-NaCl bundles to `pgp`
    pub fn with_pgp(pgp: Arc<dyn KeyImporter>) -> Self {
        Self { pgp: Some(pgp) }
    }
}

impl KeyImporter for StandardKeyImporter {
    fn import(&self, bundle: &str) -> Result<ImportedKey, CryptoError> {
        let trimmed = bundle.trim();
        let looks_like_kid = !trimmed.is_empty() && hex::decode(trimmed).is_ok();
        if looks_like_kid {
            let kid = Kid::new(trimmed);
            match kid.key_type() {
                KeyType::NaclSig => {
                    let key = NaclSigningKey::from_kid(&kid)?;
                    return Ok(ImportedKey {
                        kid,
                        bundle: trimmed.to_string(),
                        verifier: Arc::new(key),
                    });
                }
                KeyType::NaclEnc => {
                    return Ok(ImportedKey {
                        kid: kid.clone(),
                        bundle: trimmed.to_string(),
                        verifier: Arc::new(EncryptionOnly(kid)),
                    });
                }
                KeyType::Pgp => {}
            }
        }
        match &self.pgp {
            Some(pgp) => pgp.import(bundle),
            None => Err(CryptoError::Unsupported(
                "PGP key bundles need a PGP importer".to_string(),
            )),
        }
    }
}
