// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains the key ring (every key bundle the server returned for a
//! user, usable for signature checks) and the key family (which of those keys are
//! currently delegated, built by replaying the sigchain)

use crate::crypto::{CryptoError, ImportedKey, KeyImporter, NaclSigningKey, SignatureVerifier, VerifiedPayload};
use crate::hash::{sha256, Sha256Hash};
use crate::types::{KeyType, Kid, Uid};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub mod family;

pub use family::{Device, DeviceKeys, KeyFamily, PerUserKey, PerUserKeyPair, UserKeys};

#[cfg(test)]
mod tests;

/// One version of a PGP key
#[derive(Clone)]
pub struct PgpKeyVersion {
    bundle: String,
    verifier: Arc<dyn SignatureVerifier>,
}

/// Every known version of a PGP key, keyed by the hash of the armored bundle.
/// A `pgp_update` link selects which version is current.
#[derive(Clone)]
pub struct PgpKeySet {
    kid: Kid,
    by_full_hash: BTreeMap<Sha256Hash, PgpKeyVersion>,
    last: Sha256Hash,
    current: Option<Sha256Hash>,
}

impl PgpKeySet {
    fn new(key: ImportedKey) -> Self {
        let hash = sha256(key.bundle.trim().as_bytes());
        let mut by_full_hash = BTreeMap::new();
        by_full_hash.insert(
            hash,
            PgpKeyVersion {
                bundle: key.bundle,
                verifier: key.verifier,
            },
        );
        Self {
            kid: key.kid,
            by_full_hash,
            last: hash,
            current: None,
        }
    }

    fn insert(&mut self, key: ImportedKey) {
        let hash = sha256(key.bundle.trim().as_bytes());
        self.by_full_hash.insert(
            hash,
            PgpKeyVersion {
                bundle: key.bundle,
                verifier: key.verifier,
            },
        );
        self.last = hash;
    }

    /// Make the version hashing to `full_hash` current
    pub fn select(&mut self, full_hash: &Sha256Hash) -> Result<(), CryptoError> {
        if !self.by_full_hash.contains_key(full_hash) {
            return Err(CryptoError::UnknownKey(Kid::new(&format!(
                "{}@{full_hash}",
                self.kid
            ))));
        }
        self.current = Some(*full_hash);
        Ok(())
    }

    /// The armored bundle of the current version, or the newest one seen if no
    /// version was ever selected
    pub fn export(&self) -> Option<&str> {
        let hash = self.current.unwrap_or(self.last);
        self.by_full_hash.get(&hash).map(|v| v.bundle.as_str())
    }

    /// Number of known versions
    pub fn len(&self) -> usize {
        self.by_full_hash.len()
    }

    /// Whether no versions are known
    pub fn is_empty(&self) -> bool {
        self.by_full_hash.is_empty()
    }

    fn verify(&self, sig: &str) -> Result<VerifiedPayload, CryptoError> {
        if let Some(current) = self.current.and_then(|h| self.by_full_hash.get(&h)) {
            return current.verifier.verify(sig);
        }
        let mut last_err = CryptoError::UnknownKey(self.kid.clone());
        for version in self.by_full_hash.values() {
            match version.verifier.verify(sig) {
                Ok(payload) => return Ok(payload),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

/// A key in the [KeyRing]
#[derive(Clone)]
pub enum GenericKey {
    /// A PGP key and all of its versions
    Pgp(PgpKeySet),
    /// A NaCl key
    Nacl(ImportedKey),
}

impl GenericKey {
    /// The key's id
    pub fn kid(&self) -> &Kid {
        match self {
            GenericKey::Pgp(set) => &set.kid,
            GenericKey::Nacl(key) => &key.kid,
        }
    }

    /// Verify a signature made by this key
    pub fn verify(&self, sig: &str) -> Result<VerifiedPayload, CryptoError> {
        match self {
            GenericKey::Pgp(set) => set.verify(sig),
            GenericKey::Nacl(key) => key.verifier.verify(sig),
        }
    }
}

/// All of a user's key bundles, indexed by key id
#[derive(Clone)]
pub struct KeyRing {
    uid: Uid,
    by_kid: HashMap<Kid, GenericKey>,
}

impl KeyRing {
    /// An empty key ring for `uid`
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            by_kid: HashMap::new(),
        }
    }

    /// The user the keys belong to
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Number of distinct key ids
    pub fn len(&self) -> usize {
        self.by_kid.len()
    }

    /// Whether the ring holds no keys
    pub fn is_empty(&self) -> bool {
        self.by_kid.is_empty()
    }

    /// Add an imported key. PGP keys sharing a key id are merged as versions.
    pub fn add_key(&mut self, key: ImportedKey) {
        match key.kid.key_type() {
            KeyType::Pgp => match self.by_kid.get_mut(&key.kid) {
                Some(GenericKey::Pgp(set)) => set.insert(key),
                _ => {
                    self.by_kid
                        .insert(key.kid.clone(), GenericKey::Pgp(PgpKeySet::new(key)));
                }
            },
            KeyType::NaclSig | KeyType::NaclEnc => {
                self.by_kid.insert(key.kid.clone(), GenericKey::Nacl(key));
            }
        }
    }

    /// Import and add every bundle
    pub fn import_all<'a>(
        &mut self,
        importer: &dyn KeyImporter,
        bundles: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), CryptoError> {
        for bundle in bundles {
            self.add_key(importer.import(bundle)?);
        }
        Ok(())
    }

    /// Look up a key
    pub fn get(&self, kid: &Kid) -> Option<&GenericKey> {
        self.by_kid.get(kid)
    }

    /// Select which version of a PGP key is current
    pub fn select_pgp_key(&mut self, kid: &Kid, full_hash: &Sha256Hash) -> Result<(), CryptoError> {
        match self.by_kid.get_mut(kid) {
            Some(GenericKey::Pgp(set)) => set.select(full_hash),
            _ => Err(CryptoError::UnknownKey(kid.clone())),
        }
    }

    /// The armored bundle of a PGP key's current version
    pub fn export_pgp_key(&self, kid: &Kid) -> Option<&str> {
        match self.by_kid.get(kid) {
            Some(GenericKey::Pgp(set)) => set.export(),
            _ => None,
        }
    }

    /// Verify a signature made by `kid`. NaCl signing keys are self-describing,
    /// so they verify even if the server didn't return their bundle.
    pub fn verify(&self, kid: &Kid, sig: &str) -> Result<VerifiedPayload, CryptoError> {
        match self.by_kid.get(kid) {
            Some(key) => key.verify(sig),
            None if kid.is_nacl_sig() => NaclSigningKey::from_kid(kid)?.verify(sig),
            None => Err(CryptoError::UnknownKey(kid.clone())),
        }
    }
}
