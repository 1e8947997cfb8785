// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verifies the signature over a merkle root

use super::VerificationError;
use crate::configuration::Configuration;
use crate::crypto::{envelope::dearmor, NaclSigningKey, SignatureVerifier};
use crate::hash::{sha256, Sha256Hash};
use crate::types::{PathAndSigs, TreeRoots};

/// A merkle root whose signature checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRoot {
    /// The signed root
    pub roots: TreeRoots,
    /// Hash of the signed payload, as referenced by other roots' skip tables
    pub roots_hash: Sha256Hash,
    /// Hash of the de-armored signature, as posted to the blockchain
    pub anchor_hash: Sha256Hash,
}

/// Check the root key's signature on the root a path hangs from. If
/// `expected_anchor` is given, the signature must also be the one that was
/// anchored to the blockchain.
pub fn check_root_sigs<TC: Configuration>(
    path_and_sigs: &PathAndSigs,
    expected_anchor: Option<&Sha256Hash>,
) -> Result<VerifiedRoot, VerificationError> {
    let kid = TC::root_signing_kid();
    let sig = path_and_sigs
        .root
        .sigs
        .get(kid.as_str())
        .ok_or_else(|| {
            VerificationError::TreeIntegrity(format!("Root isn't signed by the root key {kid}"))
        })?;

    let anchor_hash = sha256(&dearmor(&sig.sig)?);
    if let Some(expected) = expected_anchor {
        if *expected != anchor_hash {
            return Err(VerificationError::TreeIntegrity(format!(
                "Root signature hashes to {anchor_hash} but the blockchain anchored {expected}"
            )));
        }
    }

    let key = NaclSigningKey::from_kid(&kid)?;
    let verified = key.verify(&sig.sig)?;
    let roots = TreeRoots::parse(&verified.payload).map_err(VerificationError::TreeIntegrity)?;
    Ok(VerifiedRoot {
        roots,
        roots_hash: sha256(&verified.payload),
        anchor_hash,
    })
}
