// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Tests for the key ring and key family

use super::*;
use crate::crypto::{nacl, StandardKeyImporter};
use crate::test_utils::{fake_pgp_bundle, FakePgpImporter};
use crate::types::{DeviceId, DeviceSection, PerUserKeySection, RevokeSection, SigId};
use ed25519_dalek::SigningKey;

const UID: &str = "dbb165b7879fe7b1174df73bed0b9519";

fn uid() -> Uid {
    Uid::parse(UID).unwrap()
}

fn nacl_kid(seed: u8) -> Kid {
    nacl::signing_kid(&SigningKey::from_bytes(&[seed; 32]).verifying_key())
}

fn enc_kid(seed: u8) -> Kid {
    nacl::encryption_kid(&[seed; 32])
}

fn sig_id(n: u8) -> SigId {
    SigId::new(&format!("{}0f", hex::encode([n; 32])))
}

fn device(id: &str) -> DeviceSection {
    DeviceSection {
        id: DeviceId(id.to_string()),
        name: Some(format!("{id} laptop")),
        device_type: Some("desktop".to_string()),
    }
}

// ============================================
// Key ring
// ============================================

#[test]
fn test_ring_verifies_unlisted_nacl_keys() -> Result<(), CryptoError> {
    let key = SigningKey::from_bytes(&[5; 32]);
    let sig = nacl::sign(&key, b"payload")?;
    let ring = KeyRing::new(uid());
    assert_eq!(b"payload".to_vec(), ring.verify(&nacl_kid(5), &sig)?.payload);
    assert!(ring.verify(&Kid::new("0101ff"), &sig).is_err());
    Ok(())
}

#[test]
fn test_ring_pgp_versions() -> Result<(), CryptoError> {
    let kid = Kid::new("0101aabbcc");
    let v1 = fake_pgp_bundle(&kid, 1, 1);
    let v2 = fake_pgp_bundle(&kid, 2, 2);
    let importer = StandardKeyImporter::with_pgp(Arc::new(FakePgpImporter));
    let mut ring = KeyRing::new(uid());
    ring.import_all(&importer, [&v1, &v2])?;
    assert_eq!(1, ring.len());

    let sig1 = nacl::sign(&SigningKey::from_bytes(&[1; 32]), b"one")?;
    let sig2 = nacl::sign(&SigningKey::from_bytes(&[2; 32]), b"two")?;

    // nothing selected: any version verifies, the newest exports
    ring.verify(&kid, &sig1)?;
    ring.verify(&kid, &sig2)?;
    assert_eq!(Some(v2.as_str()), ring.export_pgp_key(&kid));

    ring.select_pgp_key(&kid, &sha256(v1.as_bytes()))?;
    ring.verify(&kid, &sig1)?;
    assert!(ring.verify(&kid, &sig2).is_err());
    assert_eq!(Some(v1.as_str()), ring.export_pgp_key(&kid));

    assert!(matches!(
        ring.select_pgp_key(&kid, &sha256(b"unknown")),
        Err(CryptoError::UnknownKey(_))
    ));
    Ok(())
}

// ============================================
// Key family
// ============================================

#[test]
fn test_family_devices() -> Result<(), String> {
    let mut family = KeyFamily::new(uid(), nacl_kid(1));
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(1), Some(&device("a")))?;
    family.add_nacl_subkey(&enc_kid(1), &sig_id(2), Some(&device("a")), None)?;
    family.add_nacl_sibkey(&nacl_kid(2), &sig_id(3), Some(&device("b")))?;
    // no device section: attach through the parent key
    family.add_nacl_subkey(&enc_kid(2), &sig_id(4), None, Some(&nacl_kid(2)))?;

    let devices = family.devices();
    assert_eq!(2, devices.len());
    assert_eq!(Some(enc_kid(1)), devices[0].keys.enc);
    assert_eq!(Some(enc_kid(2)), devices[1].keys.enc);
    assert!(family.is_active(&nacl_kid(2)));
    Ok(())
}

#[test]
fn test_revoking_device_key_removes_device() -> Result<(), String> {
    let mut family = KeyFamily::new(uid(), nacl_kid(1));
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(1), Some(&device("a")))?;
    family.add_nacl_sibkey(&nacl_kid(2), &sig_id(2), Some(&device("b")))?;
    family.add_nacl_subkey(&enc_kid(2), &sig_id(3), Some(&device("b")), None)?;

    family.revoke(&RevokeSection {
        kid: Some(nacl_kid(2)),
        ..Default::default()
    })?;
    assert!(!family.is_active(&nacl_kid(2)));
    assert!(!family.contains(&nacl_kid(2)));
    assert!(!family.contains(&enc_kid(2)));
    assert_eq!(1, family.devices().len());
    Ok(())
}

#[test]
fn test_revoking_by_sig_id() -> Result<(), String> {
    let mut family = KeyFamily::new(uid(), nacl_kid(1));
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(1), None)?;
    family.add_nacl_sibkey(&nacl_kid(2), &sig_id(2), None)?;
    // the suffix-free form of the id revokes the same delegation
    family.revoke_sig(&SigId::new(&hex::encode([2u8; 32])))?;
    assert!(!family.contains(&nacl_kid(2)));
    assert!(family.is_active(&nacl_kid(1)));

    assert!(family.revoke_sig(&SigId::new("abcd")).is_err());
    Ok(())
}

#[test]
fn test_per_user_keys() -> Result<(), String> {
    let mut family = KeyFamily::new(uid(), nacl_kid(1));
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(1), None)?;
    let gen1 = PerUserKeySection {
        generation: 1,
        signing_kid: nacl_kid(10),
        encryption_kid: enc_kid(10),
        reverse_sig: None,
    };
    family.add_per_user_key(&gen1, &sig_id(2))?;
    // per-user keys never sign links
    assert!(!family.is_active(&nacl_kid(10)));
    assert!(family.contains(&nacl_kid(10)));

    let gen2 = PerUserKeySection {
        generation: 2,
        signing_kid: nacl_kid(11),
        encryption_kid: enc_kid(11),
        reverse_sig: None,
    };
    family.add_per_user_key(&gen2, &sig_id(3))?;
    assert!(!family.contains(&nacl_kid(10)));
    assert_eq!(2, family.per_user_key().unwrap().generation);
    assert_eq!(
        Err("Per-user key generation 1 doesn't follow 2".to_string()),
        family.add_per_user_key(&gen1, &sig_id(4))
    );
    assert_eq!(2, family.per_user_key().unwrap().generation);

    family.revoke_sig(&sig_id(3))?;
    assert_eq!(None, family.per_user_key());
    assert!(!family.contains(&enc_kid(11)));
    Ok(())
}

#[test]
fn test_user_keys_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let pgp = Kid::new("0101aabbcc");
    let bundle = fake_pgp_bundle(&pgp, 3, 1);
    let importer = StandardKeyImporter::with_pgp(Arc::new(FakePgpImporter));
    let mut ring = KeyRing::new(uid());
    ring.import_all(&importer, [&bundle])?;

    let mut family = KeyFamily::new(uid(), pgp.clone());
    family.add_pgp_key(&pgp, &sig_id(1))?;
    family.add_nacl_sibkey(&nacl_kid(2), &sig_id(2), Some(&device("a")))?;

    let keys = UserKeys::new(&family, &ring);
    assert_eq!(vec![bundle], keys.pgp_keys);
    assert_eq!(1, keys.devices.len());
    assert_eq!(None, keys.puk);
    assert_eq!(
        format!("{UID}: no per-user key, 1 live device(s), 1 live PGP key(s)"),
        family.summary()
    );
    Ok(())
}

#[test]
fn test_readding_a_key_keeps_one_record() -> Result<(), String> {
    let mut family = KeyFamily::new(uid(), nacl_kid(1));
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(1), Some(&device("a")))?;
    family.add_nacl_sibkey(&nacl_kid(1), &sig_id(2), Some(&device("a")))?;
    assert_eq!(1, family.devices().len());
    family.revoke_key(&nacl_kid(1));
    assert!(family.devices().is_empty());
    assert!(!family.contains(&nacl_kid(1)));
    Ok(())
}
