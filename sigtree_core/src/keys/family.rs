// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The key family: which keys a user has delegated and not yet revoked.
//!
//! Every delegated key gets exactly one record in an arena. The id, device and
//! signature indices point into that arena, and removing a record cleans up
//! every index that refers to it, so a revoked key can't linger in any of them.

use super::KeyRing;
use crate::types::{DeviceId, DeviceSection, Kid, PerUserKeySection, RevokeSection, SigId, SigIdKey, Uid};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

type KeyHandle = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyRole {
    Sibkey(Option<DeviceId>),
    Subkey(Option<DeviceId>),
    Pgp,
    PerUserSig,
    PerUserEnc,
}

#[derive(Debug, Clone)]
struct KeyRecord {
    kid: Kid,
    role: KeyRole,
}

#[derive(Debug, Clone)]
struct DeviceRecord {
    name: Option<String>,
    device_type: Option<String>,
    sig: KeyHandle,
    enc: Option<KeyHandle>,
}

#[derive(Debug, Clone)]
struct PukRecord {
    generation: u64,
    sig: KeyHandle,
    enc: KeyHandle,
}

/// The keys a device holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceKeys {
    /// Signing key
    pub sig: Kid,
    /// Encryption key, once delegated
    pub enc: Option<Kid>,
}

/// A live device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Device identifier
    pub id: DeviceId,
    /// Device name
    pub name: Option<String>,
    /// Device type
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    /// The device's keys
    pub keys: DeviceKeys,
}

/// The two halves of a per-user key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerUserKeyPair {
    /// Signing half
    pub sig: Kid,
    /// Encryption half
    pub enc: Kid,
}

/// The current per-user key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerUserKey {
    /// Generation, increasing with every rotation
    pub generation: u64,
    /// The key pair
    pub keys: PerUserKeyPair,
}

/// A user's current keys: the end result of a sigchain replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserKeys {
    /// The current per-user key
    pub puk: Option<PerUserKey>,
    /// Live devices
    pub devices: Vec<Device>,
    /// Armored bundles of the live PGP keys
    pub pgp_keys: Vec<String>,
}

impl UserKeys {
    /// Snapshot a key family, exporting PGP bundles from the key ring
    pub fn new(family: &KeyFamily, ring: &KeyRing) -> Self {
        Self {
            puk: family.per_user_key(),
            devices: family.devices(),
            pgp_keys: family
                .pgp_kids()
                .iter()
                .filter_map(|kid| ring.export_pgp_key(kid).map(str::to_string))
                .collect(),
        }
    }
}

/// The delegated keys of one sigchain epoch
#[derive(Debug, Clone)]
pub struct KeyFamily {
    uid: Uid,
    eldest: Kid,
    records: Vec<Option<KeyRecord>>,
    by_kid: HashMap<Kid, KeyHandle>,
    by_sig: HashMap<SigIdKey, Vec<Kid>>,
    devices: BTreeMap<DeviceId, DeviceRecord>,
    puk: Option<PukRecord>,
}

impl KeyFamily {
    /// An empty family for the epoch started by `eldest`
    pub fn new(uid: Uid, eldest: Kid) -> Self {
        Self {
            uid,
            eldest,
            records: Vec::new(),
            by_kid: HashMap::new(),
            by_sig: HashMap::new(),
            devices: BTreeMap::new(),
            puk: None,
        }
    }

    /// The owner
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// The eldest key of this epoch
    pub fn eldest(&self) -> &Kid {
        &self.eldest
    }

    fn insert(&mut self, kid: &Kid, role: KeyRole) -> KeyHandle {
        if let Some(existing) = self.by_kid.get(kid).copied() {
            self.remove(existing);
        }
        let handle = self.records.len();
        self.records.push(Some(KeyRecord {
            kid: kid.clone(),
            role,
        }));
        self.by_kid.insert(kid.clone(), handle);
        handle
    }

    fn remove(&mut self, handle: KeyHandle) {
        let record = match self.records.get_mut(handle).and_then(Option::take) {
            Some(record) => record,
            None => return,
        };
        if self.by_kid.get(&record.kid) == Some(&handle) {
            self.by_kid.remove(&record.kid);
        }
        match record.role {
            KeyRole::Sibkey(Some(device)) => {
                let owns_device = self.devices.get(&device).map(|d| d.sig) == Some(handle);
                if owns_device {
                    // a device without its signing key is gone, encryption key included
                    if let Some(enc) = self.devices.remove(&device).and_then(|d| d.enc) {
                        self.remove(enc);
                    }
                }
            }
            KeyRole::Subkey(Some(device)) => {
                if let Some(d) = self.devices.get_mut(&device) {
                    if d.enc == Some(handle) {
                        d.enc = None;
                    }
                }
            }
            KeyRole::PerUserSig | KeyRole::PerUserEnc => {
                let owns_puk = self
                    .puk
                    .as_ref()
                    .map_or(false, |p| p.sig == handle || p.enc == handle);
                if owns_puk {
                    if let Some(puk) = self.puk.take() {
                        self.remove(puk.sig);
                        self.remove(puk.enc);
                    }
                }
            }
            KeyRole::Sibkey(None) | KeyRole::Subkey(None) | KeyRole::Pgp => {}
        }
    }

    fn kid_of(&self, handle: KeyHandle) -> Option<&Kid> {
        self.records
            .get(handle)
            .and_then(|r| r.as_ref())
            .map(|r| &r.kid)
    }

    fn index_sig(&mut self, sig_id: &SigId, kids: Vec<Kid>) -> Result<(), String> {
        self.by_sig.insert(sig_id.to_map_key()?, kids);
        Ok(())
    }

    /// Delegate a NaCl signing key, optionally as a device's key
    pub fn add_nacl_sibkey(
        &mut self,
        kid: &Kid,
        sig_id: &SigId,
        device: Option<&DeviceSection>,
    ) -> Result<(), String> {
        let handle = self.insert(kid, KeyRole::Sibkey(device.map(|d| d.id.clone())));
        if let Some(device) = device {
            if let Some(old_sig) = self.devices.get(&device.id).map(|d| d.sig) {
                self.remove(old_sig);
            }
            self.devices.insert(
                device.id.clone(),
                DeviceRecord {
                    name: device.name.clone(),
                    device_type: device.device_type.clone(),
                    sig: handle,
                    enc: None,
                },
            );
        }
        self.index_sig(sig_id, vec![kid.clone()])
    }

    /// Delegate a NaCl encryption key to the device named in the link, or else
    /// the device owning `parent`
    pub fn add_nacl_subkey(
        &mut self,
        kid: &Kid,
        sig_id: &SigId,
        device: Option<&DeviceSection>,
        parent: Option<&Kid>,
    ) -> Result<(), String> {
        let device_id = match device {
            Some(d) => Some(d.id.clone()),
            None => parent
                .and_then(|p| self.by_kid.get(p))
                .and_then(|h| self.records.get(*h))
                .and_then(|r| r.as_ref())
                .and_then(|r| match &r.role {
                    KeyRole::Sibkey(device) => device.clone(),
                    _ => None,
                }),
        };
        let handle = self.insert(kid, KeyRole::Subkey(device_id.clone()));
        let previous = device_id
            .as_ref()
            .and_then(|id| self.devices.get_mut(id))
            .and_then(|d| d.enc.replace(handle));
        if let Some(previous) = previous {
            if previous != handle {
                self.remove(previous);
            }
        }
        self.index_sig(sig_id, vec![kid.clone()])
    }

    /// Delegate a PGP key
    pub fn add_pgp_key(&mut self, kid: &Kid, sig_id: &SigId) -> Result<(), String> {
        self.insert(kid, KeyRole::Pgp);
        self.index_sig(sig_id, vec![kid.clone()])
    }

    /// Install a new per-user key generation, replacing the previous one
    pub fn add_per_user_key(
        &mut self,
        section: &PerUserKeySection,
        sig_id: &SigId,
    ) -> Result<(), String> {
        if let Some(puk) = self.puk.take() {
            if section.generation <= puk.generation {
                let current = puk.generation;
                self.puk = Some(puk);
                return Err(format!(
                    "Per-user key generation {} doesn't follow {}",
                    section.generation, current
                ));
            }
            self.remove(puk.sig);
            self.remove(puk.enc);
        }
        let sig = self.insert(&section.signing_kid, KeyRole::PerUserSig);
        let enc = self.insert(&section.encryption_kid, KeyRole::PerUserEnc);
        self.puk = Some(PukRecord {
            generation: section.generation,
            sig,
            enc,
        });
        self.index_sig(
            sig_id,
            vec![section.signing_kid.clone(), section.encryption_kid.clone()],
        )
    }

    /// Revoke a key. Unknown keys are ignored.
    pub fn revoke_key(&mut self, kid: &Kid) {
        if let Some(handle) = self.by_kid.get(kid).copied() {
            self.remove(handle);
        }
    }

    /// Revoke every key delegated by a signature
    pub fn revoke_sig(&mut self, sig_id: &SigId) -> Result<(), String> {
        let key = sig_id.to_map_key()?;
        if let Some(kids) = self.by_sig.get(&key).cloned() {
            for kid in kids.iter() {
                self.revoke_key(kid);
            }
        }
        Ok(())
    }

    /// Apply a link's revocations
    pub fn revoke(&mut self, section: &RevokeSection) -> Result<(), String> {
        for sig_id in section.sig_id.iter().chain(section.sig_ids.iter()) {
            self.revoke_sig(sig_id)?;
        }
        for kid in section.kid.iter().chain(section.kids.iter()) {
            self.revoke_key(kid);
        }
        Ok(())
    }

    /// Whether `kid` may sign links: any live device, sibkey or PGP key.
    /// Per-user keys never sign links.
    pub fn is_active(&self, kid: &Kid) -> bool {
        self.by_kid
            .get(kid)
            .and_then(|h| self.records.get(*h))
            .and_then(|r| r.as_ref())
            .map_or(false, |r| {
                !matches!(r.role, KeyRole::PerUserSig | KeyRole::PerUserEnc)
            })
    }

    /// Whether `kid` is present in any index
    pub fn contains(&self, kid: &Kid) -> bool {
        self.by_kid.contains_key(kid)
            || self.devices().iter().any(|d| d.keys.sig == *kid || d.keys.enc.as_ref() == Some(kid))
            || self.pgp_kids().contains(kid)
            || self
                .per_user_key()
                .map_or(false, |p| p.keys.sig == *kid || p.keys.enc == *kid)
    }

    /// Live devices
    pub fn devices(&self) -> Vec<Device> {
        self.devices
            .iter()
            .filter_map(|(id, d)| {
                Some(Device {
                    id: id.clone(),
                    name: d.name.clone(),
                    device_type: d.device_type.clone(),
                    keys: DeviceKeys {
                        sig: self.kid_of(d.sig)?.clone(),
                        enc: d.enc.and_then(|h| self.kid_of(h)).cloned(),
                    },
                })
            })
            .collect()
    }

    /// Live PGP keys
    pub fn pgp_kids(&self) -> Vec<Kid> {
        self.records
            .iter()
            .flatten()
            .filter(|r| r.role == KeyRole::Pgp)
            .map(|r| r.kid.clone())
            .collect()
    }

    /// The current per-user key
    pub fn per_user_key(&self) -> Option<PerUserKey> {
        let puk = self.puk.as_ref()?;
        Some(PerUserKey {
            generation: puk.generation,
            keys: PerUserKeyPair {
                sig: self.kid_of(puk.sig)?.clone(),
                enc: self.kid_of(puk.enc)?.clone(),
            },
        })
    }

    /// One line describing the family
    pub fn summary(&self) -> String {
        let puk = self
            .puk
            .as_ref()
            .map_or_else(|| "no per-user key".to_string(), |p| format!("per-user key generation {}", p.generation));
        format!(
            "{}: {puk}, {} live device(s), {} live PGP key(s)",
            self.uid,
            self.devices.len(),
            self.pgp_kids().len()
        )
    }
}
