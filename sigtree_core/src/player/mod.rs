// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Replays a structurally verified sigchain into a [KeyFamily].
//!
//! A chain may span several eldest epochs (one per account reset). Only the
//! rightmost epoch, the one belonging to the current eldest key, is replayed.

use crate::configuration::Configuration;
use crate::crypto::{NaclSigningKey, SignatureVerifier};
use crate::hash::sha256;
use crate::keys::{KeyFamily, KeyRing, UserKeys};
use crate::reporter::{Reporter, Step};
use crate::types::{ChainLink, ChainLinkBundle, KeyType, Kid, LinkKind, ResetChainLink, SigId, UserSigChain, Uid};
use crate::utils::canonical_json;
use crate::verify::VerificationError;


fn link_error(seqno: u64, msg: impl core::fmt::Display) -> VerificationError {
    VerificationError::SigChainIntegrity(format!("Link {seqno}: {msg}"))
}

/// Whether `curr` opens a new eldest epoch, given the link before it
pub fn is_subchain_start<TC: Configuration>(curr: &ChainLinkBundle, prev: &ChainLinkBundle) -> bool {
    let link = &curr.inner;
    if link.seqno() == 1 || link.is_eldest() {
        return true;
    }
    // v2 links can be stubbed, which breaks both heuristics below
    if curr.outer.is_some() || prev.outer.is_some() {
        return false;
    }
    link.eldest_kid() != prev.inner.eldest_kid()
        || TC::is_hardcoded_reset(link.uid().as_str(), link.seqno())
}

/// Crop the chain to the epoch of `eldest`, the eldest key in the user's leaf.
/// Returns an empty slice if the account was reset and has no links since.
pub fn crop_to_rightmost_subchain<'a, TC: Configuration>(
    links: &'a [ChainLinkBundle],
    eldest: Option<&Kid>,
) -> Result<&'a [ChainLinkBundle], VerificationError> {
    let last = match links.last() {
        Some(last) => last,
        None => return Ok(links),
    };
    if Some(last.inner.eldest_kid()) != eldest {
        return Ok(&links[links.len()..]);
    }
    for i in (1..links.len()).rev() {
        if is_subchain_start::<TC>(&links[i], &links[i - 1]) {
            return Ok(&links[i..]);
        }
    }
    let first = &links[0];
    if first.seqno() != 1 && !first.inner.is_eldest() {
        return Err(link_error(
            first.seqno(),
            "chain doesn't start at seqno 1 or with an eldest link",
        ));
    }
    Ok(links)
}

/// Cross-check a cropped subchain against the reset chain. A subchain which
/// ended at the most recent reset is stale and comes back empty.
pub fn check_subchain_against_reset_chain<'a>(
    full: &[ChainLinkBundle],
    subchain: &'a [ChainLinkBundle],
    resets: Option<&[ResetChainLink]>,
) -> Result<&'a [ChainLinkBundle], VerificationError> {
    if full.is_empty() {
        return Ok(subchain);
    }
    let last_reset = resets.and_then(|r| r.last());
    match (subchain.first(), subchain.last(), last_reset) {
        (None, _, None) => Err(VerificationError::ResetChainIntegrity(
            "No links belong to the current eldest key but the account was never reset"
                .to_string(),
        )),
        (None, _, Some(_)) => Ok(subchain),
        (Some(first), _, None) => {
            if first.seqno() == 1 {
                Ok(subchain)
            } else {
                Err(VerificationError::ResetChainIntegrity(format!(
                    "Subchain starts at {} but the account was never reset",
                    first.seqno()
                )))
            }
        }
        (Some(first), Some(last), Some(reset)) => {
            let public_seqno = reset.prev.public_seqno;
            if public_seqno + 1 == first.seqno() {
                Ok(subchain)
            } else if public_seqno == last.seqno() {
                Ok(&subchain[subchain.len()..])
            } else {
                Err(VerificationError::ResetChainIntegrity(format!(
                    "Reset {} ended the chain at {public_seqno}, but the subchain spans {}..={}",
                    reset.reset_seqno,
                    first.seqno(),
                    last.seqno()
                )))
            }
        }
        (Some(_), None, Some(_)) => Ok(subchain),
    }
}

/// Crop, cross-check and replay a user's chain. Returns `None` if the current
/// epoch has no links.
pub fn play_sigchain<TC: Configuration>(
    chain: &UserSigChain,
    ring: &mut KeyRing,
    reporter: &dyn Reporter,
) -> Result<Option<UserKeys>, VerificationError> {
    let cropped = crop_to_rightmost_subchain::<TC>(&chain.links, chain.eldest.as_ref())?;
    let subchain =
        check_subchain_against_reset_chain(&chain.links, cropped, chain.resets.as_deref())?;
    reporter.update(
        Step::PlaySigChain,
        &format!("replaying {} of {} links", subchain.len(), chain.links.len()),
    );
    let family = play_subchain(&chain.uid, subchain, chain.eldest.as_ref(), ring, reporter)?;
    Ok(family.map(|family| UserKeys::new(&family, ring)))
}

/// Replay a single epoch, starting with its eldest link
pub fn play_subchain(
    uid: &Uid,
    subchain: &[ChainLinkBundle],
    eldest: Option<&Kid>,
    ring: &mut KeyRing,
    reporter: &dyn Reporter,
) -> Result<Option<KeyFamily>, VerificationError> {
    let (first, rest) = match subchain.split_first() {
        Some(split) => split,
        None => return Ok(None),
    };
    let eldest = eldest.ok_or_else(|| {
        link_error(first.seqno(), "subchain is non-empty but the leaf has no eldest key")
    })?;

    let mut family = play_eldest_link(uid, first, eldest, ring)?;
    for bundle in rest {
        play_link(uid, &mut family, bundle, ring)?;
        reporter.update(Step::PlaySigChain, &format!("played link {}", bundle.seqno()));
    }
    reporter.update(Step::PlaySigChain, &family.summary());
    Ok(Some(family))
}

/// Check a link's signature, returning the signature id
fn verify_link(bundle: &ChainLinkBundle, ring: &KeyRing) -> Result<SigId, VerificationError> {
    let verified = ring.verify(&bundle.kid, &bundle.sig)?;
    let got = sha256(&verified.payload);
    if got != bundle.payload_hash {
        return Err(link_error(
            bundle.seqno(),
            format!(
                "signature covers {got} but the link hashes to {}",
                bundle.payload_hash
            ),
        ));
    }
    Ok(verified.sig_id())
}

/// The payload of a reverse signature must be the link itself, with the
/// reverse signature nulled out
fn check_reverse_payload(
    link: &ChainLink,
    section: &str,
    payload: &[u8],
) -> Result<(), VerificationError> {
    let expected = link
        .payload_for_reverse_sig(section)
        .map_err(|err| link_error(link.seqno(), err))?;
    let got: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|err| link_error(link.seqno(), format!("reverse signature payload: {err}")))?;
    if canonical_json(&got) != expected {
        return Err(link_error(
            link.seqno(),
            format!("{section} reverse signature covers a different payload"),
        ));
    }
    Ok(())
}

fn play_eldest_link(
    uid: &Uid,
    bundle: &ChainLinkBundle,
    eldest: &Kid,
    ring: &KeyRing,
) -> Result<KeyFamily, VerificationError> {
    let seqno = bundle.seqno();
    if bundle.inner.uid() != uid {
        return Err(link_error(seqno, format!("link belongs to {}", bundle.inner.uid())));
    }
    let sig_id = verify_link(bundle, ring)?;
    if bundle.kid != *eldest {
        return Err(link_error(
            seqno,
            format!("signed by {} but the eldest key is {eldest}", bundle.kid),
        ));
    }

    let mut family = KeyFamily::new(uid.clone(), eldest.clone());
    let added = match eldest.key_type() {
        KeyType::NaclSig => match bundle.inner.kind().map_err(|err| link_error(seqno, err))? {
            LinkKind::Eldest(device) => family.add_nacl_sibkey(eldest, &sig_id, device),
            _ => Err(format!(
                "a NaCl eldest key must start with an eldest link, not {}",
                bundle.inner.link_type()
            )),
        },
        // legacy PGP accounts establish their eldest key implicitly
        KeyType::Pgp => family.add_pgp_key(eldest, &sig_id),
        KeyType::NaclEnc => Err("an encryption key can't be eldest".to_string()),
    };
    added.map_err(|err| link_error(seqno, err))?;
    Ok(family)
}

fn play_link(
    uid: &Uid,
    family: &mut KeyFamily,
    bundle: &ChainLinkBundle,
    ring: &mut KeyRing,
) -> Result<(), VerificationError> {
    let link = &bundle.inner;
    let seqno = link.seqno();
    if link.uid() != uid {
        return Err(link_error(seqno, format!("link belongs to {}", link.uid())));
    }
    let sig_id = verify_link(bundle, ring)?;
    if !family.is_active(&bundle.kid) {
        return Err(link_error(
            seqno,
            format!("signed by {} which isn't active", bundle.kid),
        ));
    }

    let applied = match link.kind().map_err(|err| link_error(seqno, err))? {
        LinkKind::Eldest(_) => return Err(link_error(seqno, "unexpected eldest link")),
        LinkKind::Sibkey(sibkey, device) => {
            let reverse_sig = sibkey
                .reverse_sig
                .as_deref()
                .ok_or_else(|| link_error(seqno, "sibkey is missing its reverse signature"))?;
            let reverse = ring.verify(&sibkey.kid, reverse_sig)?;
            check_reverse_payload(link, "sibkey", &reverse.payload)?;
            if sibkey.kid.is_pgp() {
                family.add_pgp_key(&sibkey.kid, &sig_id)
            } else {
                family.add_nacl_sibkey(&sibkey.kid, &sig_id, device)
            }
        }
        LinkKind::Subkey(subkey, device) => family.add_nacl_subkey(
            &subkey.kid,
            &sig_id,
            device,
            Some(subkey.parent_kid.as_ref().unwrap_or(&bundle.kid)),
        ),
        LinkKind::PgpUpdate(update) => {
            ring.select_pgp_key(&update.kid, &update.full_hash)?;
            Ok(())
        }
        LinkKind::PerUserKey(puk) => {
            let reverse_sig = puk.reverse_sig.as_deref().ok_or_else(|| {
                link_error(seqno, "per-user key is missing its reverse signature")
            })?;
            let reverse = NaclSigningKey::from_kid(&puk.signing_kid)?.verify(reverse_sig)?;
            check_reverse_payload(link, "per_user_key", &reverse.payload)?;
            family.add_per_user_key(puk, &sig_id)
        }
        LinkKind::Other(_) => Ok(()),
    };
    applied.map_err(|err| link_error(seqno, err))?;

    if let Some(revoke) = link.revokes() {
        family
            .revoke(revoke)
            .map_err(|err| link_error(seqno, err))?;
    }
    Ok(())
}
