// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verifies the hash chain of a user's sigchain against the tails committed in
//! the merkle tree. Signatures are checked later, while replaying the chain.

use super::VerificationError;
use crate::crypto::SigEnvelope;
use crate::hash::{sha256, Sha256Hash};
use crate::types::{ChainLink, ChainLinkBundle, OuterLink, RawLink, SigChainTail};
use std::collections::BTreeMap;

fn link_error(seqno: u64, msg: impl core::fmt::Display) -> VerificationError {
    VerificationError::SigChainIntegrity(format!("Link {seqno}: {msg}"))
}

/// Structurally check the link at `seqno`. `expected` is the hash the next
/// link (or the merkle tree) committed to, if anything did.
///
/// Returns the checked link along with the hash it commits to for its predecessor.
pub fn check_link(
    raw: &RawLink,
    expected: Option<&Sha256Hash>,
    seqno: u64,
) -> Result<(ChainLinkBundle, Option<Sha256Hash>), VerificationError> {
    let inner_hash = sha256(raw.payload_json.as_bytes());
    let inner = ChainLink::parse(&raw.payload_json).map_err(|err| link_error(seqno, err))?;

    let (payload_hash, outer) = match raw.sig_version {
        1 => (inner_hash, None),
        2 => {
            let (envelope, _) = SigEnvelope::decode_armored(&raw.sig)?;
            let outer =
                OuterLink::decode(&envelope.payload).map_err(|err| link_error(seqno, err))?;
            if outer.prev.as_ref() != inner.prev() {
                return Err(link_error(seqno, "outer and inner prev hashes differ"));
            }
            if outer.curr != inner_hash {
                return Err(link_error(
                    seqno,
                    format!(
                        "outer link commits to {} but the payload hashes to {inner_hash}",
                        outer.curr
                    ),
                ));
            }
            if outer.seqno != seqno {
                return Err(link_error(
                    seqno,
                    format!("outer link claims seqno {}", outer.seqno),
                ));
            }
            (sha256(&envelope.payload), Some(outer))
        }
        other => {
            return Err(link_error(
                seqno,
                format!("unsupported signature version {other}"),
            ))
        }
    };

    if let Some(expected) = expected {
        if *expected != payload_hash {
            return Err(link_error(
                seqno,
                format!("hashes to {payload_hash} but {expected} was committed"),
            ));
        }
    }
    if inner.seqno() != seqno {
        return Err(link_error(
            seqno,
            format!("payload claims seqno {}", inner.seqno()),
        ));
    }
    let prev = inner.prev().copied();
    if seqno > 1 && prev.is_none() {
        return Err(link_error(seqno, "missing prev hash"));
    }

    Ok((
        ChainLinkBundle {
            inner,
            outer,
            sig: raw.sig.clone(),
            kid: raw.kid.clone(),
            payload_hash,
        },
        prev,
    ))
}

/// The chain can only grow: the latest tree must commit to at least as many
/// links as the anchored one. Returns the `seqno -> hash` commitments the
/// served chain must satisfy.
pub fn check_chain_growth(
    latest: &SigChainTail,
    historical: &SigChainTail,
) -> Result<BTreeMap<u64, Sha256Hash>, VerificationError> {
    if latest.seqno < historical.seqno {
        return Err(VerificationError::SigChainIntegrity(format!(
            "Sigchain shrank from {} (anchored) to {} (latest)",
            historical.seqno, latest.seqno
        )));
    }
    if latest.seqno == historical.seqno && latest.link_hash != historical.link_hash {
        return Err(VerificationError::SigChainIntegrity(format!(
            "Latest and anchored trees disagree on link {}",
            latest.seqno
        )));
    }
    let mut assertions = BTreeMap::new();
    for tail in [latest, historical] {
        if tail.seqno > 0 {
            assertions.insert(tail.seqno, tail.link_hash);
        }
    }
    Ok(assertions)
}

/// Check every served link (oldest first), walking from the newest down so that
/// each link's `prev` becomes the expected hash of its predecessor. Every
/// commitment in `assertions` must be met along the way.
pub fn check_chain_links(
    raw_links: &[RawLink],
    assertions: &BTreeMap<u64, Sha256Hash>,
) -> Result<Vec<ChainLinkBundle>, VerificationError> {
    let len = raw_links.len() as u64;
    if let Some((&beyond, _)) = assertions.range(len + 1..).next() {
        return Err(VerificationError::SigChainIntegrity(format!(
            "Server sent {len} links but the tree commits to link {beyond}"
        )));
    }

    let mut expected: Option<Sha256Hash> = None;
    let mut out = Vec::with_capacity(raw_links.len());
    for (idx, raw) in raw_links.iter().enumerate().rev() {
        let seqno = idx as u64 + 1;
        if let Some(asserted) = assertions.get(&seqno) {
            match expected {
                None => expected = Some(*asserted),
                Some(prev) if prev == *asserted => {}
                Some(prev) => {
                    return Err(link_error(
                        seqno,
                        format!("chain commits to {prev} but the tree commits to {asserted}"),
                    ))
                }
            }
        }
        let (bundle, prev) = check_link(raw, expected.as_ref(), seqno)?;
        expected = prev;
        out.push(bundle);
    }
    out.reverse();
    Ok(out)
}
