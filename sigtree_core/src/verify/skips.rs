// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verifies that a historical root is an ancestor of a newer one, by following
//! the skip tables the roots carry

use super::VerificationError;
use crate::hash::{sha256, Sha256Hash};
use crate::types::TreeRoots;

/// Decompose `n` into descending powers of two, e.g. `13 -> [8, 4, 1]`
pub fn generate_log_sequence(n: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut remaining = n;
    while remaining > 0 {
        let bit = 1u64 << (63 - remaining.leading_zeros());
        out.push(bit);
        remaining -= bit;
    }
    out
}

/// Walk the skip tables back from `latest` to `historical`, checking every
/// intermediate root the server supplied against the hash the previous root
/// committed to. The walk must land on exactly `historical_hash`.
pub fn check_skips(
    latest: &TreeRoots,
    historical: &TreeRoots,
    historical_hash: &Sha256Hash,
    intermediates: &[String],
) -> Result<(), VerificationError> {
    let last = historical.seqno();
    let mut curr_seqno = latest.seqno();
    if curr_seqno < last {
        return Err(VerificationError::SkipChainIntegrity(format!(
            "Latest root {curr_seqno} is older than the anchored root {last}"
        )));
    }
    if curr_seqno == last {
        return Ok(());
    }

    let mut skips = latest.body.skips.clone();
    let mut intermediates = intermediates.iter();
    let mut landed = None;

    for jump in generate_log_sequence(curr_seqno - last) {
        let next_seqno = curr_seqno - jump;
        let next_hash = skips.get(&next_seqno).copied().ok_or_else(|| {
            VerificationError::SkipChainIntegrity(format!(
                "Root {curr_seqno} has no skip to {next_seqno}"
            ))
        })?;
        if next_seqno == last {
            landed = Some(next_hash);
            break;
        }

        let encoded = intermediates.next().ok_or_else(|| {
            VerificationError::SkipChainIntegrity(format!(
                "Server didn't supply the root at {next_seqno}"
            ))
        })?;
        let got = sha256(encoded.as_bytes());
        if got != next_hash {
            return Err(VerificationError::SkipChainIntegrity(format!(
                "Root at {next_seqno} hashes to {got}, expected {next_hash}"
            )));
        }
        let next = TreeRoots::parse(encoded.as_bytes())
            .map_err(VerificationError::SkipChainIntegrity)?;
        if next.seqno() != next_seqno {
            return Err(VerificationError::SkipChainIntegrity(format!(
                "Root at {next_seqno} claims seqno {}",
                next.seqno()
            )));
        }
        skips = next.body.skips;
        curr_seqno = next_seqno;
    }

    match landed {
        Some(hash) if hash == *historical_hash => Ok(()),
        Some(hash) => Err(VerificationError::SkipChainIntegrity(format!(
            "Skip walk landed on {hash} but the anchored root hashes to {historical_hash}"
        ))),
        None => Err(VerificationError::SkipChainIntegrity(format!(
            "Skip walk never reached {last}"
        ))),
    }
}
