// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Verifies a user's reset chain against the tail committed in their leaf

use super::VerificationError;
use crate::hash::{sha512, Sha512Hash};
use crate::types::{ResetChainLink, ResetChainTail, ResetType};

/// Check the serialized reset links (oldest first) against the leaf's reset
/// tail. Returns the parsed links oldest first, or `None` if the user was
/// never reset.
pub fn check_reset_chain(
    tail: Option<&ResetChainTail>,
    reset_chain: Option<&[String]>,
) -> Result<Option<Vec<ResetChainLink>>, VerificationError> {
    let tail = match tail {
        Some(tail) if tail.count > 0 => tail,
        _ => return Ok(None),
    };
    let reset_chain = reset_chain.ok_or_else(|| {
        VerificationError::ResetChainIntegrity(format!(
            "Leaf records {} resets but the server sent no reset chain",
            tail.count
        ))
    })?;
    if reset_chain.len() as u64 != tail.count {
        return Err(VerificationError::ResetChainIntegrity(format!(
            "Leaf records {} resets but the server sent {}",
            tail.count,
            reset_chain.len()
        )));
    }

    let mut expected: Option<Sha512Hash> = tail.head;
    let mut seqno = tail.count;
    let mut out = Vec::with_capacity(reset_chain.len());
    for (i, encoded) in reset_chain.iter().rev().enumerate() {
        let got = sha512(encoded.as_bytes());
        if expected != Some(got) {
            return Err(VerificationError::ResetChainIntegrity(format!(
                "Reset {seqno} hashes to {got} but {} was committed",
                expected.map_or_else(|| "nothing".to_string(), |h| h.to_string())
            )));
        }
        let link: ResetChainLink = serde_json::from_str(encoded).map_err(|err| {
            VerificationError::ResetChainIntegrity(format!("Reset {seqno} is malformed: {err}"))
        })?;
        if link.reset_seqno != seqno {
            return Err(VerificationError::ResetChainIntegrity(format!(
                "Reset at position {seqno} claims seqno {}",
                link.reset_seqno
            )));
        }
        if link.reset_type == ResetType::Delete && i != 0 {
            return Err(VerificationError::ResetChainIntegrity(format!(
                "Delete at reset {seqno} is not the newest reset"
            )));
        }
        expected = link.prev.reset;
        seqno -= 1;
        out.push(link);
    }

    if let Some(dangling) = expected {
        return Err(VerificationError::ResetChainIntegrity(format!(
            "Oldest reset points back at {dangling}"
        )));
    }
    out.reverse();
    Ok(Some(out))
}
