// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains the structural verification stages: merkle path walks,
//! signed roots, the skip chain, the reset chain and the sigchain hash chain.
//! None of them perform I/O.

pub mod link;
pub mod merkle;
pub mod reset_chain;
pub mod root;
pub mod skips;


use crate::crypto::CryptoError;

/// Verification error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// A merkle path or signed root didn't hash up correctly
    TreeIntegrity(String),
    /// The skip chain between two roots is broken
    SkipChainIntegrity(String),
    /// The reset chain doesn't match the tree
    ResetChainIntegrity(String),
    /// The sigchain's hash chain, seqnos or key replay is broken
    SigChainIntegrity(String),
    /// A signature failed to verify
    Signature(CryptoError),
    /// A payload couldn't be parsed
    Serialization(String),
}

impl std::error::Error for VerificationError {}

impl core::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let code = match &self {
            VerificationError::TreeIntegrity(err) => format!("(Tree integrity) - {err}"),
            VerificationError::SkipChainIntegrity(err) => {
                format!("(Skip chain integrity) - {err}")
            }
            VerificationError::ResetChainIntegrity(err) => {
                format!("(Reset chain integrity) - {err}")
            }
            VerificationError::SigChainIntegrity(err) => {
                format!("(Sigchain integrity) - {err}")
            }
            VerificationError::Signature(err) => err.to_string(),
            VerificationError::Serialization(err) => format!("(Serialization) - {err}"),
        };
        write!(f, "Verification error {code}")
    }
}

impl From<CryptoError> for VerificationError {
    fn from(input: CryptoError) -> Self {
        VerificationError::Signature(input)
    }
}

impl From<serde_json::Error> for VerificationError {
    fn from(input: serde_json::Error) -> Self {
        VerificationError::Serialization(input.to_string())
    }
}

// Re-export the verification functions

pub use link::{check_chain_growth, check_chain_links, check_link};
pub use merkle::{extract_uid, walk_path, walk_to_leaf};
pub use reset_chain::check_reset_chain;
pub use root::check_root_sigs;
pub use skips::{check_skips, generate_log_sequence};
