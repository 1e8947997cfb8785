// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Errors for the verification pipeline
use core::fmt;

use sigtree_core::crypto::CryptoError;
use sigtree_core::VerificationError;

/// Symbolizes a SigtreeError, thrown by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigtreeError {
    /// Error propagation from a verification stage
    Verification(VerificationError),
    /// Error propagation from the fetcher
    Transport(TransportError),
    /// The caller handed us something that is neither a UID nor a username
    InvalidInput(String),
}

impl std::error::Error for SigtreeError {}

impl From<VerificationError> for SigtreeError {
    fn from(error: VerificationError) -> Self {
        Self::Verification(error)
    }
}

impl From<CryptoError> for SigtreeError {
    fn from(error: CryptoError) -> Self {
        Self::Verification(VerificationError::Signature(error))
    }
}

impl From<TransportError> for SigtreeError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl fmt::Display for SigtreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::InvalidInput(input) => write!(f, "Invalid input: {input}"),
        }
    }
}

/// Errors raised while talking to the identity server or the anchor source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server has nothing under the requested key
    NotFound(String),
    /// The server answered with a non-zero status
    Server {
        /// Status code
        code: i64,
        /// Status description
        desc: String,
    },
    /// The request itself failed
    Connection(String),
    /// The response couldn't be decoded
    Decode(String),
}

impl std::error::Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match &self {
            TransportError::NotFound(what) => format!("(Not found) - {what}"),
            TransportError::Server { code, desc } => format!("(Server status {code}) - {desc}"),
            TransportError::Connection(err) => format!("(Connection) - {err}"),
            TransportError::Decode(err) => format!("(Decode) - {err}"),
        };
        write!(f, "Transport error {code}")
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
