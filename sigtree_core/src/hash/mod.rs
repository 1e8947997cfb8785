// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains all the hashing utilities needed for walking the merkle trees
//! and verifying sigchain links
//!
//! Two digest widths are in use: SHA2-512 commits the main tree's nodes and the reset
//! chain, and SHA2-256 is used for everything else (sigchain links, tree-root payloads,
//! the legacy UID tree and the blockchain anchor). Each width gets its own wrapper type
//! so that the two can't be confused at compile time.

use sha2::Digest as _;


/// An error occurred while parsing a digest
#[derive(Debug, Eq, PartialEq)]
pub enum HashError {
    /// The value was not valid hex
    InvalidHex(String),
    /// The value had the wrong number of bytes for the digest
    InvalidLength(String),
}

impl core::fmt::Display for HashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let code = match &self {
            HashError::InvalidHex(msg) => format!("(Invalid hex) - {msg}"),
            HashError::InvalidLength(msg) => format!("(Invalid length) - {msg}"),
        };
        write!(f, "Hashing error: {code}")
    }
}

/// A fixed-width digest produced by one of the supported hash functions
pub trait TreeDigest:
    Copy
    + Eq
    + Ord
    + core::hash::Hash
    + core::fmt::Debug
    + core::fmt::Display
    + Send
    + Sync
    + 'static
{
    /// The number of bytes in the digest
    const DIGEST_BYTES: usize;

    /// Hash a single byte array
    fn digest(item: &[u8]) -> Self;

    /// Try and parse a digest from an unknown length of bytes
    fn try_from_slice(value: &[u8]) -> Result<Self, HashError>;

    /// The raw digest bytes
    fn as_bytes(&self) -> &[u8];

    /// Parse a digest from its (case-insensitive) hex representation
    fn try_parse_hex(value: &str) -> Result<Self, HashError> {
        let bytes =
            hex::decode(value).map_err(|err| HashError::InvalidHex(format!("{value}: {err}")))?;
        Self::try_from_slice(&bytes)
    }

    /// Lowercase hex encoding of the digest
    fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

macro_rules! digest_type {
    ($name:ident, $bytes:expr, $hasher:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $bytes]);

        impl TreeDigest for $name {
            const DIGEST_BYTES: usize = $bytes;

            fn digest(item: &[u8]) -> Self {
                let mut out = [0u8; $bytes];
                out.copy_from_slice(&<$hasher>::digest(item));
                Self(out)
            }

            fn try_from_slice(value: &[u8]) -> Result<Self, HashError> {
                if value.len() != $bytes {
                    return Err(HashError::InvalidLength(format!(
                        "Failed to parse {}. Expected {} bytes but the value has {} bytes",
                        stringify!($name),
                        $bytes,
                        value.len()
                    )));
                }
                let mut out = [0u8; $bytes];
                out.copy_from_slice(value);
                Ok(Self(out))
            }

            fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl core::str::FromStr for $name {
            type Err = HashError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_parse_hex(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let hex_str = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::try_parse_hex(&hex_str).map_err(serde::de::Error::custom)
            }
        }
    };
}

digest_type!(
    Sha256Hash,
    32,
    sha2::Sha256,
    "A SHA2-256 digest (sigchain links, tree-root payloads, the legacy UID tree)"
);
digest_type!(
    Sha512Hash,
    64,
    sha2::Sha512,
    "A SHA2-512 digest (main tree nodes and the reset chain)"
);

/// Hash a byte array with SHA2-256
pub fn sha256(item: &[u8]) -> Sha256Hash {
    Sha256Hash::digest(item)
}

/// Hash a byte array with SHA2-512
pub fn sha512(item: &[u8]) -> Sha512Hash {
    Sha512Hash::digest(item)
}
