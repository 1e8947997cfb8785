// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Tracks how far behind the blockchain-anchored view of a user's chain is
//! compared to what the server currently serves

use serde::{Deserialize, Serialize};

/// The three high-water marks of a verification run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMaxes {
    /// Number of links the server served
    pub sig: u64,
    /// Chain tail committed to by the latest merkle root
    pub merkle: u64,
    /// Chain tail committed to by the blockchain-anchored root
    pub anchored: u64,
}

/// One lagging layer in a [ChainMaxes]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessWarning {
    /// The sigchain has links the latest tree doesn't commit to
    MerkleBehindSigchain {
        /// Links served
        sig: u64,
        /// Links committed to by the latest tree
        merkle: u64,
    },
    /// The latest tree commits to links the anchored tree doesn't
    AnchorBehindMerkle {
        /// Links committed to by the latest tree
        merkle: u64,
        /// Links committed to by the anchored tree
        anchored: u64,
    },
}

impl core::fmt::Display for FreshnessWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MerkleBehindSigchain { sig, merkle } => write!(
                f,
                "Merkle tree is behind the sigchain ({merkle} of {sig} links committed)"
            ),
            Self::AnchorBehindMerkle { merkle, anchored } => write!(
                f,
                "Anchored root is behind the merkle tree ({anchored} of {merkle} links anchored)"
            ),
        }
    }
}

impl ChainMaxes {
    /// All three layers agree
    pub fn is_fresh(&self) -> bool {
        self.sig == self.merkle && self.merkle == self.anchored
    }

    /// One warning per adjacent pair of layers which disagree
    pub fn warnings(&self) -> Vec<FreshnessWarning> {
        let mut out = Vec::new();
        if self.sig != self.merkle {
            out.push(FreshnessWarning::MerkleBehindSigchain {
                sig: self.sig,
                merkle: self.merkle,
            });
        }
        if self.merkle != self.anchored {
            out.push(FreshnessWarning::AnchorBehindMerkle {
                merkle: self.merkle,
                anchored: self.anchored,
            });
        }
        out
    }
}
