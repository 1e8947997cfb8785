// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Progress reporting. The verification pipeline calls a [Reporter] at fixed
//! checkpoints; what (if anything) gets shown is up to the implementation.

/// A stage of verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Fetching the blockchain-anchored root hash
    FetchAnchor,
    /// Fetching the latest merkle path
    FetchLatestPath,
    /// Checking merkle root signatures
    CheckRootSigs,
    /// Resolving a username to a UID
    ExtractUid,
    /// Fetching the anchored merkle path
    FetchHistoricalPath,
    /// Walking merkle paths to the user's leaf
    WalkPaths,
    /// Walking the skip chain between the latest and anchored roots
    CheckSkips,
    /// Fetching the sigchain
    FetchSigChain,
    /// Checking the sigchain's hash chain
    CheckSigChain,
    /// Checking the reset chain
    CheckResetChain,
    /// Fetching the user's public keys
    FetchKeys,
    /// Replaying the sigchain into a key family
    PlaySigChain,
}

impl core::fmt::Display for Step {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Step::FetchAnchor => "fetch anchor",
            Step::FetchLatestPath => "fetch latest merkle path",
            Step::CheckRootSigs => "check root signatures",
            Step::ExtractUid => "extract UID",
            Step::FetchHistoricalPath => "fetch anchored merkle path",
            Step::WalkPaths => "walk merkle paths",
            Step::CheckSkips => "check skip chain",
            Step::FetchSigChain => "fetch sigchain",
            Step::CheckSigChain => "check sigchain links",
            Step::CheckResetChain => "check reset chain",
            Step::FetchKeys => "fetch public keys",
            Step::PlaySigChain => "play sigchain",
        };
        write!(f, "{name}")
    }
}

/// Observer of verification progress
pub trait Reporter: Send + Sync {
    /// A step started
    fn start(&self, _step: Step) {}

    /// Progress within a step
    fn update(&self, _step: Step, _detail: &str) {}

    /// A step finished
    fn success(&self, _step: Step, _detail: &str) {}

    /// A step failed, aborting verification
    fn fail(&self, _step: Step, _err: &dyn core::fmt::Display) {}

    /// Something non-fatal worth surfacing
    fn warn(&self, _msg: &str) {}
}

/// Reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}
