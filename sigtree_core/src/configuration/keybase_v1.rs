// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Defines the Keybase v1 configuration

use crate::configuration::Configuration;
use crate::types::Kid;

/// The key which has signed Keybase's merkle roots since 2016
pub const KEYBASE_ROOT_KID: &str =
    "01209ec31411b9b287f62630c2486005af27548ba62a59bbc802e656b888991a20230a";

/// The Stellar account Keybase posts its root hashes from
pub const KEYBASE_STELLAR_ACCOUNT: &str =
    "GA72FQOMHYUCNEMZN7GY6OBWQTQEXYL43WPYCY2FE3T452USNQ7KSV6E";

/// Accounts which were reset before resets were recorded in the merkle tree
const HARDCODED_RESETS: [(&str, u64); 6] = [
    ("2d5c41137d7d9108dbdaa2160ba7e200", 11),
    ("f1c263462dd526695c458af924977719", 8),
    ("8dbf0f1617e285befa93d3da54b68419", 8),
    ("372c1cbd72e4f851a74d232478a72319", 2),
    ("12e124d5d1ff6179f3aab88100b93d19", 5),
    ("a07089770463db10994c8727177eef19", 12),
];

/// The configuration used by keybase.io
#[derive(Clone)]
pub struct KeybaseV1Configuration;

impl Configuration for KeybaseV1Configuration {
    fn root_signing_kid() -> Kid {
        Kid::new(KEYBASE_ROOT_KID)
    }

    fn anchor_account() -> &'static str {
        KEYBASE_STELLAR_ACCOUNT
    }

    fn anchor_api_uri() -> &'static str {
        "https://horizon.stellar.org"
    }

    fn server_api_uri() -> &'static str {
        "https://keybase.io/_/api/1.0/"
    }

    fn hardcoded_resets() -> &'static [(&'static str, u64)] {
        &HARDCODED_RESETS
    }
}
