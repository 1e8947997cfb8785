// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Defines the configuration trait and the production Keybase configuration

mod traits;
pub use traits::Configuration;

pub(crate) mod keybase_v1;
pub use keybase_v1::KeybaseV1Configuration;
