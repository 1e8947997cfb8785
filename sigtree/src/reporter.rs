// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A [Reporter] which forwards verification progress to the `log` facade

use dashmap::DashMap;
use log::{debug, error, info, warn};
use tokio::time::Instant;

pub use sigtree_core::reporter::{NullReporter, Reporter, Step};

/// Logs every step at `info`, progress detail at `debug` and failures at
/// `error`, timing each step from its start
#[derive(Debug, Default)]
pub struct LogReporter {
    started: DashMap<Step, Instant>,
}

impl LogReporter {
    /// Creates a new log reporter
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed_millis(&self, step: Step) -> Option<u128> {
        self.started
            .remove(&step)
            .map(|(_, started)| started.elapsed().as_millis())
    }
}

impl Reporter for LogReporter {
    fn start(&self, step: Step) {
        self.started.insert(step, Instant::now());
        info!("{step}: started");
    }

    fn update(&self, step: Step, detail: &str) {
        debug!("{step}: {detail}");
    }

    fn success(&self, step: Step, detail: &str) {
        match self.elapsed_millis(step) {
            Some(millis) if detail.is_empty() => info!("{step}: ok ({millis} ms)"),
            Some(millis) => info!("{step}: {detail} ({millis} ms)"),
            None if detail.is_empty() => info!("{step}: ok"),
            None => info!("{step}: {detail}"),
        }
    }

    fn fail(&self, step: Step, err: &dyn core::fmt::Display) {
        self.started.remove(&step);
        error!("{step}: failed with {err}");
    }

    fn warn(&self, msg: &str) {
        warn!("{msg}");
    }
}
