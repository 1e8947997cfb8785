// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Console logging for this crate's tests

use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::OnceCell;
use std::sync::Once;
use tokio::time::{Duration, Instant};

static EPOCH: OnceCell<Instant> = OnceCell::new();
static LOGGER: TestConsoleLogger = TestConsoleLogger {};
static INIT_ONCE: Once = Once::new();

pub(crate) struct TestConsoleLogger;

impl TestConsoleLogger {
    pub(crate) fn format_log_record(record: &Record) {
        let target = match (record.target().split("::").last(), record.line()) {
            (Some(module), Some(line)) => format!(" ({module}:{line})"),
            (Some(module), None) => format!(" ({module})"),
            _ => String::new(),
        };

        let toc = EPOCH
            .get()
            .map(|epoch| Instant::now() - *epoch)
            .unwrap_or_else(|| Duration::from_millis(0));
        let seconds = toc.as_secs();

        let msg = format!(
            "[{:02}:{:02}:{:02}.{:03}] {:6} {}{}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60,
            toc.subsec_millis(),
            record.level(),
            record.args(),
            target
        );
        let msg = match record.level() {
            Level::Trace | Level::Debug => msg.white(),
            Level::Info => msg.blue(),
            Level::Warn => msg.yellow(),
            Level::Error => msg.red(),
        };
        println!("{msg}");
    }
}

impl log::Log for TestConsoleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        TestConsoleLogger::format_log_record(record);
    }

    fn flush(&self) {}
}

/// Initialize console logging. Only the first call's level sticks.
pub fn init_logger(level: Level) {
    EPOCH.get_or_init(Instant::now);

    INIT_ONCE.call_once(|| {
        // another logger already being installed is fine
        let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(level.to_level_filter()));
    });
}

#[ctor::ctor]
fn test_start() {
    init_logger(Level::Info);
}
