// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Log output for hosts that link the interface from C and have no tracing subscriber of
//! their own

use std::{
    env::var,
    fs::OpenOptions,
    io::stderr,
    sync::{Mutex, Once},
};
use tracing::{debug, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry};

/// Filter directives, e.g. `debug` or `confuse_host_interface=trace`
pub const LOG_ENV: &str = "CONFUSE_LOG";
/// Append log output to this file instead of stderr
pub const LOG_FILE_ENV: &str = "CONFUSE_LOG_FILE";
const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Install the global subscriber once. An existing subscriber installed by the host is
/// left in place.
pub fn init() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let file = var(LOG_FILE_ENV).ok().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| eprintln!("Unable to open log file {}: {}", path, e))
                .ok()
        });

        let installed = match file {
            Some(file) => registry()
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file))
                        .with_filter(filter),
                )
                .try_init(),
            None => registry()
                .with(fmt::layer().with_writer(stderr).with_filter(filter))
                .try_init(),
        };

        match installed {
            Ok(_) => debug!("Installed log subscriber"),
            Err(e) => warn!("Using existing log subscriber: {}", e),
        }
    });
}
