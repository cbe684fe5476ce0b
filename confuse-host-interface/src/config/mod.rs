// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Settings controlling how SIMICS sessions are launched and how long the host waits on
//! each phase of the control handshake

use crate::error::{Error, Result};
use std::{env::var, time::Duration};
use typed_builder::TypedBuilder;

impl HostConfig {
    /// Booting a target to its harness can take minutes of host time
    pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_SIMICS_ARGS: [&'static str; 3] = ["-batch-mode", "-e", "@SIM_main_loop()"];

    pub const ENV_STARTUP_TIMEOUT: &'static str = "CONFUSE_STARTUP_TIMEOUT_MS";
    pub const ENV_RUN_TIMEOUT: &'static str = "CONFUSE_RUN_TIMEOUT_MS";
    pub const ENV_RESET_TIMEOUT: &'static str = "CONFUSE_RESET_TIMEOUT_MS";
    pub const ENV_SHUTDOWN_TIMEOUT: &'static str = "CONFUSE_SHUTDOWN_TIMEOUT_MS";
    pub const ENV_WAIT_FOR_READY: &'static str = "CONFUSE_WAIT_FOR_READY";
    pub const ENV_SIMICS_ARGS: &'static str = "CONFUSE_SIMICS_ARGS";
    pub const ENV_QUIET: &'static str = "CONFUSE_QUIET";

    fn default_simics_args() -> Vec<String> {
        Self::DEFAULT_SIMICS_ARGS
            .iter()
            .map(|a| a.to_string())
            .collect()
    }
}

#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    #[builder(default = Some(HostConfig::DEFAULT_STARTUP_TIMEOUT))]
    /// How long to wait for the ready acknowledgement after launch. `None` waits
    /// indefinitely
    pub startup_timeout: Option<Duration>,
    #[builder(default)]
    /// How long a single run may take before it is considered hung
    pub run_timeout: Option<Duration>,
    #[builder(default = Some(HostConfig::DEFAULT_RESET_TIMEOUT))]
    pub reset_timeout: Option<Duration>,
    #[builder(default = HostConfig::DEFAULT_SHUTDOWN_TIMEOUT)]
    /// Grace period between SIGTERM and SIGKILL when a session is stopped
    pub shutdown_timeout: Duration,
    #[builder(default = true)]
    /// Whether launching waits for SIMICS to report that it is ready
    pub wait_for_ready: bool,
    #[builder(default = HostConfig::default_simics_args())]
    /// Arguments passed to the SIMICS launcher after the configuration file
    pub simics_args: Vec<String>,
    #[builder(default = false)]
    /// Discard the output of the SIMICS process instead of inheriting the host's streams
    pub quiet: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HostConfig {
    /// Read the configuration from `CONFUSE_*` environment variables, falling back to
    /// the defaults for any variable which is unset
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(Self::ENV_STARTUP_TIMEOUT) {
            config.startup_timeout = parse_timeout(Self::ENV_STARTUP_TIMEOUT, &value)?;
        }

        if let Some(value) = lookup(Self::ENV_RUN_TIMEOUT) {
            config.run_timeout = parse_timeout(Self::ENV_RUN_TIMEOUT, &value)?;
        }

        if let Some(value) = lookup(Self::ENV_RESET_TIMEOUT) {
            config.reset_timeout = parse_timeout(Self::ENV_RESET_TIMEOUT, &value)?;
        }

        if let Some(value) = lookup(Self::ENV_SHUTDOWN_TIMEOUT) {
            config.shutdown_timeout = parse_timeout(Self::ENV_SHUTDOWN_TIMEOUT, &value)?
                .unwrap_or(Duration::ZERO);
        }

        if let Some(value) = lookup(Self::ENV_WAIT_FOR_READY) {
            config.wait_for_ready = parse_bool(Self::ENV_WAIT_FOR_READY, &value)?;
        }

        if let Some(value) = lookup(Self::ENV_SIMICS_ARGS) {
            config.simics_args = value.split_whitespace().map(|a| a.to_string()).collect();
        }

        if let Some(value) = lookup(Self::ENV_QUIET) {
            config.quiet = parse_bool(Self::ENV_QUIET, &value)?;
        }

        Ok(config)
    }
}

/// Parse a timeout in milliseconds, where `0` or `none` disables the timeout
fn parse_timeout(name: &str, value: &str) -> Result<Option<Duration>> {
    let value = value.trim();

    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    match value.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(millis) => Ok(Some(Duration::from_millis(millis))),
        Err(e) => Err(Error::InvalidArgument {
            name: name.to_string(),
            message: format!("expected milliseconds, got '{}': {}", value, e),
        }),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidArgument {
            name: name.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}
