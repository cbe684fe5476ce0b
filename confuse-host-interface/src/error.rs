// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Host interface Result and error types, and the status codes they map to across the C
//! boundary

use crate::SimicsHandle;
use libc::c_int;
use std::{path::PathBuf, process::ExitStatus, time::Duration};

/// The operation completed successfully
pub const CONFUSE_OK: c_int = 0;
/// A null pointer or a non-UTF-8 string was passed, or an environment override was
/// malformed
pub const CONFUSE_ERR_INVALID_ARGUMENT: c_int = -1;
/// The SIMICS project path does not exist or has no SIMICS launcher
pub const CONFUSE_ERR_PROJECT: c_int = -2;
/// The configuration file is missing, unreadable, or invalid
pub const CONFUSE_ERR_CONFIG: c_int = -3;
/// The SIMICS process could not be launched
pub const CONFUSE_ERR_SPAWN: c_int = -4;
/// The handle does not name a SIMICS session owned by this process
pub const CONFUSE_ERR_UNKNOWN_HANDLE: c_int = -5;
/// A control signal could not be delivered to the SIMICS process
pub const CONFUSE_ERR_SIGNAL: c_int = -6;
/// SIMICS did not acknowledge the request in time
pub const CONFUSE_ERR_TIMEOUT: c_int = -7;
/// The SIMICS process exited
pub const CONFUSE_ERR_EXITED: c_int = -8;
/// An internal failure occurred
pub const CONFUSE_ERR_INTERNAL: c_int = -9;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
/// Host interface errors
pub enum Error {
    #[error("Null pointer passed for argument {name}")]
    NullPointer { name: &'static str },
    #[error("Invalid value for {name}: {message}")]
    InvalidArgument { name: String, message: String },
    #[error("SIMICS project {path} is invalid: {message}")]
    Project { path: PathBuf, message: String },
    #[error("Configuration {path} is invalid: {message}")]
    Config { path: PathBuf, message: String },
    #[error("Failed to parse configuration {path}")]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to launch SIMICS with {launcher}")]
    Spawn {
        launcher: PathBuf,
        source: std::io::Error,
    },
    #[error("No SIMICS session with handle {handle}")]
    UnknownHandle { handle: SimicsHandle },
    #[error("Failed to send {signal} to SIMICS session {handle}")]
    Signal {
        handle: SimicsHandle,
        signal: nix::sys::signal::Signal,
        source: nix::Error,
    },
    #[error("SIMICS session {handle} did not acknowledge {phase} within {timeout:?}")]
    Timeout {
        handle: SimicsHandle,
        phase: &'static str,
        timeout: Duration,
    },
    #[error("SIMICS session {handle} exited ({status}) during {phase}")]
    Exited {
        handle: SimicsHandle,
        phase: &'static str,
        status: ExitStatus,
    },
    #[error("Failed to set up acknowledgement signal handling")]
    SignalHandler { source: std::io::Error },
    #[error("Lock on {what} is poisoned")]
    Poisoned { what: &'static str },
    #[error("Panic in {entrypoint}")]
    Panic { entrypoint: &'static str },

    // Transparently wrapped errors from std
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error(transparent)]
    TryFromIntError(#[from] std::num::TryFromIntError),
}

impl Error {
    /// The status code reported to C callers for this error
    pub fn code(&self) -> c_int {
        match self {
            Error::NullPointer { .. } | Error::InvalidArgument { .. } | Error::Utf8Error(_) => {
                CONFUSE_ERR_INVALID_ARGUMENT
            }
            Error::Project { .. } => CONFUSE_ERR_PROJECT,
            Error::Config { .. } | Error::ConfigParse { .. } => CONFUSE_ERR_CONFIG,
            Error::Spawn { .. } => CONFUSE_ERR_SPAWN,
            Error::UnknownHandle { .. } => CONFUSE_ERR_UNKNOWN_HANDLE,
            Error::Signal { .. } => CONFUSE_ERR_SIGNAL,
            Error::Timeout { .. } => CONFUSE_ERR_TIMEOUT,
            Error::Exited { .. } => CONFUSE_ERR_EXITED,
            Error::SignalHandler { .. }
            | Error::Poisoned { .. }
            | Error::Panic { .. }
            | Error::Io(_)
            | Error::TryFromIntError(_) => CONFUSE_ERR_INTERNAL,
        }
    }
}
