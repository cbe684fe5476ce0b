// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! CONFUSE host interface
//!
//! Launches SIMICS from an existing project and drives it from the host: each session can
//! be run until the target stops and reset back to its start snapshot. The interface is
//! exported to C (see `confuse_ll.h`, generated into the build directory) and is also
//! usable directly from Rust through [`Simics`].
//!
//! ```c
//! simics_handle simics;
//!
//! if (confuse_init("/path/to/project", "%simics%/targets/app.yml", &simics) != CONFUSE_OK) {
//!     return 1;
//! }
//!
//! for (;;) {
//!     confuse_run(simics);
//!     confuse_reset(simics);
//! }
//! ```

use libc::pid_t;

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod project;
pub mod registry;
pub mod simics;

pub use config::HostConfig;
pub use error::{Error, Result};
pub use simics::Simics;

/// Process id of a running SIMICS instance
pub type SimicsHandle = pid_t;
