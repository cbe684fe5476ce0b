// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! C entry points. Every function returns `CONFUSE_OK` on success or one of the negative
//! `CONFUSE_ERR_*` status codes.

use crate::{
    config::HostConfig,
    error::{Error, Result, CONFUSE_ERR_INTERNAL, CONFUSE_OK},
    logging, registry,
    simics::Simics,
    SimicsHandle,
};
use libc::{c_char, c_int};
use std::{
    ffi::CStr,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::TryLockError,
};
use tracing::{error, warn};

/// Convert the result of an entry point to a status code, logging any error
fn status<F>(entrypoint: &'static str, f: F) -> c_int
where
    F: FnOnce() -> Result<()>,
{
    logging::init();

    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => CONFUSE_OK,
        Ok(Err(e)) => {
            error!("{} failed: {}", entrypoint, e);
            e.code()
        }
        Err(_) => {
            error!("{}", Error::Panic { entrypoint });
            CONFUSE_ERR_INTERNAL
        }
    }
}

/// Borrow a C string argument as UTF-8
///
/// # Safety
///
/// `ptr` must be null or point to a nul-terminated string that outlives the returned
/// reference
unsafe fn c_str<'a>(name: &'static str, ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::NullPointer { name });
    }

    Ok(CStr::from_ptr(ptr).to_str()?)
}

#[no_mangle]
/// Launch SIMICS from a project with a configuration file and wait until it is ready.
///
/// `simics_prj` is the path to the root of the SIMICS project. `config` is the path to
/// the SIMICS app YAML file (or a `.simics`/`.py` script) to start, absolute or relative
/// to the project, and may begin with `%simics%`. On success the handle of the running
/// SIMICS instance is written to `simics`.
///
/// # Safety
///
/// `simics_prj` and `config` must be null or valid nul-terminated strings, and `simics`
/// must be null or valid for writes.
pub unsafe extern "C" fn confuse_init(
    simics_prj: *const c_char,
    config: *const c_char,
    simics: *mut SimicsHandle,
) -> c_int {
    status("confuse_init", || {
        let project = c_str("simics_prj", simics_prj)?;
        let config = c_str("config", config)?;

        if simics.is_null() {
            return Err(Error::NullPointer { name: "simics" });
        }

        let host_config = HostConfig::from_env()?;
        let handle = registry::insert(Simics::launch(project, config, host_config)?)?;

        *simics = handle;

        Ok(())
    })
}

#[no_mangle]
/// Reset the SIMICS instance to its start snapshot and wait until the reset completes
pub extern "C" fn confuse_reset(simics: SimicsHandle) -> c_int {
    status("confuse_reset", || registry::with(simics, |s| s.reset()))
}

#[no_mangle]
/// Run the SIMICS instance and wait until the run stops
pub extern "C" fn confuse_run(simics: SimicsHandle) -> c_int {
    status("confuse_run", || registry::with(simics, |s| s.run()))
}

#[no_mangle]
/// Stop the SIMICS instance and release its handle.
///
/// If a `confuse_run` or `confuse_reset` on the same handle is still waiting in another
/// thread, SIGTERM is sent to the instance first so that the waiting call returns with
/// `CONFUSE_ERR_EXITED`. An instance that ignores SIGTERM keeps this call blocked until
/// the waiting call returns (or times out, if a timeout is configured).
pub extern "C" fn confuse_stop(simics: SimicsHandle) -> c_int {
    status("confuse_stop", || {
        let session = registry::remove(simics)?;

        let mut session = match session.try_lock() {
            Ok(session) => session,
            Err(TryLockError::WouldBlock) => {
                warn!("SIMICS session {} is busy, terminating it", simics);
                Simics::terminate(simics);
                session
                    .lock()
                    .map_err(|_| Error::Poisoned { what: "session" })?
            }
            Err(TryLockError::Poisoned(_)) => return Err(Error::Poisoned { what: "session" }),
        };

        session.stop()?;
        Ok(())
    })
}
