// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Process-wide table of the SIMICS sessions handed out to C callers

use crate::{
    error::{Error, Result},
    simics::Simics,
    SimicsHandle,
};
use lazy_static::lazy_static;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

lazy_static! {
    static ref SESSIONS: Mutex<HashMap<SimicsHandle, Arc<Mutex<Simics>>>> =
        Mutex::new(HashMap::new());
}

fn sessions() -> Result<MutexGuard<'static, HashMap<SimicsHandle, Arc<Mutex<Simics>>>>> {
    SESSIONS
        .lock()
        .map_err(|_| Error::Poisoned { what: "session registry" })
}

/// Take ownership of a session and return the handle it is registered under
pub fn insert(simics: Simics) -> Result<SimicsHandle> {
    let handle = simics.handle();
    sessions()?.insert(handle, Arc::new(Mutex::new(simics)));
    Ok(handle)
}

/// Run `f` on the session registered under `handle`. The registry is only locked for the
/// lookup, so a long operation on one session does not block the others.
pub fn with<F, T>(handle: SimicsHandle, f: F) -> Result<T>
where
    F: FnOnce(&mut Simics) -> Result<T>,
{
    let session = sessions()?
        .get(&handle)
        .cloned()
        .ok_or(Error::UnknownHandle { handle })?;

    let mut simics = session
        .lock()
        .map_err(|_| Error::Poisoned { what: "session" })?;

    f(&mut simics)
}

/// Unregister the session under `handle` and return it. The caller decides how to shut
/// it down; dropping it terminates the SIMICS process.
pub fn remove(handle: SimicsHandle) -> Result<Arc<Mutex<Simics>>> {
    sessions()?
        .remove(&handle)
        .ok_or(Error::UnknownHandle { handle })
}

pub fn contains(handle: SimicsHandle) -> Result<bool> {
    Ok(sessions()?.contains_key(&handle))
}
