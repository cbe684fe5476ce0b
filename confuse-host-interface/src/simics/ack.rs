// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Routing of acknowledgement signals from SIMICS processes back to the session waiting
//! on them.
//!
//! Every SIMICS session answers a request by sending `SIGUSR2` to the host. A single
//! process-wide thread receives these signals along with the sender's pid and bumps the
//! acknowledgement count of the matching session, waking whoever is waiting on it.

use crate::{
    error::{Error, Result},
    SimicsHandle,
};
use lazy_static::lazy_static;
use nix::unistd::{getpgid, Pid};
use signal_hook::{
    consts::signal::SIGUSR2,
    iterator::{exfiltrator::origin::WithOrigin, SignalsInfo},
};
use std::{
    collections::HashMap,
    path::PathBuf,
    process::{Child, Command},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::Builder,
    time::{Duration, Instant},
};
use tracing::{debug, error, trace, warn};

lazy_static! {
    static ref ROUTER: Mutex<Option<Arc<AckRouter>>> = Mutex::new(None);
}

#[derive(Debug, Default)]
/// Count of acknowledgements received from one SIMICS session
pub struct Ack {
    count: Mutex<u64>,
    received: Condvar,
}

/// Outcome of waiting for an acknowledgement
pub enum AckWait {
    Acknowledged,
    TimedOut,
}

impl Ack {
    pub fn lock(&self) -> Result<MutexGuard<'_, u64>> {
        self.count
            .lock()
            .map_err(|_| Error::Poisoned { what: "acknowledgement count" })
    }

    fn acknowledge(&self) -> Result<()> {
        let mut count = self.lock()?;
        *count += 1;
        self.received.notify_all();
        Ok(())
    }

    /// Wait until the count exceeds `seen`, for at most `slice`
    pub fn wait_past<'a>(
        &self,
        guard: MutexGuard<'a, u64>,
        seen: u64,
        slice: Duration,
    ) -> Result<(MutexGuard<'a, u64>, AckWait)> {
        let (guard, result) = self
            .received
            .wait_timeout_while(guard, slice, |count| *count <= seen)
            .map_err(|_| Error::Poisoned { what: "acknowledgement count" })?;

        if result.timed_out() {
            Ok((guard, AckWait::TimedOut))
        } else {
            Ok((guard, AckWait::Acknowledged))
        }
    }

    /// Block for at most `timeout` (or forever) until the count exceeds `seen`, calling
    /// `alive` every `poll` to check whether it is still worth waiting. `alive` returning
    /// an error ends the wait with that error.
    pub fn wait_for<F>(
        &self,
        seen: u64,
        timeout: Option<Duration>,
        poll: Duration,
        mut alive: F,
    ) -> Result<AckWait>
    where
        F: FnMut() -> Result<()>,
    {
        let start = Instant::now();
        let mut guard = self.lock()?;

        loop {
            let slice = match timeout {
                Some(timeout) => {
                    let elapsed = start.elapsed();

                    if elapsed >= timeout {
                        return Ok(AckWait::TimedOut);
                    }

                    poll.min(timeout - elapsed)
                }
                None => poll,
            };

            let (next, result) = self.wait_past(guard, seen, slice)?;

            if matches!(result, AckWait::Acknowledged) {
                return Ok(AckWait::Acknowledged);
            }

            drop(next);
            alive()?;
            guard = self.lock()?;
        }
    }
}

/// Process-wide table of sessions waiting on acknowledgements, fed by a signal thread
pub struct AckRouter {
    sessions: Mutex<HashMap<SimicsHandle, Arc<Ack>>>,
}

impl AckRouter {
    /// Return the router, installing the `SIGUSR2` handler and its thread on first use.
    /// The handler must be in place before any SIMICS process is launched, otherwise its
    /// first acknowledgement would terminate the host.
    pub fn get() -> Result<Arc<AckRouter>> {
        let mut router = ROUTER
            .lock()
            .map_err(|_| Error::Poisoned { what: "acknowledgement router" })?;

        if let Some(router) = router.as_ref() {
            return Ok(router.clone());
        }

        let mut signals = SignalsInfo::<WithOrigin>::new([SIGUSR2])
            .map_err(|e| Error::SignalHandler { source: e })?;

        let instance = Arc::new(AckRouter {
            sessions: Mutex::new(HashMap::new()),
        });

        let thread_instance = instance.clone();

        Builder::new()
            .name("confuse-ack".to_string())
            .spawn(move || {
                for origin in signals.forever() {
                    let Some(process) = origin.process else {
                        warn!("Received acknowledgement with no sender, ignoring");
                        continue;
                    };

                    if let Err(e) = thread_instance.route(process.pid) {
                        error!("Failed to route acknowledgement from {}: {}", process.pid, e);
                    }
                }
            })?;

        debug!("Installed acknowledgement handler");

        *router = Some(instance.clone());

        Ok(instance)
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<SimicsHandle, Arc<Ack>>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Poisoned { what: "acknowledgement sessions" })
    }

    /// Deliver an acknowledgement from `sender`, which is either the session process
    /// itself or a member of its process group. A group member must still exist when the
    /// acknowledgement is routed for its group to be looked up.
    fn route(&self, sender: SimicsHandle) -> Result<()> {
        let ack = {
            let sessions = self.sessions()?;

            sessions.get(&sender).cloned().or_else(|| {
                getpgid(Some(Pid::from_raw(sender)))
                    .ok()
                    .and_then(|pgid| sessions.get(&pgid.as_raw()).cloned())
            })
        };

        match ack {
            Some(ack) => {
                trace!("Acknowledgement from {}", sender);
                ack.acknowledge()
            }
            None => {
                warn!("Unroutable acknowledgement from {}, ignoring", sender);
                Ok(())
            }
        }
    }

    /// Spawn `command` and register the new process for acknowledgements. The table is
    /// held across the spawn so an acknowledgement sent immediately after the process
    /// starts cannot arrive before it is registered.
    pub fn spawn(&self, command: &mut Command) -> Result<(Child, Arc<Ack>)> {
        let mut sessions = self.sessions()?;

        let child = command.spawn().map_err(|e| Error::Spawn {
            launcher: PathBuf::from(command.get_program()),
            source: e,
        })?;
        let handle = SimicsHandle::try_from(child.id())?;
        let ack = Arc::new(Ack::default());

        sessions.insert(handle, ack.clone());

        Ok((child, ack))
    }

    /// Stop routing acknowledgements for `handle` to `ack`. If the pid has since been
    /// reused by a newer session, its registration is left alone.
    pub fn unregister(&self, handle: SimicsHandle, ack: &Arc<Ack>) -> Result<()> {
        let mut sessions = self.sessions()?;

        if sessions.get(&handle).is_some_and(|a| Arc::ptr_eq(a, ack)) {
            sessions.remove(&handle);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Ack, AckRouter, AckWait};
    use crate::{error::Error, SimicsHandle};
    use std::{
        collections::HashMap,
        os::unix::process::CommandExt,
        process::{id, Child, Command},
        sync::{Arc, Mutex},
        thread::spawn,
        time::Duration,
    };

    fn router() -> AckRouter {
        AckRouter {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sleeper(group: SimicsHandle) -> (Child, SimicsHandle) {
        let child = Command::new("sleep")
            .arg("10")
            .process_group(group)
            .spawn()
            .expect("Failed to spawn sleep");
        let pid = SimicsHandle::try_from(child.id()).expect("Pid out of range");
        (child, pid)
    }

    #[test]
    /// An acknowledgement that arrives before the wait starts is not lost
    fn test_early_ack() {
        let ack = Ack::default();
        let seen = *ack.lock().expect("Lock failed");
        ack.acknowledge().expect("Acknowledge failed");

        let result = ack
            .wait_for(seen, Some(Duration::from_millis(10)), Duration::from_millis(5), || {
                Ok(())
            })
            .expect("Wait failed");
        assert!(matches!(result, AckWait::Acknowledged));
    }

    #[test]
    fn test_ack_from_thread() {
        let ack = Arc::new(Ack::default());
        let seen = *ack.lock().expect("Lock failed");
        let sender = ack.clone();

        let thread = spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender.acknowledge().expect("Acknowledge failed");
        });

        let result = ack
            .wait_for(seen, Some(Duration::from_secs(10)), Duration::from_millis(5), || {
                Ok(())
            })
            .expect("Wait failed");
        assert!(matches!(result, AckWait::Acknowledged));
        thread.join().expect("Thread panicked");
    }

    #[test]
    fn test_timeout() {
        let ack = Ack::default();
        let result = ack
            .wait_for(0, Some(Duration::from_millis(30)), Duration::from_millis(5), || {
                Ok(())
            })
            .expect("Wait failed");
        assert!(matches!(result, AckWait::TimedOut));
    }

    #[test]
    /// A failing liveness check ends the wait with its error
    fn test_alive_error() {
        let ack = Ack::default();
        let result = ack.wait_for(0, None, Duration::from_millis(5), || {
            Err(Error::UnknownHandle { handle: 7 })
        });
        assert!(matches!(result, Err(Error::UnknownHandle { handle: 7 })));
    }

    #[test]
    /// A sender other than the session process is matched through its process group
    fn test_route_by_group() {
        let router = router();
        let (mut leader, leader_pid) = sleeper(0);
        let (mut member, member_pid) = sleeper(leader_pid);
        let ack = Arc::new(Ack::default());

        router
            .sessions()
            .expect("Lock failed")
            .insert(leader_pid, ack.clone());

        router.route(member_pid).expect("Route failed");
        assert_eq!(*ack.lock().expect("Lock failed"), 1);
        router.route(leader_pid).expect("Route failed");
        assert_eq!(*ack.lock().expect("Lock failed"), 2);

        for child in [&mut leader, &mut member] {
            child.kill().expect("Kill failed");
            child.wait().expect("Wait failed");
        }
    }

    #[test]
    /// Acknowledgements from unknown senders are dropped without touching any session
    fn test_unroutable_ack() {
        let router = router();
        let ack = Arc::new(Ack::default());

        router
            .sessions()
            .expect("Lock failed")
            .insert(-7, ack.clone());

        let own = SimicsHandle::try_from(id()).expect("Pid out of range");
        router.route(own).expect("Route failed");
        router.route(SimicsHandle::MAX).expect("Route failed");

        assert_eq!(*ack.lock().expect("Lock failed"), 0);
    }

    #[test]
    /// A stale session does not unregister a newer session that reused its pid
    fn test_unregister_reused_handle() {
        let router = router();
        let stale = Arc::new(Ack::default());
        let current = Arc::new(Ack::default());

        router
            .sessions()
            .expect("Lock failed")
            .insert(42, current.clone());

        router.unregister(42, &stale).expect("Unregister failed");
        assert!(router.sessions().expect("Lock failed").contains_key(&42));

        router.unregister(42, &current).expect("Unregister failed");
        assert!(!router.sessions().expect("Lock failed").contains_key(&42));
    }
}
