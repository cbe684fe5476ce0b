// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! SIMICS control for the CONFUSE host interface
//!
//! A session is a SIMICS child process launched from a project with a configuration file.
//! The host drives it with signals: `SIGUSR1` runs the simulation and `SIGUSR2` resets it
//! to its start snapshot. SIMICS answers each request (and reports that it is ready after
//! launch) by sending `SIGUSR2` back to the pid in `CONFUSE_HOST_PID`.

pub mod ack;

use crate::{
    app::ConfigFile,
    config::HostConfig,
    error::{Error, Result},
    project::SimicsProject,
    SimicsHandle,
};
use ack::{Ack, AckRouter, AckWait};
use nix::{
    sys::signal::{kill, killpg, Signal},
    unistd::Pid,
};
use std::{
    os::unix::process::CommandExt,
    path::Path,
    process::{id, Child, Command, ExitStatus, Stdio},
    sync::Arc,
    thread::sleep,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Environment variable telling SIMICS where to send acknowledgements
pub const HOST_PID_ENV: &str = "CONFUSE_HOST_PID";

/// Interval at which the SIMICS process is checked for exit while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A step of the control handshake
pub enum Phase {
    Startup,
    Run,
    Reset,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Startup => "startup",
            Phase::Run => "run",
            Phase::Reset => "reset",
        }
    }

    /// The request signal for this phase. Startup has none, SIMICS reports readiness on
    /// its own.
    fn signal(&self) -> Option<Signal> {
        match self {
            Phase::Startup => None,
            Phase::Run => Some(Signal::SIGUSR1),
            Phase::Reset => Some(Signal::SIGUSR2),
        }
    }

    fn timeout(&self, config: &HostConfig) -> Option<Duration> {
        match self {
            Phase::Startup => config.startup_timeout,
            Phase::Run => config.run_timeout,
            Phase::Reset => config.reset_timeout,
        }
    }
}

pub struct Simics {
    /// Project the session was launched from
    project: SimicsProject,
    config_file: ConfigFile,
    host_config: HostConfig,
    /// SIMICS child process
    child: Child,
    handle: SimicsHandle,
    ack: Arc<Ack>,
    router: Arc<AckRouter>,
    /// Exit status once the child has been reaped
    exited: Option<ExitStatus>,
    /// Launched without waiting for readiness and the ready acknowledgement has not been
    /// counted yet
    ready_pending: bool,
}

impl Simics {
    /// Launch SIMICS from `project` with `config` and, if configured to, wait until it
    /// reports that it is ready
    pub fn launch<P, C>(project: P, config: C, host_config: HostConfig) -> Result<Self>
    where
        P: AsRef<Path>,
        C: AsRef<Path>,
    {
        let project = SimicsProject::try_from(project.as_ref())?;
        let config_file = ConfigFile::load(&project, config)?;

        // Installed before the launch so the first acknowledgement has somewhere to go
        let router = AckRouter::get()?;

        let mut command = Command::new(project.launcher());

        command
            .arg(config_file.path())
            .args(&host_config.simics_args)
            .current_dir(project.path())
            .env(HOST_PID_ENV, id().to_string())
            .stdin(Stdio::null())
            .process_group(0);

        if host_config.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        info!(
            "Launching SIMICS {} with {}",
            project.launcher().display(),
            config_file.path().display()
        );

        let ready_pending = !host_config.wait_for_ready;
        let (child, ack) = router.spawn(&mut command)?;
        let handle = SimicsHandle::try_from(child.id())?;

        info!("Launched SIMICS with handle {}", handle);

        let mut simics = Self {
            project,
            config_file,
            host_config,
            child,
            handle,
            ack,
            router,
            exited: None,
            ready_pending,
        };

        if simics.host_config.wait_for_ready {
            // The ready acknowledgement may already have arrived, so count from zero
            simics.wait(Phase::Startup, 0)?;
            info!("SIMICS session {} is ready", handle);
        }

        Ok(simics)
    }

    pub fn handle(&self) -> SimicsHandle {
        self.handle
    }

    pub fn project(&self) -> &SimicsProject {
        &self.project
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config_file
    }

    /// Run the simulator by issuing SIGUSR1 and waiting for a return SIGUSR2
    pub fn run(&mut self) -> Result<()> {
        self.request(Phase::Run)
    }

    /// Reset the simulator by issuing SIGUSR2 and waiting for a return SIGUSR2
    pub fn reset(&mut self) -> Result<()> {
        self.request(Phase::Reset)
    }

    /// Whether the SIMICS process is still alive
    pub fn is_running(&mut self) -> Result<bool> {
        Ok(self.poll_exit()?.is_none())
    }

    /// Stop the session: SIGTERM to its process group, then SIGKILL to the group if
    /// anything in it is still alive after the shutdown timeout. Returns the exit status
    /// of the SIMICS process.
    pub fn stop(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.poll_exit()? {
            if !self.group_alive() {
                return Ok(status);
            }
        }

        info!("Stopping SIMICS session {}", self.handle);

        Self::terminate(self.handle);

        let start = Instant::now();

        while start.elapsed() < self.host_config.shutdown_timeout {
            if let Some(status) = self.poll_exit()? {
                if !self.group_alive() {
                    return Ok(status);
                }
            }
            sleep(POLL_INTERVAL.min(self.host_config.shutdown_timeout));
        }

        warn!(
            "SIMICS session {} did not exit within {:?}, killing its process group",
            self.handle, self.host_config.shutdown_timeout
        );

        // The group may empty between the last poll and the kill
        if let Err(e) = killpg(Pid::from_raw(self.handle), Signal::SIGKILL) {
            debug!("Kill of process group {} failed: {}", self.handle, e);
        }

        match self.exited {
            Some(status) => Ok(status),
            None => {
                let status = self.child.wait()?;
                self.exited = Some(status);
                Ok(status)
            }
        }
    }

    /// Send SIGTERM to every process in the process group of the session `handle`
    pub fn terminate(handle: SimicsHandle) {
        if let Err(e) = killpg(Pid::from_raw(handle), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to process group {}: {}", handle, e);
        }
    }

    /// Whether any process is left in the session's process group. An unreaped SIMICS
    /// process still counts, so this is only checked after it has been reaped.
    fn group_alive(&self) -> bool {
        killpg(Pid::from_raw(self.handle), None).is_ok()
    }

    fn poll_exit(&mut self) -> Result<Option<ExitStatus>> {
        if self.exited.is_none() {
            self.exited = self.child.try_wait()?;

            if let Some(status) = self.exited {
                debug!("SIMICS session {} exited with {}", self.handle, status);
            }
        }

        Ok(self.exited)
    }

    fn exited_error(&mut self, phase: Phase) -> Result<()> {
        match self.poll_exit()? {
            Some(status) => Err(Error::Exited {
                handle: self.handle,
                phase: phase.name(),
                status,
            }),
            None => Ok(()),
        }
    }

    /// Send the request for `phase` and wait for SIMICS to acknowledge it
    fn request(&mut self, phase: Phase) -> Result<()> {
        self.exited_error(phase)?;

        let seen = self.baseline()?;

        if let Some(signal) = phase.signal() {
            debug!("Sending {} to SIMICS session {}", signal, self.handle);

            kill(Pid::from_raw(self.handle), signal).map_err(|e| Error::Signal {
                handle: self.handle,
                signal,
                source: e,
            })?;
        }

        self.wait(phase, seen)
    }

    /// The acknowledgement count a new request has to get past. A ready acknowledgement
    /// that has not arrived yet is still owed and does not answer the request.
    fn baseline(&mut self) -> Result<u64> {
        let count = *self.ack.lock()?;

        if self.ready_pending {
            if count == 0 {
                return Ok(1);
            }

            self.ready_pending = false;
        }

        Ok(count)
    }

    fn wait(&mut self, phase: Phase, seen: u64) -> Result<()> {
        let timeout = phase.timeout(&self.host_config);
        let ack = self.ack.clone();

        match ack.wait_for(seen, timeout, POLL_INTERVAL, || self.exited_error(phase))? {
            AckWait::Acknowledged => {
                debug!("SIMICS session {} acknowledged {}", self.handle, phase.name());
                Ok(())
            }
            AckWait::TimedOut => {
                // An exit just before the deadline is the more useful error
                self.exited_error(phase)?;

                Err(Error::Timeout {
                    handle: self.handle,
                    phase: phase.name(),
                    timeout: timeout.unwrap_or_default(),
                })
            }
        }
    }
}

impl Drop for Simics {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop SIMICS session {}: {}", self.handle, e);
        }

        if let Err(e) = self.router.unregister(self.handle, &self.ack) {
            warn!(
                "Failed to unregister SIMICS session {}: {}",
                self.handle, e
            );
        }
    }
}
