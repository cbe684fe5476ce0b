// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Fake SIMICS projects for driving the host interface without a SIMICS installation. The
//! launcher is a shell script that speaks the host's signal handshake and records every
//! request it receives in `events.log` in the project directory.

#![allow(dead_code)]

use anyhow::Result;
use indoc::indoc;
use std::{
    fs::{read_to_string, set_permissions, write, Permissions},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    thread::sleep,
    time::{Duration, Instant},
};
use tempfile::{tempdir, TempDir};

/// Acknowledges readiness, every run, and every reset, and exits cleanly on SIGTERM
pub const RESPONSIVE: &str = indoc! {r#"
    #!/bin/sh
    echo "args $*" >> events.log
    trap 'echo run >> events.log; kill -USR2 "$CONFUSE_HOST_PID"' USR1
    trap 'echo reset >> events.log; kill -USR2 "$CONFUSE_HOST_PID"' USR2
    trap 'echo term >> events.log; exit 0' TERM
    echo ready >> events.log
    kill -USR2 "$CONFUSE_HOST_PID"
    while :; do sleep 0.02; done
"#};

/// Exits before reporting that it is ready
pub const EXITS_AT_STARTUP: &str = indoc! {r#"
    #!/bin/sh
    exit 3
"#};

/// Starts but never reports that it is ready
pub const NEVER_READY: &str = indoc! {r#"
    #!/bin/sh
    trap 'exit 0' TERM
    while :; do sleep 0.02; done
"#};

/// Becomes ready, then exits when asked to run
pub const EXITS_ON_RUN: &str = indoc! {r#"
    #!/bin/sh
    trap 'exit 4' USR1
    trap 'exit 0' TERM
    kill -USR2 "$CONFUSE_HOST_PID"
    while :; do sleep 0.02; done
"#};

/// Becomes ready, acknowledges nothing else, and ignores SIGTERM
pub const STUBBORN: &str = indoc! {r#"
    #!/bin/sh
    trap '' TERM
    trap 'echo run >> events.log' USR1
    kill -USR2 "$CONFUSE_HOST_PID"
    while :; do sleep 0.02; done
"#};

/// Forks a group member that ignores SIGTERM and records its pid in `member.pid`, then
/// becomes ready and exits cleanly on SIGTERM
pub const FORKS_MEMBER: &str = indoc! {r#"
    #!/bin/sh
    trap 'echo term >> events.log; exit 0' TERM
    sh -c 'trap "" TERM; echo $$ > member.pid.tmp; mv member.pid.tmp member.pid; while :; do sleep 0.02; done' &
    while [ ! -s member.pid ]; do sleep 0.01; done
    kill -USR2 "$CONFUSE_HOST_PID"
    while :; do sleep 0.02; done
"#};

/// Sends every acknowledgement from a child process instead of the launcher itself. The
/// child lingers so that its process group can still be looked up.
pub const CHILD_ACKS: &str = indoc! {r#"
    #!/bin/sh
    trap 'echo run >> events.log; sh -c "kill -USR2 \$CONFUSE_HOST_PID; sleep 1" &' USR1
    trap 'echo reset >> events.log; sh -c "kill -USR2 \$CONFUSE_HOST_PID; sleep 1" &' USR2
    trap 'echo term >> events.log; exit 0' TERM
    echo ready >> events.log
    sh -c 'kill -USR2 "$CONFUSE_HOST_PID"; sleep 1' &
    while :; do sleep 0.02; done
"#};

/// Reports readiness late from a child process and takes a while to acknowledge a run,
/// so a run requested early sees the ready acknowledgement before its own
pub const LATE_READY: &str = indoc! {r#"
    #!/bin/sh
    trap 'sleep 0.6; echo run >> events.log; kill -USR2 "$CONFUSE_HOST_PID"' USR1
    trap 'echo reset >> events.log; kill -USR2 "$CONFUSE_HOST_PID"' USR2
    trap 'echo term >> events.log; exit 0' TERM
    sh -c 'sleep 0.3; echo ready >> events.log; kill -USR2 "$CONFUSE_HOST_PID"; sleep 1' &
    while :; do sleep 0.02; done
"#};

/// Becomes ready, never acknowledges a run, and exits cleanly on SIGTERM
pub const HANGS_ON_RUN: &str = indoc! {r#"
    #!/bin/sh
    trap 'echo run >> events.log' USR1
    trap 'echo term >> events.log; exit 0' TERM
    kill -USR2 "$CONFUSE_HOST_PID"
    while :; do sleep 0.02; done
"#};

pub const APP_YML: &str = indoc! {r#"
    %YAML 1.2
    ---
    description: Fake target
    params:
      num_cores:
        type: int
        default: 1
      disk0_image:
        type: file
        default: "%simics%/targets/fake/disk.craff"
    script: "%simics%/targets/fake/fake.simics"
    ...
"#};

static SIGNAL_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that exchange signals with a fake SIMICS. Standard signals sent to the
/// same process at the same moment coalesce, so concurrent fake sessions could lose each
/// other's acknowledgements.
pub fn signal_lock() -> MutexGuard<'static, ()> {
    SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct FakeProject {
    dir: TempDir,
}

impl FakeProject {
    /// Create a project whose `simics` launcher is `launcher`, with an app file at
    /// `targets/fake/fake.yml`
    pub fn new(launcher: &str) -> Result<Self> {
        let dir = tempdir()?;
        let launcher_path = dir.path().join("simics");

        write(&launcher_path, launcher)?;
        set_permissions(&launcher_path, Permissions::from_mode(0o755))?;

        let target = dir.path().join("targets").join("fake");
        std::fs::create_dir_all(&target)?;
        write(target.join("fake.yml"), APP_YML)?;
        write(target.join("fake.simics"), "run\n")?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn app(&self) -> PathBuf {
        PathBuf::from("%simics%/targets/fake/fake.yml")
    }

    /// Lines written to the event log so far
    pub fn events(&self) -> Vec<String> {
        read_to_string(self.dir.path().join("events.log"))
            .map(|s| s.lines().map(|l| l.to_string()).collect())
            .unwrap_or_default()
    }

    /// Wait up to `timeout` for `event` to be logged, since a handler may still be
    /// writing when the host observes the process exit
    pub fn wait_for_event(&self, event: &str, timeout: Duration) -> bool {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if self.events().iter().any(|e| e == event) {
                return true;
            }
            sleep(Duration::from_millis(10));
        }

        false
    }
}
