// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Discovery of an existing SIMICS project on disk and its launcher script

use crate::error::{Error, Result};
use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Placeholder that SIMICS expands to the project root
pub const SIMICS_PATH_PREFIX: &str = "%simics%";
/// Placeholder that SIMICS expands to the directory of the running script
pub const SCRIPT_PATH_PREFIX: &str = "%script%";

#[derive(Debug, Clone, PartialEq, Eq)]
/// A SIMICS project directory with a launcher that can start the simulator
pub struct SimicsProject {
    path: PathBuf,
    launcher: PathBuf,
}

impl SimicsProject {
    /// Launcher locations relative to the project root, in lookup order. Current projects
    /// place `simics` in the root, older ones under `bin/`
    const LAUNCHERS: [&'static str; 2] = ["simics", "bin/simics"];

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    /// Resolve a path given relative to this project. A leading `%simics%` and relative
    /// paths both resolve against the project root. There is no running script to anchor
    /// a `%script%` path to, so those are rejected.
    pub fn resolve<P>(&self, path: P) -> Result<PathBuf>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();

        if path.starts_with(SCRIPT_PATH_PREFIX) {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: "script relative paths are not supported".to_string(),
            });
        }

        if let Ok(rest) = path.strip_prefix(SIMICS_PATH_PREFIX) {
            Ok(self.path.join(rest))
        } else if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.path.join(path))
        }
    }
}

impl TryFrom<PathBuf> for SimicsProject {
    type Error = Error;

    fn try_from(value: PathBuf) -> Result<Self> {
        if !value.is_dir() {
            return Err(Error::Project {
                path: value,
                message: "not a directory".to_string(),
            });
        }

        let path = value.canonicalize()?;

        let launcher = Self::LAUNCHERS
            .iter()
            .map(|l| path.join(l))
            .find(|l| l.is_file())
            .ok_or_else(|| Error::Project {
                path: path.clone(),
                message: format!("no SIMICS launcher found (tried {:?})", Self::LAUNCHERS),
            })?;

        let mode = launcher.metadata()?.permissions().mode();

        if mode & 0o111 == 0 {
            return Err(Error::Project {
                path,
                message: format!("launcher {} is not executable", launcher.display()),
            });
        }

        debug!(
            "Found SIMICS project {} with launcher {}",
            path.display(),
            launcher.display()
        );

        Ok(Self { path, launcher })
    }
}

impl TryFrom<&Path> for SimicsProject {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        Self::try_from(value.to_path_buf())
    }
}
