// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! SIMICS configuration files passed to the simulator at launch. App YAML files are parsed
//! and checked before SIMICS is started so that obvious mistakes are reported immediately
//! instead of after a slow simulator boot.

use crate::{
    error::{Error, Result},
    project::SimicsProject,
};
use serde::Deserialize;
use serde_yaml::{from_str, Value};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Params to a simics app have one of these types
pub enum SimicsAppParamType {
    Int,
    Float,
    Str,
    Bool,
    File,
    List,
}

impl SimicsAppParamType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            SimicsAppParamType::Int => value.is_i64() || value.is_u64(),
            SimicsAppParamType::Float => value.is_number(),
            SimicsAppParamType::Str | SimicsAppParamType::File => value.is_string(),
            SimicsAppParamType::Bool => value.is_bool(),
            SimicsAppParamType::List => value.is_sequence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Parameter to a simics app. These always have a type and may have a default (if the
/// default is not provided, it must be set by the app's script)
pub struct SimicsAppParam {
    #[serde(rename = "type")]
    pub typ: SimicsAppParamType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub output: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimicsApp {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, SimicsAppParam>,
    #[serde(default)]
    pub script: String,
}

impl SimicsApp {
    /// Parse an app file's contents, checking that every parameter default matches its
    /// declared type and that a script is named
    pub fn parse<P>(path: P, contents: &str) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();

        let app: SimicsApp = from_str(contents).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if app.script.trim().is_empty() {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: "app has no script".to_string(),
            });
        }

        if let Some((name, param)) = app.params.iter().find(|(_, p)| {
            p.default
                .as_ref()
                .is_some_and(|d| !d.is_null() && !p.typ.accepts(d))
        }) {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: format!(
                    "default {:?} for param {} does not match type {:?}",
                    param.default, name, param.typ
                ),
            });
        }

        Ok(app)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigKind {
    /// A YAML app description
    App(SimicsApp),
    /// A SIMICS CLI script
    Script,
    /// A Python script
    Python,
}

#[derive(Debug, Clone, PartialEq)]
/// A configuration file resolved against a project, ready to hand to the launcher
pub struct ConfigFile {
    path: PathBuf,
    kind: ConfigKind,
}

impl ConfigFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &ConfigKind {
        &self.kind
    }

    /// Resolve `config` against `project` and check it. The kind is chosen by extension:
    /// `.yml`/`.yaml` app files are parsed, `.simics` and `.py` scripts are passed through.
    pub fn load<P>(project: &SimicsProject, config: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = project.resolve(config)?;

        if !path.is_file() {
            return Err(Error::Config {
                path,
                message: "no such file".to_string(),
            });
        }

        let kind = match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => {
                let contents = read_to_string(&path).map_err(|e| Error::Config {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                ConfigKind::App(SimicsApp::parse(&path, &contents)?)
            }
            Some("simics") => ConfigKind::Script,
            Some("py") => ConfigKind::Python,
            _ => {
                return Err(Error::Config {
                    path,
                    message: "expected a .yml, .yaml, .simics, or .py file".to_string(),
                })
            }
        };

        Ok(Self { path, kind })
    }
}
