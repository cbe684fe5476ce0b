// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Generates the C header for the host interface into `OUT_DIR`

use anyhow::{anyhow, Context, Result};
use cbindgen::{Builder, Language};
use std::{env::var, path::PathBuf};

const HEADER_NAME: &str = "confuse_ll.h";

/// Return the OUT_DIR build directory as a PathBuf
fn out_dir() -> Result<PathBuf> {
    var("OUT_DIR")
        .map(PathBuf::from)
        .context("OUT_DIR is not set")
}

/// Return the CARGO_MANIFEST_DIR directory as a PathBuf
fn cargo_manifest_dir() -> Result<PathBuf> {
    var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .context("CARGO_MANIFEST_DIR is not set")
}

fn main() -> Result<()> {
    let manifest_dir = cargo_manifest_dir()?;
    let header = out_dir()?.join(HEADER_NAME);

    println!("cargo:rerun-if-changed=src/api.rs");
    println!("cargo:rerun-if-changed=src/error.rs");

    Builder::new()
        .with_include_guard("CONFUSE_LL_H")
        .with_line_length(88)
        .with_tab_width(4)
        .with_language(Language::C)
        .with_documentation(true)
        .with_sys_include("sys/types.h")
        .rename_item("SimicsHandle", "simics_handle")
        .with_crate(&manifest_dir)
        .generate()
        .map_err(|e| anyhow!("Unable to generate C bindings: {}", e))?
        .write_to_file(&header);

    Ok(())
}
