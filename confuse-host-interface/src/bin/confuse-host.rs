// Copyright (C) 2023 Intel Corporation
// SPDX-License-Identifier: Apache-2.0

//! Drive a SIMICS session from the command line: launch it, run and reset it a number of
//! times, then stop it

use anyhow::{Context, Result};
use clap::Parser;
use confuse_host_interface::{HostConfig, Simics};
use std::{io::stderr, path::PathBuf, time::Duration};
use tracing::{info, Level};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, registry, Layer};

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long)]
    /// Path to the SIMICS project to launch SIMICS from
    project: PathBuf,
    #[arg(short, long)]
    /// Configuration file to start SIMICS with: an app YAML file, `.simics` script, or
    /// `.py` script. Relative paths and paths prefixed with `%simics%` are resolved
    /// against the project
    config: PathBuf,
    #[arg(short = 'n', long, default_value_t = 1)]
    /// Number of run/reset cycles to perform
    iterations: usize,
    #[arg(short, long, default_value_t = Level::INFO)]
    /// Logging level
    log_level: Level,
    #[arg(long)]
    /// Milliseconds to wait for SIMICS to become ready, overriding the environment
    startup_timeout: Option<u64>,
    #[arg(long)]
    /// Milliseconds a single run may take, overriding the environment
    run_timeout: Option<u64>,
    #[arg(long)]
    /// Milliseconds a reset may take, overriding the environment
    reset_timeout: Option<u64>,
    #[arg(short, long, default_value_t = false)]
    /// Discard SIMICS output
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    registry()
        .with(
            fmt::layer()
                .with_writer(stderr)
                .with_filter(LevelFilter::from_level(args.log_level)),
        )
        .init();

    let mut config = HostConfig::from_env()?;

    if let Some(millis) = args.startup_timeout {
        config.startup_timeout = Some(Duration::from_millis(millis));
    }

    if let Some(millis) = args.run_timeout {
        config.run_timeout = Some(Duration::from_millis(millis));
    }

    if let Some(millis) = args.reset_timeout {
        config.reset_timeout = Some(Duration::from_millis(millis));
    }

    config.quiet |= args.quiet;

    let mut simics = Simics::launch(&args.project, &args.config, config)
        .context("Failed to launch SIMICS")?;

    for iteration in 0..args.iterations {
        simics
            .run()
            .with_context(|| format!("Run {} failed", iteration))?;
        simics
            .reset()
            .with_context(|| format!("Reset {} failed", iteration))?;
        info!("Completed iteration {}", iteration);
    }

    let status = simics.stop()?;

    info!("SIMICS exited with {}", status);

    Ok(())
}
