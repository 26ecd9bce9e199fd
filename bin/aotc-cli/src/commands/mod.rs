// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

pub mod export;
pub mod inspect;
pub mod verify;

use aot_runtime::ExportConfig;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v` flags.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Reads the TOML config, or returns defaults when none was given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ExportConfig> {
    match path {
        Some(p) => Ok(ExportConfig::from_file(p)?),
        None => Ok(ExportConfig::default()),
    }
}

/// Prints the three-line title box used by every command.
pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║{:^54}║", title);
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}
