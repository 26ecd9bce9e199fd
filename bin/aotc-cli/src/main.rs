// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # aotc
//!
//! Command-line interface for the ahead-of-time export pipeline.
//!
//! ## Usage
//! ```bash
//! # Export a model directory (model.json + model.safetensors)
//! aotc export --model ./models/abs_sqrt --output-dir ./out --stem abs_sqrt
//!
//! # Export a built-in demo with the legacy pipeline
//! aotc export --demo quantize --pipeline legacy
//!
//! # Print the method table of a program or bundle
//! aotc inspect ./out/abs_sqrt.aotb
//!
//! # Re-run a bundle's test cases
//! aotc verify ./out/abs_sqrt.aotb --atol 1e-4 --rtol 1e-4
//! ```

mod commands;
mod demos;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aotc",
    about = "Ahead-of-time model export to delegated executable programs",
    version,
    author
)]
struct Cli {
    /// Path to a TOML export configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, transform and save a model as program + bundle.
    Export {
        /// Model directory with model.json and optional model.safetensors.
        #[arg(short, long, conflicts_with = "demo", required_unless_present = "demo")]
        model: Option<PathBuf>,

        /// Built-in demo model: abs_sqrt, quantize, dequantize, add_relu.
        #[arg(short, long)]
        demo: Option<String>,

        /// Output directory (overrides the config).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Artifact file stem (overrides the config).
        #[arg(short, long)]
        stem: Option<String>,

        /// Pipeline variant: legacy or fused (overrides the config).
        #[arg(short, long)]
        pipeline: Option<String>,
    },

    /// Print the method table, instructions and constants of an artifact.
    Inspect {
        /// A `.aotp` program or `.aotb` bundle.
        file: PathBuf,
    },

    /// Run a bundle's test cases and compare against the golden outputs.
    Verify {
        /// A `.aotb` bundle.
        bundle: PathBuf,

        /// Absolute tolerance (overrides the config).
        #[arg(long)]
        atol: Option<f64>,

        /// Relative tolerance (overrides the config).
        #[arg(long)]
        rtol: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Export {
            model,
            demo,
            output_dir,
            stem,
            pipeline,
        } => commands::export::execute(config, model, demo, output_dir, stem, pipeline),
        Commands::Inspect { file } => commands::inspect::execute(file),
        Commands::Verify { bundle, atol, rtol } => commands::verify::execute(config, bundle, atol, rtol),
    }
}
