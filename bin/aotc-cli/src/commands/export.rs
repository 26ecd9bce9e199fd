// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `aotc export` command: run the full pipeline and write both artifacts.
//!
//! ```text
//! capture → [quantize → fuse] → lower/partition → build → bundle → save → verify
//! ```

use aot_runtime::{export_session, run_and_compare, ExportConfig, PipelineVariant};
use graph_ir::{Module, ModelLoader};
use std::path::PathBuf;
use tensor_core::Tensor;

pub fn execute(
    mut config: ExportConfig,
    model: Option<PathBuf>,
    demo: Option<String>,
    output_dir: Option<PathBuf>,
    stem: Option<String>,
    pipeline: Option<String>,
) -> anyhow::Result<()> {
    super::banner("aotc · Exporter");

    // ── Configuration ──────────────────────────────────────────
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if let Some(stem) = stem {
        config.file_stem = stem;
    }
    if let Some(p) = pipeline {
        config.pipeline = PipelineVariant::parse(&p)?.as_str().into();
    }
    config.validate()?;

    let (module, inputs): (Box<dyn Module>, Vec<Tensor>) = match (model, demo) {
        (Some(dir), _) => {
            let loaded = ModelLoader::load(&dir)
                .map_err(|e| anyhow::anyhow!("failed to load model from '{}': {e}", dir.display()))?;
            let inputs = loaded.example_inputs()?;
            (Box::new(loaded) as Box<dyn Module>, inputs)
        }
        (None, Some(name)) => crate::demos::by_name(&name)?,
        (None, None) => anyhow::bail!("either --model or --demo is required"),
    };

    println!("  Config:");
    println!("   Model:     {}", module.name());
    println!("   Method:    {}", config.method);
    println!("   Pipeline:  {}", config.pipeline);
    println!("   Backends:  [{}]", config.backends.join(", "));
    println!("   Dialect:   {}", config.dialect.kind);
    println!("   Quantize:  {} rule(s)", config.quantization.len());
    println!();

    // ── Pipeline ───────────────────────────────────────────────
    println!("  [1/3] Exporting...");
    let exported = export_session(module.as_ref(), &inputs, &config)?;
    for pass in &exported.metrics.passes {
        println!(
            "        {:<10} {:>4} → {:<4} node(s)  {:>8.2} ms",
            pass.name,
            pass.nodes_before,
            pass.nodes_after,
            pass.duration.as_secs_f64() * 1000.0
        );
    }
    println!();

    println!("  [2/3] Writing artifacts...");
    let paths = exported.save(&config.output_dir, &config.file_stem)?;
    println!("        program: {}", paths.program.display());
    println!("        bundle:  {}", paths.bundle.display());
    println!();

    // ── Verification ───────────────────────────────────────────
    println!("  [3/3] Running bundled test cases...");
    let backends = config.create_backends()?;
    let report = run_and_compare(&exported.bundle, &config.tolerance, &backends);
    println!("        {}", report.summary().replace('\n', "\n        "));
    println!();

    if !report.passed() {
        anyhow::bail!("exported program does not reproduce the golden outputs");
    }
    Ok(())
}
