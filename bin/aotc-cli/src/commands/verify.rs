// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `aotc verify` command: replay a bundle and compare with its golden
//! outputs. Any failure makes the process exit non-zero.

use aot_runtime::{run_and_compare, ExportConfig};
use delegate_partitioner::ReferenceDelegate;
use graph_ir::PayloadOwner;
use program_format::Bundle;
use std::path::PathBuf;

pub fn execute(config: ExportConfig, bundle: PathBuf, atol: Option<f64>, rtol: Option<f64>) -> anyhow::Result<()> {
    super::banner("aotc · Bundle Verifier");

    let loaded = Bundle::load(&bundle)
        .map_err(|e| anyhow::anyhow!("failed to read bundle '{}': {e}", bundle.display()))?;

    let mut tolerance = config.tolerance.clone();
    if let Some(a) = atol {
        tolerance.atol = a;
    }
    if let Some(r) = rtol {
        tolerance.rtol = r;
    }
    tolerance.validate()?;

    // Every preset is registered so bundles exported with any of them run.
    let mut backends = config.create_backends()?;
    for preset in [ReferenceDelegate::portable(), ReferenceDelegate::quantized_only()] {
        if backends.get(preset.owner_id()).is_none() {
            backends.register(Box::new(preset));
        }
    }

    println!("  Bundle:    {}", bundle.display());
    println!("  Cases:     {}", loaded.test_cases().len());
    println!("  Tolerance: atol={:e} rtol={:e}", tolerance.atol, tolerance.rtol);
    println!("  Backends:  [{}]", backends.ids().join(", "));
    println!();

    let report = run_and_compare(&loaded, &tolerance, &backends);
    for case in &report.cases {
        println!(
            "   {} case {} ('{}')  max deviation {:.3e}",
            if case.passed { "✓" } else { "✗" },
            case.index,
            case.method,
            case.max_deviation
        );
    }
    println!();
    println!("  {}", report.summary().replace('\n', "\n  "));

    if !report.passed() {
        let failed = report.cases.iter().filter(|c| !c.passed).count();
        anyhow::bail!("{failed} of {} case(s) failed", report.cases.len());
    }
    Ok(())
}
