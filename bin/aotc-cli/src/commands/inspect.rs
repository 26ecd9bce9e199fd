// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `aotc inspect` command: display the contents of a program or bundle.

use program_format::Artifact;
use std::path::PathBuf;

pub fn execute(file: PathBuf) -> anyhow::Result<()> {
    super::banner("aotc · Artifact Inspector");

    let artifact = Artifact::load(&file)
        .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", file.display()))?;
    let program = artifact.program();

    // ── Summary ────────────────────────────────────────────────
    let kind = match &artifact {
        Artifact::Program(_) => "program",
        Artifact::Bundle(_) => "bundle",
    };
    println!("  File: {} ({kind})", file.display());
    println!("  Methods: {}", program.methods().len());
    println!(
        "  Constants: {} ({:.2} KB)",
        program.constants().len(),
        program.constant_bytes() as f64 / 1024.0
    );
    println!();

    // ── Method Table ───────────────────────────────────────────
    println!(
        "  {:<20} {:>7} {:>8} {:>10} {:>6}",
        "Method", "Inputs", "Outputs", "Instrs", "Deleg."
    );
    println!("  {}", "-".repeat(55));
    for m in program.methods() {
        println!(
            "  {:<20} {:>7} {:>8} {:>10} {:>6}",
            truncate(&m.name, 20),
            m.inputs.len(),
            m.outputs.len(),
            m.instructions.len(),
            m.delegate_count()
        );
    }
    println!();

    // ── Instructions ───────────────────────────────────────────
    for m in program.methods() {
        for line in m.to_string().lines() {
            println!("  {line}");
        }
        println!();
    }

    // ── Constants ──────────────────────────────────────────────
    if !program.constants().is_empty() {
        println!("  {:<30} {:<6} {:<16} {:>10}", "Constant", "DType", "Shape", "Bytes");
        println!("  {}", "-".repeat(65));
        for (name, t) in program.constants() {
            println!(
                "  {:<30} {:<6} {:<16} {:>10}",
                truncate(name, 30),
                t.dtype().to_string(),
                t.shape().to_string(),
                t.size_bytes()
            );
        }
        println!();
    }

    // ── Test Cases ─────────────────────────────────────────────
    if let Artifact::Bundle(b) = &artifact {
        println!("  Test cases (format v{}):", b.version());
        for (i, case) in b.test_cases().iter().enumerate() {
            println!(
                "   [{i}] {} · {} input(s) · {} expected output(s)",
                case.method,
                case.inputs.len(),
                case.expected_outputs.len()
            );
        }
        println!();
    }
    Ok(())
}

/// Truncates a string to `max_len` with ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len - 3).collect::<String>())
    }
}
