// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # aot-runtime
//!
//! Drives the ahead-of-time export pipeline and checks its results.
//!
//! The runtime takes:
//! - A [`graph_ir::Module`] and example inputs.
//! - An [`ExportConfig`] naming the quantization rules, target dialect,
//!   delegate backends and pipeline variant.
//!
//! and produces an [`program_format::ExecutableProgram`] plus a
//! [`program_format::Bundle`] carrying the golden outputs of the
//! unmodified graph. [`run_and_compare`] replays a bundle and compares
//! every output against its golden value.
//!
//! # Type-State Pipeline
//! ```text
//! ExportSession<Captured> ─quantize─► ExportSession<Quantized>
//!        │                                   │
//!        ├──────────── to_edge ──────────────┤──► ExportSession<Lowered> ─partition─┐
//!        │                                   │                                      ▼
//!        └──── to_edge_transform_and_lower ──┴────────────────► ExportSession<Partitioned>
//!                                                                       │ to_executable
//!                                                                       ▼
//!                                                                    Exported
//! ```
//! Transitions are compile-time checked.

mod config;
mod error;
mod metrics;
mod runner;
mod session;

pub use config::{DialectConfig, ExportConfig, OutputTolerance, PipelineVariant, QuantRuleConfig, ToleranceConfig};
pub use error::RuntimeError;
pub use metrics::{PassMetrics, PassRecord};
pub use runner::{run_and_compare, CaseResult, ComparisonFailure, ComparisonReport, FailureReason};
pub use session::{
    export, export_session, ArtifactPaths, Captured, ExportSession, Exported, Lowerable, Lowered, Partitioned,
    Quantized, SessionState,
};
