// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-passes
//!
//! Graph-to-graph transformations that run between capture and
//! partitioning. Every pass takes ownership of a [`graph_ir::Graph`] and
//! returns a fresh, validated one.
//!
//! | Pass | Entry point | Effect |
//! |---|---|---|
//! | Quantizer | [`annotate`] | wraps selected ops in quantize/dequantize pairs |
//! | Fusion | [`fuse`] | collapses dequantize → op → quantize into fused kernels |
//! | Lowering | [`lower`] | rewrites op identifiers into a [`TargetDialect`] |
//!
//! # Dialects
//!
//! Dialects implement [`TargetDialect`], so targets can be added without
//! touching the lowering pass:
//!
//! ```ignore
//! struct OnlyAbs;
//! impl TargetDialect for OnlyAbs {
//!     fn name(&self) -> &str { "only-abs" }
//!     fn legalize(&self, op: OpId, attrs: &Attrs) -> Option<(OpId, Attrs)> {
//!         (op.kind == OpKind::Abs).then(|| (op.to_edge(), attrs.clone()))
//!     }
//! }
//! ```

mod dialect;
mod error;
mod fuse;
mod lower;
mod quantize;

pub use dialect::{EdgeDialect, TargetDialect};
pub use error::{PassError, PassResultExt};
pub use fuse::fuse;
pub use lower::lower;
pub use quantize::{annotate, QuantRule, QuantizationPolicy, QuantizeReport};
