// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph passes.

use graph_ir::GraphError;

/// Errors that can occur while running a pass.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// An operator has no mapping in the target and nothing else covers it.
    #[error("unsupported operator {op} at node '{node}' in pass '{pass}'")]
    UnsupportedOperator {
        pass: &'static str,
        node: String,
        op: String,
    },

    /// A quantization rule cannot be applied as written.
    #[error("invalid quantization rule for {op}: {detail}")]
    InvalidRule { op: String, detail: String },

    /// The graph became (or already was) structurally invalid.
    #[error("graph error in pass '{pass}': {source}")]
    Graph {
        pass: &'static str,
        #[source]
        source: GraphError,
    },
}

/// Attaches the pass name to graph-level errors.
pub trait PassResultExt<T> {
    fn in_pass(self, pass: &'static str) -> Result<T, PassError>;
}

impl<T> PassResultExt<T> for Result<T, GraphError> {
    fn in_pass(self, pass: &'static str) -> Result<T, PassError> {
        self.map_err(|source| PassError::Graph { pass, source })
    }
}
