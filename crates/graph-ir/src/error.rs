// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction, loading and interpretation.

/// Errors that can occur when building, loading or evaluating a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The model manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// The SafeTensors constant file could not be loaded.
    #[error("failed to load SafeTensors: {0}")]
    SafeTensorsError(String),

    /// A textual operator identifier is not in the registry.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    /// A node's inputs or attributes are inconsistent with its operator.
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// An input edge does not resolve to an earlier node, a graph input or
    /// a named constant.
    #[error("node '{node}' references unresolved value {reference}")]
    UnresolvedReference { node: String, reference: String },

    /// The graph is malformed (cycle, duplicate id, bad outputs).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Runtime inputs do not match the graph signature.
    #[error("input {index} mismatch: expected {expected}, got {actual}")]
    InputMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    /// A kernel failed while interpreting a node.
    #[error("execution error in node '{node}': {source}")]
    ExecutionError {
        node: String,
        #[source]
        source: tensor_core::TensorError,
    },

    /// A delegate call could not be executed.
    #[error("delegate '{backend}' failed: {detail}")]
    DelegateError { backend: String, detail: String },
}
