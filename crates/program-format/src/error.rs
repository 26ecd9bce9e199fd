// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for program building, bundling and the container format.

use graph_ir::GraphError;

/// Errors that can occur while building, bundling, persisting or
/// executing a program.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// An edge points at nothing the method can provide.
    #[error("dangling reference {reference} at node '{node}' in method '{method}'")]
    DanglingReference {
        method: String,
        node: String,
        reference: String,
    },

    /// Two methods register different tensors under one constant name.
    #[error("constant '{0}' is defined twice with different contents")]
    ConstantConflict(String),

    #[error("method '{0}' is defined twice")]
    DuplicateMethod(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// A test case does not fit its method's signature.
    #[error("test case does not match method '{method}': {detail}")]
    SchemaMismatch { method: String, detail: String },

    /// The file is not a container or is damaged.
    #[error("malformed container: {0}")]
    Malformed(String),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}
