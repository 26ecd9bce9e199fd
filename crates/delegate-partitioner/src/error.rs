// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the partitioner and delegate backends.

use graph_ir::GraphError;

/// Errors that can occur during partitioning or delegate execution.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// More than one backend claims the same node.
    #[error("partition conflict at node '{node}': claimed by {}", .backends.join(", "))]
    PartitionConflict { node: String, backends: Vec<String> },

    /// A backend failed to compile or run a subgraph.
    #[error("backend '{backend}' failed: {detail}")]
    Backend { backend: String, detail: String },

    /// A node that a backend fully supports survived partitioning.
    #[error("node '{node}' ({op}) is supported by '{backend}' but was not captured")]
    Uncaptured {
        node: String,
        op: String,
        backend: String,
    },

    /// Graph construction or validation failed.
    #[error("graph error in pass 'partition': {0}")]
    Graph(#[from] GraphError),
}
