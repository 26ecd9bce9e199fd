// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the export runtime.

/// Errors that can occur while exporting or running a model.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Capture, validation or interpretation failed.
    #[error("graph error: {0}")]
    GraphError(#[from] graph_ir::GraphError),

    /// A graph pass failed.
    #[error("pass error: {0}")]
    PassError(#[from] graph_passes::PassError),

    /// Partitioning or a delegate backend failed.
    #[error("partition error: {0}")]
    PartitionError(#[from] delegate_partitioner::PartitionError),

    /// Program building, bundling or container I/O failed.
    #[error("program error: {0}")]
    ProgramError(#[from] program_format::ProgramError),

    /// Filesystem error while writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
