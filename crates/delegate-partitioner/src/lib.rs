// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # delegate-partitioner
//!
//! Replaces maximal groups of backend-supported nodes by single
//! `call_delegate` nodes carrying an opaque compiled payload.
//!
//! # Algorithm
//!
//! 1. Every native node is offered to every backend; a node claimed by
//!    more than one backend is a [`PartitionError::PartitionConflict`].
//! 2. Claimed nodes connected by an edge and owned by the same backend
//!    are merged with union-find, as long as the merged group stays
//!    convex with every other group contracted (no path leaves the group
//!    and re-enters it, directly or through another group).
//! 3. Each group becomes one delegate node whose inputs and outputs are
//!    the group's boundary edges in original order.
//!
//! # Backends
//!
//! Backends implement [`DelegateBackend`]:
//!
//! ```ignore
//! struct AbsOnly;
//! impl PayloadOwner for AbsOnly { fn owner_id(&self) -> &str { "abs-only" } }
//! impl DelegateBackend for AbsOnly {
//!     fn supports(&self, node: &Node) -> bool { node.op_id().kind == OpKind::Abs }
//!     fn compile(&self, subgraph: &Graph) -> Result<DelegatePayload, PartitionError> { /* ... */ }
//!     fn execute(&self, payload: &DelegatePayload, inputs: &[Tensor])
//!         -> Result<Vec<Tensor>, PartitionError> { /* ... */ }
//! }
//! ```
//!
//! # Example
//! ```
//! use delegate_partitioner::{partition, DelegateBackend, ReferenceDelegate};
//! use graph_ir::{GraphBuilder, TensorType};
//! use tensor_core::{DType, Shape};
//!
//! let mut b = GraphBuilder::new("abs_sqrt");
//! let x = b.input(TensorType::new(DType::F32, Shape::vector(4)));
//! let a = b.abs(&x).unwrap();
//! let s = b.sqrt(&a).unwrap();
//! let graph = b.finish(&[s]).unwrap();
//!
//! let backend = ReferenceDelegate::portable();
//! let partitioned = partition(graph, &[&backend as &dyn DelegateBackend]).unwrap();
//! assert_eq!(partitioned.count_delegates(), 1);
//! assert_eq!(partitioned.nodes().len(), 1);
//! ```

mod backend;
mod error;
mod partition;
mod reference;

pub use backend::{BackendRegistry, DelegateBackend};
pub use error::PartitionError;
pub use partition::{partition, verify_full_capture};
pub use reference::ReferenceDelegate;
