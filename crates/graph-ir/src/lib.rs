// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The graph intermediate representation shared by every pipeline stage.
//!
//! - [`OpId`] / [`OpKind`] / [`OpRegistry`]: closed set of namespaced
//!   operator identifiers plus registry metadata (arity, category, fused
//!   counterpart).
//! - [`Graph`]: an ordered, acyclic list of [`Node`]s whose input edges
//!   point at earlier node outputs, graph inputs or named constants.
//! - [`GraphBuilder`] and the [`Module`] trait: how models describe
//!   themselves; [`capture`] freezes a module into a [`Graph`] and computes
//!   reference outputs on the unmodified graph.
//! - [`interpret`]: reference execution used for golden outputs and by the
//!   program runner.
//! - [`ModelLoader`]: loads `model.json` + `model.safetensors` model
//!   directories.
//!
//! # Example
//! ```
//! use graph_ir::{capture, GraphBuilder, GraphError, Module, Value};
//! use tensor_core::{Shape, Tensor};
//!
//! struct AbsSqrt;
//!
//! impl Module for AbsSqrt {
//!     fn name(&self) -> &str { "abs_sqrt" }
//!     fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
//!         let a = b.abs(&x[0])?;
//!         Ok(vec![b.sqrt(&a)?])
//!     }
//! }
//!
//! let x = Tensor::from_f32(Shape::vector(3), &[-4.0, 9.0, 0.0]).unwrap();
//! let (graph, outputs) = capture(&AbsSqrt, &[x]).unwrap();
//! assert_eq!(graph.nodes().len(), 2);
//! assert_eq!(outputs[0].to_f32_vec(), vec![2.0, 3.0, 0.0]);
//! ```

mod builder;
mod capture;
mod error;
pub mod graph;
mod infer;
pub mod interpret;
mod loader;
mod manifest;
mod node;
mod op;
mod payload;

pub use builder::{GraphBuilder, Value};
pub use capture::{capture, Module};
pub use error::GraphError;
pub use graph::Graph;
pub use infer::infer_outputs;
pub use interpret::{evaluate, execute_op, DelegateExecutor, NoDelegates};
pub use loader::{LoadedModel, ModelLoader};
pub use manifest::{ManifestAttr, ManifestNode, ManifestTensor, ModelManifest};
pub use node::{AttrValue, Attrs, DelegateCall, Node, NodeId, NodeKind, QuantSpec, TensorType, ValueRef};
pub use op::{Namespace, OpCategory, OpId, OpInfo, OpKind, OpRegistry};
pub use payload::{DelegatePayload, PayloadOwner};
