// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`DelegateBackend`] trait and the runtime-side registry.

use crate::PartitionError;
use graph_ir::{DelegateCall, DelegateExecutor, DelegatePayload, Graph, GraphError, Node, PayloadOwner};
use tensor_core::Tensor;

/// A delegate backend.
///
/// The backend id is its [`PayloadOwner::owner_id`]; payloads produced by
/// [`compile`](DelegateBackend::compile) are sealed to that id and only
/// opened again by the same backend.
pub trait DelegateBackend: PayloadOwner + Send + Sync {
    /// Whether the backend can run `node`. Only native nodes are offered.
    fn supports(&self, node: &Node) -> bool;

    /// Compiles a self-contained subgraph whose inputs are the boundary
    /// edges of the captured group.
    fn compile(&self, subgraph: &Graph) -> Result<DelegatePayload, PartitionError>;

    /// Runs a payload previously produced by this backend.
    fn execute(&self, payload: &DelegatePayload, inputs: &[Tensor]) -> Result<Vec<Tensor>, PartitionError>;
}

/// Backends available at run time, looked up by id.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn DelegateBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend. A backend with the same id replaces the old one.
    pub fn register(&mut self, backend: Box<dyn DelegateBackend>) {
        self.backends.retain(|b| b.owner_id() != backend.owner_id());
        self.backends.push(backend);
    }

    pub fn with(mut self, backend: impl DelegateBackend + 'static) -> Self {
        self.register(Box::new(backend));
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn DelegateBackend> {
        self.backends.iter().find(|b| b.owner_id() == id).map(|b| b.as_ref())
    }

    /// Borrowed views for [`partition`](crate::partition).
    pub fn backends(&self) -> Vec<&dyn DelegateBackend> {
        self.backends.iter().map(|b| b.as_ref()).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.owner_id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry").field("backends", &self.ids()).finish()
    }
}

impl DelegateExecutor for BackendRegistry {
    fn execute_delegate(&self, call: &DelegateCall, inputs: &[Tensor]) -> Result<Vec<Tensor>, GraphError> {
        let delegate_error = |detail: String| GraphError::DelegateError {
            backend: call.backend.clone(),
            detail,
        };
        let backend = self
            .get(&call.backend)
            .ok_or_else(|| delegate_error("backend is not registered".into()))?;
        if call.payload.owner() != backend.owner_id() {
            return Err(delegate_error(format!(
                "payload is owned by '{}'",
                call.payload.owner()
            )));
        }
        backend
            .execute(&call.payload, inputs)
            .map_err(|e| delegate_error(e.to_string()))
    }
}
