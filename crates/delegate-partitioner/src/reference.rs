// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A reference delegate that serializes the captured subgraph and runs it
//! with the graph interpreter.

use crate::{DelegateBackend, PartitionError};
use graph_ir::{evaluate, DelegatePayload, Graph, NoDelegates, Node, OpCategory, OpKind, PayloadOwner};
use std::collections::BTreeSet;
use tensor_core::Tensor;

/// Reference delegate over a configurable set of operator kinds.
///
/// The payload is the `bincode` encoding of the subgraph, so results are
/// exactly those of the interpreter.
#[derive(Debug, Clone)]
pub struct ReferenceDelegate {
    id: String,
    kinds: BTreeSet<OpKind>,
}

impl ReferenceDelegate {
    /// A delegate over an explicit set of kinds.
    pub fn new(id: impl Into<String>, kinds: impl IntoIterator<Item = OpKind>) -> Self {
        Self {
            id: id.into(),
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Every native kind, id `"reference"`.
    pub fn portable() -> Self {
        Self::new("reference", OpKind::all().filter(|k| *k != OpKind::CallDelegate))
    }

    /// Quantization and fused kernels only, id `"reference-int8"`.
    pub fn quantized_only() -> Self {
        Self::new(
            "reference-int8",
            OpKind::all().filter(|k| matches!(k.info().category, OpCategory::Quantization | OpCategory::Fused)),
        )
    }

    /// Looks up a preset by id.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "reference" => Some(Self::portable()),
            "reference-int8" => Some(Self::quantized_only()),
            _ => None,
        }
    }

    pub fn kinds(&self) -> &BTreeSet<OpKind> {
        &self.kinds
    }

    fn failure(&self, detail: impl std::fmt::Display) -> PartitionError {
        PartitionError::Backend {
            backend: self.id.clone(),
            detail: detail.to_string(),
        }
    }
}

impl PayloadOwner for ReferenceDelegate {
    fn owner_id(&self) -> &str {
        &self.id
    }
}

impl DelegateBackend for ReferenceDelegate {
    fn supports(&self, node: &Node) -> bool {
        !node.is_delegate() && self.kinds.contains(&node.op_id().kind)
    }

    fn compile(&self, subgraph: &Graph) -> Result<DelegatePayload, PartitionError> {
        subgraph.validate()?;
        let bytes = bincode::serialize(subgraph).map_err(|e| self.failure(e))?;
        tracing::debug!(
            "'{}' compiled '{}' ({} nodes, {} bytes)",
            self.id,
            subgraph.name,
            subgraph.nodes().len(),
            bytes.len()
        );
        Ok(DelegatePayload::seal(self, bytes))
    }

    fn execute(&self, payload: &DelegatePayload, inputs: &[Tensor]) -> Result<Vec<Tensor>, PartitionError> {
        let bytes = payload
            .open(self)
            .ok_or_else(|| self.failure(format!("payload is owned by '{}'", payload.owner())))?;
        let subgraph: Graph = bincode::deserialize(bytes).map_err(|e| self.failure(e))?;
        evaluate(&subgraph, inputs, &NoDelegates).map_err(|e| self.failure(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphBuilder, TensorType};
    use tensor_core::{DType, Shape};

    #[test]
    fn test_presets() {
        let p = ReferenceDelegate::portable();
        assert!(p.kinds().contains(&OpKind::Sqrt));
        assert!(!p.kinds().contains(&OpKind::CallDelegate));

        let q = ReferenceDelegate::quantized_only();
        assert!(q.kinds().contains(&OpKind::QuantizePerTensor));
        assert!(q.kinds().contains(&OpKind::QuantizedAdd));
        assert!(!q.kinds().contains(&OpKind::Add));

        assert!(ReferenceDelegate::by_name("nope").is_none());
    }

    #[test]
    fn test_compile_execute() {
        let mut b = GraphBuilder::new("neg");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let n = b.neg(&x).unwrap();
        let g = b.finish(&[n]).unwrap();

        let backend = ReferenceDelegate::portable();
        let payload = backend.compile(&g).unwrap();
        assert_eq!(payload.owner(), "reference");

        let x = Tensor::from_f32(Shape::vector(2), &[1.0, -2.0]).unwrap();
        let out = backend.execute(&payload, &[x]).unwrap();
        assert_eq!(out[0].to_f32_vec(), vec![-1.0, 2.0]);
    }

    #[test]
    fn test_foreign_payload_rejected() {
        let mut b = GraphBuilder::new("abs");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(1)));
        let a = b.abs(&x).unwrap();
        let g = b.finish(&[a]).unwrap();

        let payload = ReferenceDelegate::portable().compile(&g).unwrap();
        let other = ReferenceDelegate::quantized_only();
        let x = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        assert!(matches!(other.execute(&payload, &[x]), Err(PartitionError::Backend { .. })));
    }

    #[test]
    fn test_payload_closed_to_same_named_type() {
        struct Lookalike;
        impl PayloadOwner for Lookalike {
            fn owner_id(&self) -> &str {
                "reference"
            }
        }

        let mut b = GraphBuilder::new("abs");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(1)));
        let a = b.abs(&x).unwrap();
        let g = b.finish(&[a]).unwrap();

        let backend = ReferenceDelegate::portable();
        let payload = backend.compile(&g).unwrap();
        assert!(payload.open(&Lookalike).is_none());
        assert!(payload.open(&backend).is_some());
    }
}
