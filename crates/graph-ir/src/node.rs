// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Nodes, edges and their type information.

use crate::{DelegatePayload, GraphError, OpId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use tensor_core::ops::QuantParams;
use tensor_core::{DType, Shape, Tensor};

/// Stable node identity. Ids are never reused within a graph lineage, so a
/// node keeps its id across passes that do not replace it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An input edge: where a node reads one of its operands from.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ValueRef {
    /// Graph-level input by position.
    Input(usize),
    /// Named entry in the constant table.
    Const(String),
    /// Output `output` of node `node`.
    Node { node: NodeId, output: usize },
}

impl ValueRef {
    pub fn node(node: NodeId, output: usize) -> Self {
        Self::Node { node, output }
    }

    /// The producing node, if this edge comes from one.
    pub fn producer(&self) -> Option<NodeId> {
        match self {
            Self::Node { node, .. } => Some(*node),
            _ => None,
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(i) => write!(f, "input[{i}]"),
            Self::Const(name) => write!(f, "const[{name}]"),
            Self::Node { node, output: 0 } => write!(f, "{node}"),
            Self::Node { node, output } => write!(f, "{node}.{output}"),
        }
    }
}

/// Affine per-tensor quantization parameters attached to an edge.
///
/// `zero_point` does not have to lie in `[quant_min, quant_max]`; only the
/// storage dtype must be able to hold every value of that range.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantSpec {
    pub scale: f64,
    pub zero_point: i64,
    pub quant_min: i64,
    pub quant_max: i64,
    pub dtype: DType,
}

impl QuantSpec {
    /// Symmetric int8 spec over `[-127, 127]`.
    pub fn int8(scale: f64) -> Self {
        Self {
            scale,
            zero_point: 0,
            quant_min: -127,
            quant_max: 127,
            dtype: DType::I8,
        }
    }

    /// The kernel parameters for this spec.
    pub fn params(&self) -> QuantParams {
        QuantParams {
            scale: self.scale,
            zero_point: self.zero_point,
            qmin: self.quant_min,
            qmax: self.quant_max,
            dtype: self.dtype,
        }
    }

    /// Checks scale, range and storage dtype.
    pub fn validate(&self) -> Result<(), tensor_core::TensorError> {
        self.params().validate("quant_spec")
    }
}

// Specs are compared bitwise so they can key caches.
impl Eq for QuantSpec {}

impl Hash for QuantSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scale.to_bits().hash(state);
        self.zero_point.hash(state);
        self.quant_min.hash(state);
        self.quant_max.hash(state);
        self.dtype.hash(state);
    }
}

impl fmt::Display for QuantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(scale={}, zp={}, [{}, {}])",
            self.dtype, self.scale, self.zero_point, self.quant_min, self.quant_max
        )
    }
}

/// Element type, shape and optional quantization metadata of an edge.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Shape,
    pub quant: Option<QuantSpec>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self {
            dtype,
            shape,
            quant: None,
        }
    }

    pub fn of(tensor: &Tensor) -> Self {
        Self::new(tensor.dtype(), tensor.shape().clone())
    }

    /// Whether `tensor` has this dtype and shape.
    pub fn matches(&self, tensor: &Tensor) -> bool {
        self.dtype == tensor.dtype() && &self.shape == tensor.shape()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)?;
        if let Some(q) = &self.quant {
            write!(f, " q={}", q.scale)?;
        }
        Ok(())
    }
}

/// A scalar operator parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AttrValue {
    Float(f64),
    Int(i64),
    DType(DType),
    Quant(QuantSpec),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::DType(d) => write!(f, "{d}"),
            Self::Quant(q) => write!(f, "{q}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Named attributes of a node, ordered by name.
pub type Attrs = BTreeMap<String, AttrValue>;

/// An invocation of a compiled delegate subgraph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DelegateCall {
    /// Id of the backend that compiled the payload.
    pub backend: String,
    pub payload: DelegatePayload,
    /// Ids of the native nodes this call replaced, in original order.
    pub captured: Vec<NodeId>,
    /// The original output edges, parallel to the delegate node's outputs.
    pub replaced_outputs: Vec<ValueRef>,
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// A native operator.
    Op { op: OpId, attrs: Attrs },
    /// An opaque delegate call, identified as `higher_order::call_delegate`.
    Delegate(DelegateCall),
}

/// A single node of a [`Graph`](crate::Graph).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Ordered input edges.
    pub inputs: Vec<ValueRef>,
    /// Types of the node's outputs, addressed by position.
    pub outputs: Vec<TensorType>,
}

impl Node {
    /// The operator identifier; delegate nodes report the reserved
    /// call-delegate identifier.
    pub fn op_id(&self) -> OpId {
        match &self.kind {
            NodeKind::Op { op, .. } => *op,
            NodeKind::Delegate(_) => OpId::CALL_DELEGATE,
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self.kind, NodeKind::Delegate(_))
    }

    /// Attributes of a native node; empty for delegates.
    pub fn attrs(&self) -> Option<&Attrs> {
        match &self.kind {
            NodeKind::Op { attrs, .. } => Some(attrs),
            NodeKind::Delegate(_) => None,
        }
    }

    /// Reference to this node's `index`-th output.
    pub fn output_ref(&self, index: usize) -> ValueRef {
        ValueRef::node(self.id, index)
    }

    pub(crate) fn invalid(&self, detail: impl Into<String>) -> GraphError {
        GraphError::InvalidNode {
            node: self.name.clone(),
            detail: detail.into(),
        }
    }
}

/// Reads an `f64` attribute, accepting integers.
pub(crate) fn attr_f64(attrs: &Attrs, key: &str) -> Option<f64> {
    match attrs.get(key)? {
        AttrValue::Float(v) => Some(*v),
        AttrValue::Int(v) => Some(*v as f64),
        _ => None,
    }
}

pub(crate) fn attr_quant(attrs: &Attrs, key: &str) -> Option<QuantSpec> {
    match attrs.get(key)? {
        AttrValue::Quant(q) => Some(*q),
        _ => None,
    }
}

pub(crate) fn attr_dtype(attrs: &Attrs, key: &str) -> Option<DType> {
    match attrs.get(key)? {
        AttrValue::DType(d) => Some(*d),
        AttrValue::Str(s) => DType::parse(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_quant_spec_hash_eq() {
        let mut set = HashSet::new();
        set.insert(QuantSpec::int8(0.5));
        set.insert(QuantSpec::int8(0.5));
        set.insert(QuantSpec::int8(0.25));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_quant_spec_validate() {
        assert!(QuantSpec::int8(0.12345).validate().is_ok());
        let wide = QuantSpec {
            quant_min: -1000,
            ..QuantSpec::int8(1.0)
        };
        assert!(wide.validate().is_err());
    }

    #[test]
    fn test_value_ref_display() {
        assert_eq!(ValueRef::Input(1).to_string(), "input[1]");
        assert_eq!(ValueRef::node(NodeId(4), 0).to_string(), "%4");
        assert_eq!(ValueRef::node(NodeId(4), 2).to_string(), "%4.2");
        assert_eq!(ValueRef::Const("w".into()).to_string(), "const[w]");
    }

    #[test]
    fn test_attr_readers() {
        let mut attrs = Attrs::new();
        attrs.insert("min".into(), AttrValue::Int(0));
        attrs.insert("dtype".into(), AttrValue::Str("int8".into()));
        assert_eq!(attr_f64(&attrs, "min"), Some(0.0));
        assert_eq!(attr_dtype(&attrs, "dtype"), Some(DType::I8));
        assert_eq!(attr_quant(&attrs, "min"), None);
    }
}
