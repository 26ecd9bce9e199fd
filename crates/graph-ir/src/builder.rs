// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Incremental graph construction with eager type inference.

use crate::{AttrValue, Attrs, Graph, GraphError, OpId, OpKind, QuantSpec, TensorType, ValueRef};
use tensor_core::{DType, Tensor};

/// A typed handle to a value inside a [`GraphBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    reference: ValueRef,
    ty: TensorType,
}

impl Value {
    pub fn reference(&self) -> &ValueRef {
        &self.reference
    }

    pub fn ty(&self) -> &TensorType {
        &self.ty
    }
}

/// Builds a [`Graph`] one operation at a time.
///
/// Every call infers and checks output types immediately, so a malformed
/// model fails at the offending operation rather than at validation.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    counter: usize,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(name, Vec::new()),
            counter: 0,
        }
    }

    /// Declares the next graph input.
    pub fn input(&mut self, ty: TensorType) -> Value {
        let index = self.graph.add_input(ty.clone());
        Value {
            reference: ValueRef::Input(index),
            ty,
        }
    }

    /// Registers a named constant.
    pub fn constant(&mut self, name: &str, tensor: Tensor) -> Result<Value, GraphError> {
        let ty = TensorType::of(&tensor);
        self.graph.add_constant(name, tensor)?;
        Ok(Value {
            reference: ValueRef::Const(name.to_string()),
            ty,
        })
    }

    /// Appends an operator node with an explicit name.
    pub fn op_named(
        &mut self,
        name: impl Into<String>,
        op: OpId,
        inputs: &[&Value],
        attrs: Attrs,
    ) -> Result<Value, GraphError> {
        let refs = inputs.iter().map(|v| v.reference.clone()).collect();
        let id = self.graph.add_op(name, op, attrs, refs)?;
        self.counter += 1;
        let reference = ValueRef::node(id, 0);
        let ty = self
            .graph
            .value_type(&reference)
            .ok_or_else(|| GraphError::InvalidGraph("node vanished during build".into()))?;
        Ok(Value { reference, ty })
    }

    /// Appends an operator node named after the op.
    pub fn op(&mut self, op: OpId, inputs: &[&Value], attrs: Attrs) -> Result<Value, GraphError> {
        let name = format!("{}_{}", op.kind.name(), self.counter);
        self.op_named(name, op, inputs, attrs)
    }

    fn native(&mut self, kind: OpKind, inputs: &[&Value]) -> Result<Value, GraphError> {
        self.op(kind.native_id(), inputs, Attrs::new())
    }

    pub fn abs(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Abs, &[x])
    }

    pub fn neg(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Neg, &[x])
    }

    pub fn sqrt(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Sqrt, &[x])
    }

    pub fn log1p(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Log1p, &[x])
    }

    pub fn exp(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Exp, &[x])
    }

    pub fn relu(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Relu, &[x])
    }

    pub fn tanh(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Tanh, &[x])
    }

    pub fn gelu(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Gelu, &[x])
    }

    /// `clamp(x, min, max)`; a `None` bound is unbounded.
    pub fn clamp(&mut self, x: &Value, min: Option<f64>, max: Option<f64>) -> Result<Value, GraphError> {
        let mut attrs = Attrs::new();
        if let Some(lo) = min {
            attrs.insert("min".into(), AttrValue::Float(lo));
        }
        if let Some(hi) = max {
            attrs.insert("max".into(), AttrValue::Float(hi));
        }
        self.op(OpKind::Clamp.native_id(), &[x], attrs)
    }

    pub fn add(&mut self, a: &Value, b: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Add, &[a, b])
    }

    pub fn sub(&mut self, a: &Value, b: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Sub, &[a, b])
    }

    pub fn mul(&mut self, a: &Value, b: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Mul, &[a, b])
    }

    pub fn div(&mut self, a: &Value, b: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Div, &[a, b])
    }

    pub fn matmul(&mut self, a: &Value, b: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::MatMul, &[a, b])
    }

    /// Softmax over the last axis.
    pub fn softmax(&mut self, x: &Value) -> Result<Value, GraphError> {
        self.native(OpKind::Softmax, &[x])
    }

    pub fn quantize_per_tensor(&mut self, x: &Value, spec: QuantSpec) -> Result<Value, GraphError> {
        let mut attrs = Attrs::new();
        attrs.insert("qparams".into(), AttrValue::Quant(spec));
        self.op(OpKind::QuantizePerTensor.native_id(), &[x], attrs)
    }

    pub fn dequantize_per_tensor(
        &mut self,
        x: &Value,
        spec: QuantSpec,
        out_dtype: DType,
    ) -> Result<Value, GraphError> {
        let mut attrs = Attrs::new();
        attrs.insert("qparams".into(), AttrValue::Quant(spec));
        attrs.insert("out_dtype".into(), AttrValue::DType(out_dtype));
        self.op(OpKind::DequantizePerTensor.native_id(), &[x], attrs)
    }

    /// Sets the graph outputs and validates the result.
    pub fn finish(mut self, outputs: &[Value]) -> Result<Graph, GraphError> {
        self.graph
            .set_outputs(outputs.iter().map(|v| v.reference.clone()).collect());
        self.graph.validate()?;
        Ok(self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    #[test]
    fn test_build_chain() {
        let mut b = GraphBuilder::new("g");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let a = b.abs(&x).unwrap();
        let s = b.sqrt(&a).unwrap();
        let g = b.finish(&[s]).unwrap();
        assert_eq!(g.nodes().len(), 2);
        assert_eq!(g.nodes()[0].name, "abs_0");
        assert_eq!(g.nodes()[1].name, "sqrt_1");
    }

    #[test]
    fn test_type_error_surfaces_at_op() {
        let mut b = GraphBuilder::new("g");
        let x = b.input(TensorType::new(DType::F32, Shape::matrix(2, 3)));
        let y = b.input(TensorType::new(DType::F32, Shape::matrix(4, 5)));
        assert!(b.matmul(&x, &y).is_err());
    }

    #[test]
    fn test_inputs_after_ops_keep_nodes() {
        let mut b = GraphBuilder::new("g");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let n = b.neg(&x).unwrap();
        let y = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let s = b.add(&n, &y).unwrap();
        let g = b.finish(&[s]).unwrap();
        assert_eq!(g.inputs().len(), 2);
        assert_eq!(g.nodes().len(), 2);
    }

    #[test]
    fn test_quantize_roundtrip_types() {
        let mut b = GraphBuilder::new("g");
        let x = b.input(TensorType::new(DType::F32, Shape::new(vec![1, 1, 4, 4])));
        let q = b.quantize_per_tensor(&x, QuantSpec::int8(0.12345)).unwrap();
        assert_eq!(q.ty().dtype, DType::I8);
        let dq = b
            .dequantize_per_tensor(&q, QuantSpec::int8(0.12345), DType::F32)
            .unwrap();
        assert_eq!(dq.ty().dtype, DType::F32);
    }
}
