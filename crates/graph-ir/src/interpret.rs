// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference interpretation of graphs and single operators.
//!
//! [`execute_op`] is the single kernel dispatch point: graph evaluation,
//! delegate backends and the program runner all go through it, so every
//! execution path computes bit-identical results for the same op.

use crate::node::{attr_dtype, attr_f64, attr_quant};
use crate::{Attrs, DelegateCall, Graph, GraphError, NodeId, NodeKind, OpCategory, OpId, OpKind, TensorType, ValueRef};
use std::collections::HashMap;
use tensor_core::ops::{self, BinaryOp, UnaryOp};
use tensor_core::{DType, Tensor, TensorError};

/// Executes delegate calls on behalf of an interpreter.
pub trait DelegateExecutor {
    fn execute_delegate(&self, call: &DelegateCall, inputs: &[Tensor]) -> Result<Vec<Tensor>, GraphError>;
}

/// An executor that knows no backends; any delegate call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelegates;

impl DelegateExecutor for NoDelegates {
    fn execute_delegate(&self, call: &DelegateCall, _inputs: &[Tensor]) -> Result<Vec<Tensor>, GraphError> {
        Err(GraphError::DelegateError {
            backend: call.backend.clone(),
            detail: "no delegate backends registered".into(),
        })
    }
}

/// Runs one native operator, allocating outputs from `output_types`.
pub fn execute_op(
    node: &str,
    op: OpId,
    attrs: &Attrs,
    inputs: &[&Tensor],
    output_types: &[TensorType],
) -> Result<Vec<Tensor>, GraphError> {
    let invalid = |detail: String| GraphError::InvalidNode {
        node: node.to_string(),
        detail,
    };
    if let Some(arity) = op.kind.info().arity {
        if inputs.len() != arity {
            return Err(invalid(format!("expected {arity} inputs, got {}", inputs.len())));
        }
    }
    let out_ty = match output_types {
        [single] => single,
        _ => return Err(invalid(format!("expected one output type, got {}", output_types.len()))),
    };
    let mut out = Tensor::zeros(out_ty.shape.clone(), out_ty.dtype);
    let kernel = |source: TensorError| GraphError::ExecutionError {
        node: node.to_string(),
        source,
    };

    match op.kind.info().category {
        OpCategory::Control => return Err(invalid("delegate calls are not kernels".into())),
        OpCategory::Quantization => {
            let spec = attr_quant(attrs, "qparams")
                .ok_or_else(|| invalid("missing 'qparams' attribute".into()))?;
            let result = if op.kind == OpKind::QuantizePerTensor {
                ops::quantize_per_tensor(&inputs[0].view(), &spec.params(), &mut out)
            } else {
                ops::dequantize_per_tensor(&inputs[0].view(), &spec.params(), &mut out)
            };
            result.map_err(kernel)?;
        }
        OpCategory::Fused => run_fused(op.kind, attrs, inputs, &mut out, &invalid)?,
        _ => run_float(op.kind, attrs, inputs, &mut out).map_err(kernel)?,
    }
    Ok(vec![out])
}

/// Computes a float operator into `out`.
fn run_float(kind: OpKind, attrs: &Attrs, inputs: &[&Tensor], out: &mut Tensor) -> Result<(), TensorError> {
    if let Some(op) = unary_op(kind) {
        return ops::unary(op, &inputs[0].view(), out);
    }
    match kind {
        OpKind::Clamp => {
            let lo = attr_f64(attrs, "min").map_or(f32::NEG_INFINITY, |v| v as f32);
            let hi = attr_f64(attrs, "max").map_or(f32::INFINITY, |v| v as f32);
            ops::clamp(&inputs[0].view(), lo, hi, out)
        }
        OpKind::Add => ops::binary(BinaryOp::Add, &inputs[0].view(), &inputs[1].view(), out),
        OpKind::Sub => ops::binary(BinaryOp::Sub, &inputs[0].view(), &inputs[1].view(), out),
        OpKind::Mul => ops::binary(BinaryOp::Mul, &inputs[0].view(), &inputs[1].view(), out),
        OpKind::Div => ops::binary(BinaryOp::Div, &inputs[0].view(), &inputs[1].view(), out),
        OpKind::MatMul => ops::matmul(&inputs[0].view(), &inputs[1].view(), out),
        OpKind::Softmax => ops::softmax(&inputs[0].view(), out),
        other => Err(TensorError::InvalidParameter {
            op: "interpret",
            detail: format!("{other} is not a float operator"),
        }),
    }
}

fn unary_op(kind: OpKind) -> Option<UnaryOp> {
    Some(match kind {
        OpKind::Abs => UnaryOp::Abs,
        OpKind::Neg => UnaryOp::Neg,
        OpKind::Sqrt => UnaryOp::Sqrt,
        OpKind::Log1p => UnaryOp::Log1p,
        OpKind::Exp => UnaryOp::Exp,
        OpKind::Relu => UnaryOp::Relu,
        OpKind::Tanh => UnaryOp::Tanh,
        OpKind::Gelu => UnaryOp::Gelu,
        _ => return None,
    })
}

/// Fused kernels replay the dequantize, compute, quantize chain exactly,
/// including the intermediate float storage type.
fn run_fused(
    kind: OpKind,
    attrs: &Attrs,
    inputs: &[&Tensor],
    out: &mut Tensor,
    invalid: &dyn Fn(String) -> GraphError,
) -> Result<(), GraphError> {
    let unfused = kind
        .unfused()
        .ok_or_else(|| invalid(format!("{kind} has no unfused counterpart")))?;
    let float_dtype = attr_dtype(attrs, "float_dtype").unwrap_or(DType::F32);
    let kernel = |source: TensorError| invalid(format!("fused kernel failed: {source}"));

    let mut dequantized = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let spec = attr_quant(attrs, &format!("in{i}"))
            .ok_or_else(|| invalid(format!("missing 'in{i}' attribute")))?;
        let mut t = Tensor::zeros(input.shape().clone(), float_dtype);
        ops::dequantize_per_tensor(&input.view(), &spec.params(), &mut t).map_err(kernel)?;
        dequantized.push(t);
    }

    let out_spec = attr_quant(attrs, "out").ok_or_else(|| invalid("missing 'out' attribute".into()))?;
    let mut computed = Tensor::zeros(out.shape().clone(), float_dtype);
    let refs: Vec<&Tensor> = dequantized.iter().collect();
    run_float(unfused, attrs, &refs, &mut computed).map_err(kernel)?;
    ops::quantize_per_tensor(&computed.view(), &out_spec.params(), out).map_err(kernel)
}

/// Evaluates `graph` on `inputs`, routing delegate nodes to `delegates`.
pub fn evaluate(
    graph: &Graph,
    inputs: &[Tensor],
    delegates: &dyn DelegateExecutor,
) -> Result<Vec<Tensor>, GraphError> {
    check_inputs(graph.inputs(), inputs)?;

    let mut values: HashMap<(NodeId, usize), Tensor> = HashMap::new();
    for node in graph.nodes() {
        let args = node
            .inputs
            .iter()
            .map(|r| {
                fetch(graph, inputs, &values, r).ok_or_else(|| GraphError::UnresolvedReference {
                    node: node.name.clone(),
                    reference: r.to_string(),
                })
            })
            .collect::<Result<Vec<&Tensor>, _>>()?;

        let results = match &node.kind {
            NodeKind::Op { op, attrs } => execute_op(&node.name, *op, attrs, &args, &node.outputs)?,
            NodeKind::Delegate(call) => {
                let owned: Vec<Tensor> = args.into_iter().cloned().collect();
                let results = delegates.execute_delegate(call, &owned)?;
                check_delegate_outputs(&call.backend, &node.outputs, &results)?;
                results
            }
        };
        tracing::trace!(node = %node.name, outputs = results.len(), "evaluated");

        for (i, t) in results.into_iter().enumerate() {
            values.insert((node.id, i), t);
        }
    }

    graph
        .outputs()
        .iter()
        .map(|r| {
            fetch(graph, inputs, &values, r)
                .cloned()
                .ok_or_else(|| GraphError::UnresolvedReference {
                    node: "output".into(),
                    reference: r.to_string(),
                })
        })
        .collect()
}

/// Checks runtime inputs against a signature.
pub fn check_inputs(expected: &[TensorType], inputs: &[Tensor]) -> Result<(), GraphError> {
    if expected.len() != inputs.len() {
        return Err(GraphError::InputMismatch {
            index: expected.len().min(inputs.len()),
            expected: format!("{} inputs", expected.len()),
            actual: format!("{} inputs", inputs.len()),
        });
    }
    for (index, (ty, t)) in expected.iter().zip(inputs).enumerate() {
        if !ty.matches(t) {
            return Err(GraphError::InputMismatch {
                index,
                expected: format!("{}{}", ty.dtype, ty.shape),
                actual: format!("{}{}", t.dtype(), t.shape()),
            });
        }
    }
    Ok(())
}

fn check_delegate_outputs(backend: &str, expected: &[TensorType], results: &[Tensor]) -> Result<(), GraphError> {
    let ok = expected.len() == results.len() && expected.iter().zip(results).all(|(ty, t)| ty.matches(t));
    if ok {
        Ok(())
    } else {
        Err(GraphError::DelegateError {
            backend: backend.to_string(),
            detail: "delegate outputs do not match the node signature".into(),
        })
    }
}

fn fetch<'a>(
    graph: &'a Graph,
    inputs: &'a [Tensor],
    values: &'a HashMap<(NodeId, usize), Tensor>,
    r: &ValueRef,
) -> Option<&'a Tensor> {
    match r {
        ValueRef::Input(i) => inputs.get(*i),
        ValueRef::Const(name) => graph.constants().get(name),
        ValueRef::Node { node, output } => values.get(&(*node, *output)),
    }
}
