// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Output type inference for native operators.
//!
//! Attribute conventions:
//!
//! | Op | Attributes |
//! |---|---|
//! | `clamp` | `min`, `max` (optional floats; missing means unbounded) |
//! | `quantize_per_tensor` | `qparams` |
//! | `dequantize_per_tensor` | `qparams`, `out_dtype` (optional, default `f32`) |
//! | fused ops | `in0`, `in1` (binary only), `out`, `float_dtype` |

use crate::node::{attr_dtype, attr_f64, attr_quant};
use crate::{Attrs, GraphError, OpCategory, OpId, OpKind, QuantSpec, TensorType};
use tensor_core::{DType, Shape};

/// Infers the output types of `op` applied to `inputs`.
///
/// `node` is only used to label errors.
pub fn infer_outputs(
    node: &str,
    op: OpId,
    attrs: &Attrs,
    inputs: &[TensorType],
) -> Result<Vec<TensorType>, GraphError> {
    let invalid = |detail: String| GraphError::InvalidNode {
        node: node.to_string(),
        detail,
    };

    let info = op.kind.info();
    if let Some(arity) = info.arity {
        if inputs.len() != arity {
            return Err(invalid(format!(
                "{op} takes {arity} input(s), got {}",
                inputs.len()
            )));
        }
    }

    let out = match info.category {
        OpCategory::Control => {
            return Err(invalid("delegate calls carry their own output types".into()))
        }
        OpCategory::Quantization => infer_quantization(op.kind, attrs, &inputs[0], &invalid)?,
        OpCategory::Fused => infer_fused(op.kind, attrs, inputs, &invalid)?,
        _ => {
            for t in inputs {
                if !t.dtype.is_float() {
                    return Err(invalid(format!("{op} requires float inputs, got {}", t.dtype)));
                }
            }
            let shape = float_shape(op.kind, inputs, &invalid)?;
            if op.kind == OpKind::Clamp {
                if let (Some(lo), Some(hi)) = (attr_f64(attrs, "min"), attr_f64(attrs, "max")) {
                    if lo > hi {
                        return Err(invalid(format!("clamp min {lo} exceeds max {hi}")));
                    }
                }
            }
            TensorType::new(inputs[0].dtype, shape)
        }
    };
    Ok(vec![out])
}

/// Output shape of a float op (or of the unfused op behind a fused kernel).
fn float_shape(
    kind: OpKind,
    inputs: &[TensorType],
    invalid: &dyn Fn(String) -> GraphError,
) -> Result<Shape, GraphError> {
    match kind.info().category {
        OpCategory::Binary => {
            if inputs[0].dtype != inputs[1].dtype {
                return Err(invalid(format!(
                    "{kind} operand dtypes differ: {} vs {}",
                    inputs[0].dtype, inputs[1].dtype
                )));
            }
            inputs[0]
                .shape
                .broadcast_with(&inputs[1].shape)
                .ok_or_else(|| {
                    invalid(format!(
                        "{kind} shapes do not broadcast: {} vs {}",
                        inputs[0].shape, inputs[1].shape
                    ))
                })
        }
        OpCategory::Linear => {
            let (a, b) = (&inputs[0].shape, &inputs[1].shape);
            if a.rank() != 2 || b.rank() != 2 || a.dims()[1] != b.dims()[0] {
                return Err(invalid(format!("{kind} needs [M, K] x [K, N], got {a} x {b}")));
            }
            if inputs[0].dtype != inputs[1].dtype {
                return Err(invalid(format!("{kind} operand dtypes differ")));
            }
            Ok(Shape::matrix(a.dims()[0], b.dims()[1]))
        }
        _ => Ok(inputs[0].shape.clone()),
    }
}

fn required_quant(
    attrs: &Attrs,
    key: &str,
    invalid: &dyn Fn(String) -> GraphError,
) -> Result<QuantSpec, GraphError> {
    let spec = attr_quant(attrs, key).ok_or_else(|| invalid(format!("missing '{key}' attribute")))?;
    spec.validate()
        .map_err(|e| invalid(format!("bad '{key}' attribute: {e}")))?;
    Ok(spec)
}

fn infer_quantization(
    kind: OpKind,
    attrs: &Attrs,
    input: &TensorType,
    invalid: &dyn Fn(String) -> GraphError,
) -> Result<TensorType, GraphError> {
    let spec = required_quant(attrs, "qparams", invalid)?;
    if kind == OpKind::QuantizePerTensor {
        if !input.dtype.is_float() {
            return Err(invalid(format!("quantize input must be float, got {}", input.dtype)));
        }
        Ok(TensorType {
            dtype: spec.dtype,
            shape: input.shape.clone(),
            quant: Some(spec),
        })
    } else {
        if input.dtype != spec.dtype {
            return Err(invalid(format!(
                "dequantize input dtype {} does not match spec dtype {}",
                input.dtype, spec.dtype
            )));
        }
        let out_dtype = attr_dtype(attrs, "out_dtype").unwrap_or(DType::F32);
        if !out_dtype.is_float() {
            return Err(invalid(format!("dequantize output must be float, got {out_dtype}")));
        }
        Ok(TensorType::new(out_dtype, input.shape.clone()))
    }
}

fn infer_fused(
    kind: OpKind,
    attrs: &Attrs,
    inputs: &[TensorType],
    invalid: &dyn Fn(String) -> GraphError,
) -> Result<TensorType, GraphError> {
    let unfused = kind
        .unfused()
        .ok_or_else(|| invalid(format!("{kind} has no unfused counterpart")))?;
    let float_dtype = attr_dtype(attrs, "float_dtype").unwrap_or(DType::F32);
    if !float_dtype.is_float() {
        return Err(invalid(format!("float_dtype must be float, got {float_dtype}")));
    }

    let mut dequantized = Vec::with_capacity(inputs.len());
    for (i, t) in inputs.iter().enumerate() {
        let spec = required_quant(attrs, &format!("in{i}"), invalid)?;
        if t.dtype != spec.dtype {
            return Err(invalid(format!(
                "input {i} dtype {} does not match spec dtype {}",
                t.dtype, spec.dtype
            )));
        }
        dequantized.push(TensorType::new(float_dtype, t.shape.clone()));
    }
    let out = required_quant(attrs, "out", invalid)?;
    let shape = float_shape(unfused, &dequantized, invalid)?;
    Ok(TensorType {
        dtype: out.dtype,
        shape,
        quant: Some(out),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    fn f32t(dims: Vec<usize>) -> TensorType {
        TensorType::new(DType::F32, Shape::new(dims))
    }

    #[test]
    fn test_binary_broadcast() {
        let out = infer_outputs(
            "n",
            OpKind::Add.native_id(),
            &Attrs::new(),
            &[f32t(vec![2, 3]), f32t(vec![3])],
        )
        .unwrap();
        assert_eq!(out[0].shape, Shape::matrix(2, 3));
    }

    #[test]
    fn test_arity_checked() {
        let err = infer_outputs("n", OpKind::Sqrt.native_id(), &Attrs::new(), &[]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidNode { .. }));
    }

    #[test]
    fn test_quantize_output_type() {
        let mut attrs = Attrs::new();
        attrs.insert("qparams".into(), AttrValue::Quant(QuantSpec::int8(0.12345)));
        let out = infer_outputs(
            "q",
            OpKind::QuantizePerTensor.native_id(),
            &attrs,
            &[f32t(vec![1, 1, 4, 4])],
        )
        .unwrap();
        assert_eq!(out[0].dtype, DType::I8);
        assert_eq!(out[0].quant, Some(QuantSpec::int8(0.12345)));

        let deq = infer_outputs(
            "dq",
            OpKind::DequantizePerTensor.native_id(),
            &attrs,
            &out,
        )
        .unwrap();
        assert_eq!(deq[0], f32t(vec![1, 1, 4, 4]));
    }

    #[test]
    fn test_dequantize_rejects_float_input() {
        let mut attrs = Attrs::new();
        attrs.insert("qparams".into(), AttrValue::Quant(QuantSpec::int8(0.5)));
        assert!(infer_outputs(
            "dq",
            OpKind::DequantizePerTensor.native_id(),
            &attrs,
            &[f32t(vec![4])]
        )
        .is_err());
    }

    #[test]
    fn test_fused_matmul() {
        let spec = QuantSpec::int8(0.1);
        let mut attrs = Attrs::new();
        attrs.insert("in0".into(), AttrValue::Quant(spec));
        attrs.insert("in1".into(), AttrValue::Quant(spec));
        attrs.insert("out".into(), AttrValue::Quant(spec));
        let i8t = |r, c| TensorType {
            dtype: DType::I8,
            shape: Shape::matrix(r, c),
            quant: Some(spec),
        };
        let out = infer_outputs(
            "mm",
            OpKind::QuantizedMatMul.native_id(),
            &attrs,
            &[i8t(2, 3), i8t(3, 5)],
        )
        .unwrap();
        assert_eq!(out[0].shape, Shape::matrix(2, 5));
        assert_eq!(out[0].dtype, DType::I8);
    }

    #[test]
    fn test_matmul_rejects_bad_inner_dim() {
        assert!(infer_outputs(
            "mm",
            OpKind::MatMul.native_id(),
            &Attrs::new(),
            &[f32t(vec![2, 3]), f32t(vec![4, 5])],
        )
        .is_err());
    }
}
