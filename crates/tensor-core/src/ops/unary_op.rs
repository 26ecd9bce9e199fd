// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise unary operations.

use super::{require_float, require_same_shape};
use crate::{Tensor, TensorError, TensorView};

/// `sqrt(2/π)` and the cubic term of the tanh GELU approximation.
const GELU_SCALE: f32 = 0.797_884_6;
const GELU_CUBIC: f32 = 0.044_715;

/// Unary element-wise operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Neg,
    Sqrt,
    Log1p,
    Exp,
    Relu,
    Tanh,
    Gelu,
}

impl UnaryOp {
    fn name(self) -> &'static str {
        match self {
            UnaryOp::Abs => "abs",
            UnaryOp::Neg => "neg",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Log1p => "log1p",
            UnaryOp::Exp => "exp",
            UnaryOp::Relu => "relu",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Gelu => "gelu",
        }
    }

    /// Applies the operator to a single value.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Abs => x.abs(),
            UnaryOp::Neg => -x,
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Log1p => x.ln_1p(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Tanh => x.tanh(),
            // 0.5·x·(1 + tanh(√(2/π)·(x + 0.044715·x³)))
            UnaryOp::Gelu => 0.5 * x * (1.0 + (GELU_SCALE * (x + GELU_CUBIC * x * x * x)).tanh()),
        }
    }
}

/// Applies `op` element-wise from `input` into `output`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if input and output shapes differ.
/// Returns [`TensorError::UnsupportedDType`] for integer inputs.
pub fn unary(op: UnaryOp, input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    require_float(op.name(), input)?;
    require_same_shape(op.name(), input, output)?;
    let values: Vec<f32> = input.to_f32_vec().into_iter().map(|x| op.apply(x)).collect();
    output.write_f32(&values)
}

/// Clamps every element into `[min, max]`.
pub fn clamp(
    input: &TensorView<'_>,
    min: f32,
    max: f32,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    require_float("clamp", input)?;
    require_same_shape("clamp", input, output)?;
    if min > max {
        return Err(TensorError::InvalidParameter {
            op: "clamp",
            detail: format!("min {min} exceeds max {max}"),
        });
    }
    let values: Vec<f32> = input
        .to_f32_vec()
        .into_iter()
        .map(|x| x.max(min).min(max))
        .collect();
    output.write_f32(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    #[test]
    fn test_abs_then_sqrt() {
        let input = Tensor::from_f32(Shape::vector(3), &[-4.0, 9.0, -0.25]).unwrap();
        let mut abs = Tensor::zeros(Shape::vector(3), DType::F32);
        unary(UnaryOp::Abs, &input.view(), &mut abs).unwrap();
        let mut out = Tensor::zeros(Shape::vector(3), DType::F32);
        unary(UnaryOp::Sqrt, &abs.view(), &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![2.0, 3.0, 0.5]);
    }

    #[test]
    fn test_log1p_small_values() {
        let input = Tensor::from_f32(Shape::vector(2), &[0.0, 1e-7]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(2), DType::F32);
        unary(UnaryOp::Log1p, &input.view(), &mut out).unwrap();
        let r = out.to_f32_vec();
        assert_eq!(r[0], 0.0);
        assert!((r[1] - 1e-7).abs() < 1e-10);
    }

    #[test]
    fn test_f16_roundtrip_through_kernel() {
        let input = Tensor::from_values(Shape::vector(2), DType::F16, &[4.0, 16.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(2), DType::F16);
        unary(UnaryOp::Sqrt, &input.view(), &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_rejects_integer_input() {
        let input = Tensor::from_i8(Shape::vector(2), &[1, 2]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(2), DType::I8);
        let err = unary(UnaryOp::Relu, &input.view(), &mut out).unwrap_err();
        assert!(matches!(err, TensorError::UnsupportedDType { op: "relu", .. }));
    }

    #[test]
    fn test_gelu_tanh_approximation() {
        assert_eq!(UnaryOp::Gelu.apply(0.0), 0.0);
        for (x, expected) in [(1.0f32, 0.8412f32), (-1.0, -0.1588), (2.0, 1.9545)] {
            let y = UnaryOp::Gelu.apply(x);
            assert!((y - expected).abs() < 1e-3, "gelu({x}) = {y}");
        }
        assert!(UnaryOp::Gelu.apply(-6.0).abs() < 1e-6);
    }

    #[test]
    fn test_clamp() {
        let input = Tensor::from_f32(Shape::vector(4), &[-2.0, -0.5, 0.5, 2.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(4), DType::F32);
        clamp(&input.view(), -1.0, 1.0, &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![-1.0, -0.5, 0.5, 1.0]);
        assert!(clamp(&input.view(), 1.0, -1.0, &mut out).is_err());
    }
}
