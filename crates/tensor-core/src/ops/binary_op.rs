// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise binary arithmetic with numpy-style broadcasting.

use super::require_float;
use crate::{Shape, Tensor, TensorError, TensorView};

/// Binary element-wise operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }

    /// Applies the operator to a pair of values.
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// Computes `output = lhs <op> rhs`, broadcasting both operands to the
/// output shape.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the operands do not broadcast
/// to `output.shape()`.
/// Returns [`TensorError::UnsupportedDType`] for integer operands.
pub fn binary(
    op: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    require_float(op.name(), lhs)?;
    require_float(op.name(), rhs)?;

    let out_shape = lhs
        .shape()
        .broadcast_with(rhs.shape())
        .ok_or_else(|| TensorError::ShapeMismatch {
            op: op.name(),
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        })?;
    if &out_shape != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op: op.name(),
            lhs: out_shape,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.to_f32_vec();
    let b = rhs.to_f32_vec();
    let a_idx = broadcast_indices(lhs.shape(), &out_shape);
    let b_idx = broadcast_indices(rhs.shape(), &out_shape);

    let values: Vec<f32> = a_idx
        .iter()
        .zip(&b_idx)
        .map(|(&i, &j)| op.apply(a[i], b[j]))
        .collect();
    output.write_f32(&values)
}

/// For every element of `out` (row-major), the flat index of the source
/// element in a tensor of shape `src` broadcast to `out`.
fn broadcast_indices(src: &Shape, out: &Shape) -> Vec<usize> {
    let rank = out.rank();
    let src_strides = src.strides();
    // Stride along each output axis; zero where the source is broadcast.
    let strides: Vec<usize> = (0..rank)
        .map(|axis| {
            let pad = rank - src.rank();
            if axis < pad || src.dims()[axis - pad] == 1 {
                0
            } else {
                src_strides[axis - pad]
            }
        })
        .collect();

    let total = out.num_elements();
    let mut indices = Vec::with_capacity(total);
    let mut coord = vec![0usize; rank];
    for _ in 0..total {
        indices.push(coord.iter().zip(&strides).map(|(c, s)| c * s).sum());
        for axis in (0..rank).rev() {
            coord[axis] += 1;
            if coord[axis] < out.dims()[axis] {
                break;
            }
            coord[axis] = 0;
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_same_shape_add() {
        let a = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(3), &[10.0, 20.0, 30.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(3), DType::F32);
        binary(BinaryOp::Add, &a.view(), &b.view(), &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_row_broadcast() {
        let a = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(3), &[1.0, 0.0, -1.0]).unwrap();
        let mut out = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        binary(BinaryOp::Mul, &a.view(), &b.view(), &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![1.0, 0.0, -3.0, 4.0, 0.0, -6.0]);
    }

    #[test]
    fn test_column_broadcast_both_sides() {
        let a = Tensor::from_f32(Shape::matrix(2, 1), &[1.0, 2.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(1, 3), &[10.0, 20.0, 30.0]).unwrap();
        let mut out = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        binary(BinaryOp::Sub, &a.view(), &b.view(), &mut out).unwrap();
        assert_eq!(
            out.to_f32_vec(),
            vec![-9.0, -19.0, -29.0, -8.0, -18.0, -28.0]
        );
    }

    #[test]
    fn test_scalar_operand() {
        let a = Tensor::from_f32(Shape::vector(2), &[3.0, 6.0]).unwrap();
        let b = Tensor::from_f32(Shape::scalar(), &[3.0]).unwrap();
        let mut out = Tensor::zeros(Shape::vector(2), DType::F32);
        binary(BinaryOp::Div, &a.view(), &b.view(), &mut out).unwrap();
        assert_eq!(out.to_f32_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_incompatible_shapes() {
        let a = Tensor::zeros(Shape::vector(3), DType::F32);
        let b = Tensor::zeros(Shape::vector(4), DType::F32);
        let mut out = Tensor::zeros(Shape::vector(4), DType::F32);
        assert!(binary(BinaryOp::Add, &a.view(), &b.view(), &mut out).is_err());
    }
}
