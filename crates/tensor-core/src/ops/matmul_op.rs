// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D matrix product.

use super::require_float;
use crate::{Shape, Tensor, TensorError, TensorView};

/// `output = lhs · rhs` for `[M, K] · [K, N] → [M, N]`.
///
/// Accumulates in `f32` and stores in the output dtype.
///
/// # Errors
/// [`TensorError::ShapeMismatch`] for non-2-D operands, a `K` mismatch or a
/// wrongly sized output; [`TensorError::UnsupportedDType`] for integer
/// operands.
pub fn matmul(lhs: &TensorView<'_>, rhs: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    require_float("matmul", lhs)?;
    require_float("matmul", rhs)?;

    let (m, k, n) = match (lhs.shape().dims(), rhs.shape().dims()) {
        (&[m, k], &[k2, n]) if k == k2 => (m, k, n),
        _ => {
            return Err(TensorError::ShapeMismatch {
                op: "matmul",
                lhs: lhs.shape().clone(),
                rhs: rhs.shape().clone(),
            })
        }
    };
    let result_shape = Shape::matrix(m, n);
    if output.shape() != &result_shape {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: result_shape,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.to_f32_vec();
    let b = rhs.to_f32_vec();
    let mut c = vec![0.0f32; m * n];
    // Row of A times B, accumulated row by row of B.
    for (a_row, c_row) in a.chunks_exact(k.max(1)).zip(c.chunks_exact_mut(n.max(1))) {
        for (&a_ip, b_row) in a_row.iter().zip(b.chunks_exact(n.max(1))) {
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij += a_ip * b_pj;
            }
        }
    }
    output.write_f32(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    fn matrix(rows: usize, cols: usize, values: &[f32]) -> Tensor {
        Tensor::from_f32(Shape::matrix(rows, cols), values).unwrap()
    }

    #[test]
    fn test_rectangular_product() {
        let a = matrix(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = matrix(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        matmul(&a.view(), &b.view(), &mut c).unwrap();
        assert_eq!(c.to_f32_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_f16_output() {
        let a = matrix(1, 2, &[0.5, 1.5]);
        let b = matrix(2, 1, &[2.0, 2.0]);
        let mut c = Tensor::zeros(Shape::matrix(1, 1), DType::F16);
        matmul(&a.view(), &b.view(), &mut c).unwrap();
        assert_eq!(c.to_f32_vec(), vec![4.0]);
    }

    #[test]
    fn test_inner_dim_and_output_checked() {
        let a = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        let b = Tensor::zeros(Shape::matrix(4, 2), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        assert!(matmul(&a.view(), &b.view(), &mut c).is_err());

        let b = Tensor::zeros(Shape::matrix(3, 2), DType::F32);
        let mut wrong = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        assert!(matmul(&a.view(), &b.view(), &mut wrong).is_err());
    }

    #[test]
    fn test_integer_operands_rejected() {
        let a = Tensor::from_i8(Shape::matrix(1, 1), &[3]).unwrap();
        let mut c = Tensor::zeros(Shape::matrix(1, 1), DType::I8);
        let err = matmul(&a.view(), &a.view(), &mut c).unwrap_err();
        assert!(matches!(err, TensorError::UnsupportedDType { op: "matmul", .. }));
    }
}
