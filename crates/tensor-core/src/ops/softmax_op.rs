// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax over the last axis.

use super::{require_float, require_same_shape};
use crate::{Tensor, TensorError, TensorView};

/// Writes `exp(x − max) / Σ exp(x − max)` for every row of the last axis.
/// A scalar is treated as a single row of one element.
///
/// # Errors
/// [`TensorError::ShapeMismatch`] if shapes differ,
/// [`TensorError::UnsupportedDType`] for integer inputs.
pub fn softmax(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    require_float("softmax", input)?;
    require_same_shape("softmax", input, output)?;

    let row_len = input.shape().dims().last().copied().unwrap_or(1);
    if row_len == 0 {
        return Ok(());
    }
    let mut values = input.to_f32_vec();
    for row in values.chunks_exact_mut(row_len) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.iter_mut().for_each(|x| *x = (*x - max).exp());
        let sum: f32 = row.iter().sum();
        if sum > 0.0 {
            row.iter_mut().for_each(|x| *x /= sum);
        }
    }
    output.write_f32(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    fn run(shape: Shape, values: &[f32]) -> Vec<f32> {
        let input = Tensor::from_f32(shape.clone(), values).unwrap();
        let mut output = Tensor::zeros(shape, DType::F32);
        softmax(&input.view(), &mut output).unwrap();
        output.to_f32_vec()
    }

    #[test]
    fn test_rows_are_independent() {
        let r = run(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 5.0, 5.0, 5.0]);
        assert!((r[..3].iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(r[0] < r[1] && r[1] < r[2]);
        assert!(r[3..].iter().all(|&x| (x - 1.0 / 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_large_inputs_stay_finite() {
        let r = run(Shape::vector(3), &[1000.0, 1001.0, 1002.0]);
        assert!(r.iter().all(|x| x.is_finite()));
        assert!((r.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scalar() {
        assert_eq!(run(Shape::scalar(), &[-3.5]), vec![1.0]);
    }
}
