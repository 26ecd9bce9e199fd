// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference tensor kernels.
//!
//! Each kernel reads from [`TensorView`](crate::TensorView)s and writes into
//! a pre-allocated output [`Tensor`](crate::Tensor) whose shape and dtype the
//! caller derived from the graph's type information. Arithmetic happens in
//! `f32`; the output dtype decides the stored representation.

mod binary_op;
mod matmul_op;
mod quant_op;
mod softmax_op;
mod unary_op;

pub use binary_op::{binary, BinaryOp};
pub use matmul_op::matmul;
pub use quant_op::{dequantize_per_tensor, quantize_per_tensor, quantize_value, QuantParams};
pub use softmax_op::softmax;
pub use unary_op::{clamp, unary, UnaryOp};

use crate::{Tensor, TensorError, TensorView};

/// Rejects non-float inputs for kernels that only accept float storage.
pub(crate) fn require_float(op: &'static str, view: &TensorView<'_>) -> Result<(), TensorError> {
    if view.dtype().is_float() {
        Ok(())
    } else {
        Err(TensorError::UnsupportedDType {
            op,
            dtype: view.dtype(),
        })
    }
}

/// Checks that input and output have identical shapes.
pub(crate) fn require_same_shape(
    op: &'static str,
    input: &TensorView<'_>,
    output: &Tensor,
) -> Result<(), TensorError> {
    if input.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }
    Ok(())
}
