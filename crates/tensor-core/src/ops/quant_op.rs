// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-tensor affine quantization.
//!
//! ```text
//! quantize:   q = clamp(round_half_even(x / scale) + zero_point, qmin, qmax)
//! dequantize: x = (q - zero_point) * scale
//! ```
//!
//! `zero_point` is not required to lie inside `[qmin, qmax]`; only the
//! storage dtype must be able to represent every value in `[qmin, qmax]`.

use super::require_same_shape;
use crate::{DType, Tensor, TensorError, TensorView};

/// Affine quantization parameters for a whole tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f64,
    pub zero_point: i64,
    pub qmin: i64,
    pub qmax: i64,
    pub dtype: DType,
}

impl QuantParams {
    /// Checks that the parameters describe a usable mapping.
    pub fn validate(&self, op: &'static str) -> Result<(), TensorError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(TensorError::InvalidParameter {
                op,
                detail: format!("scale must be positive and finite, got {}", self.scale),
            });
        }
        if self.qmin > self.qmax {
            return Err(TensorError::InvalidParameter {
                op,
                detail: format!("qmin {} exceeds qmax {}", self.qmin, self.qmax),
            });
        }
        let (lo, hi) = self
            .dtype
            .integer_range()
            .ok_or(TensorError::UnsupportedDType {
                op,
                dtype: self.dtype,
            })?;
        if self.qmin < lo || self.qmax > hi {
            return Err(TensorError::InvalidParameter {
                op,
                detail: format!(
                    "range [{}, {}] does not fit storage dtype {} [{lo}, {hi}]",
                    self.qmin, self.qmax, self.dtype
                ),
            });
        }
        Ok(())
    }
}

/// Quantizes a single value.
pub fn quantize_value(x: f32, p: &QuantParams) -> f32 {
    let inv_scale = 1.0 / p.scale as f32;
    // `as` saturates infinities and sends NaN to 0.
    let steps = (x * inv_scale).round_ties_even() as i64;
    steps.saturating_add(p.zero_point).clamp(p.qmin, p.qmax) as f32
}

/// Quantizes a float tensor into `output`, whose dtype must equal `p.dtype`.
pub fn quantize_per_tensor(
    input: &TensorView<'_>,
    p: &QuantParams,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    p.validate("quantize_per_tensor")?;
    if !input.dtype().is_float() {
        return Err(TensorError::UnsupportedDType {
            op: "quantize_per_tensor",
            dtype: input.dtype(),
        });
    }
    if output.dtype() != p.dtype {
        return Err(TensorError::UnsupportedDType {
            op: "quantize_per_tensor (output)",
            dtype: output.dtype(),
        });
    }
    require_same_shape("quantize_per_tensor", input, output)?;

    let values: Vec<f32> = input
        .to_f32_vec()
        .into_iter()
        .map(|x| quantize_value(x, p))
        .collect();
    output.write_f32(&values)
}

/// Dequantizes an integer tensor of dtype `p.dtype` into a float `output`.
pub fn dequantize_per_tensor(
    input: &TensorView<'_>,
    p: &QuantParams,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    p.validate("dequantize_per_tensor")?;
    if input.dtype() != p.dtype {
        return Err(TensorError::UnsupportedDType {
            op: "dequantize_per_tensor",
            dtype: input.dtype(),
        });
    }
    if !output.dtype().is_float() {
        return Err(TensorError::UnsupportedDType {
            op: "dequantize_per_tensor (output)",
            dtype: output.dtype(),
        });
    }
    require_same_shape("dequantize_per_tensor", input, output)?;

    let scale = p.scale as f32;
    let values: Vec<f32> = input
        .to_f64_vec()
        .into_iter()
        .map(|q| (q as i64).saturating_sub(p.zero_point) as f32 * scale)
        .collect();
    output.write_f32(&values)
}
