// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{DType, Shape, TensorError};
use half::{bf16, f16};

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// `Tensor` carries example inputs, golden outputs, constants and kernel
/// results through the pipeline. Two tensors are equal when shape, dtype
/// and every stored byte are equal, which is the comparison the bundle
/// round-trip relies on.
///
/// # Memory Layout
/// Data is stored in row-major (C) order as a flat little-endian byte buffer.
/// Typed access goes through [`to_f32_vec`](Tensor::to_f32_vec) and
/// [`write_f32`](Tensor::write_f32), which convert per element and never
/// reinterpret the buffer in place.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw little-endian bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        // Saturate so shapes too large to address never match a buffer.
        let expected = shape.checked_size_bytes(dtype).unwrap_or(usize::MAX);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates an `F32` tensor from a slice of values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_values(shape, DType::F32, values)
    }

    /// Creates an `I8` tensor from a slice of values.
    pub fn from_i8(shape: Shape, values: &[i8]) -> Result<Self, TensorError> {
        check_len(&shape, DType::I8, values.len())?;
        let data = values.iter().map(|&v| v as u8).collect();
        Ok(Self {
            shape,
            dtype: DType::I8,
            data,
        })
    }

    /// Creates a tensor of any dtype from `f32` values, converting each
    /// element to the storage type. Integer conversion rounds to nearest
    /// and saturates at the type bounds.
    pub fn from_values(shape: Shape, dtype: DType, values: &[f32]) -> Result<Self, TensorError> {
        check_len(&shape, dtype, values.len())?;
        let mut tensor = Self::zeros(shape, dtype);
        tensor.write_f32(values)?;
        Ok(tensor)
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            dtype: self.dtype,
            data: &self.data,
        }
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the tensor and returns its byte buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Decodes every element to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.view().to_f32_vec()
    }

    /// Decodes every element to `f64`. Exact for all supported dtypes.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.view().to_f64_vec()
    }

    /// Overwrites the tensor contents from `f32` values, converting to the
    /// storage dtype.
    pub fn write_f32(&mut self, values: &[f32]) -> Result<(), TensorError> {
        check_len(&self.shape, self.dtype, values.len())?;
        let width = self.dtype.size_bytes();
        for (chunk, &v) in self.data.chunks_exact_mut(width).zip(values) {
            encode(self.dtype, v, chunk);
        }
        Ok(())
    }

    /// Fills the tensor with a constant value.
    pub fn fill(&mut self, value: f32) {
        let width = self.dtype.size_bytes();
        for chunk in self.data.chunks_exact_mut(width) {
            encode(self.dtype, value, chunk);
        }
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Creates a view from raw parts.
    pub fn from_parts(shape: &'a Shape, dtype: DType, data: &'a [u8]) -> Self {
        Self { shape, dtype, data }
    }

    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the data type of the viewed tensor.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Decodes every element to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data
            .chunks_exact(self.dtype.size_bytes())
            .map(|c| decode(self.dtype, c))
            .collect()
    }

    /// Decodes every element to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data
            .chunks_exact(self.dtype.size_bytes())
            .map(|c| match self.dtype {
                DType::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                other => decode(other, c) as f64,
            })
            .collect()
    }
}

fn check_len(shape: &Shape, dtype: DType, len: usize) -> Result<(), TensorError> {
    let expected = shape.num_elements();
    if len != expected {
        return Err(TensorError::BufferSizeMismatch {
            expected: expected * dtype.size_bytes(),
            actual: len * dtype.size_bytes(),
        });
    }
    Ok(())
}

fn decode(dtype: DType, c: &[u8]) -> f32 {
    match dtype {
        DType::F32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
        DType::F16 => f16::from_le_bytes([c[0], c[1]]).to_f32(),
        DType::BF16 => bf16::from_le_bytes([c[0], c[1]]).to_f32(),
        DType::I8 => c[0] as i8 as f32,
        DType::U8 => c[0] as f32,
        DType::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32,
    }
}

fn encode(dtype: DType, v: f32, out: &mut [u8]) {
    match dtype {
        DType::F32 => out.copy_from_slice(&v.to_le_bytes()),
        DType::F16 => out.copy_from_slice(&f16::from_f32(v).to_le_bytes()),
        DType::BF16 => out.copy_from_slice(&bf16::from_f32(v).to_le_bytes()),
        // `as` casts from float saturate and map NaN to zero.
        DType::I8 => out[0] = v.round() as i8 as u8,
        DType::U8 => out[0] = v.round() as u8,
        DType::I32 => out.copy_from_slice(&(v.round() as i32).to_le_bytes()),
    }
}
