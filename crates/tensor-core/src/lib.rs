// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor types and reference kernels used by the AOT compilation pipeline.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, typed n-dimensional buffer in row-major order.
//! - [`Shape`]: dimension descriptors with broadcasting helpers.
//! - [`DType`]: element types (f32, f16, bf16, i8, u8, i32).
//! - Reference kernels (element-wise math, broadcasting arithmetic, matmul,
//!   softmax, GELU, per-tensor quantize/dequantize).
//!
//! Kernels compute in `f32` regardless of storage type and write into
//! pre-allocated output tensors. They are the numeric ground truth for
//! golden-output capture and for the reference runner; they are not tuned
//! for speed.

mod dtype;
mod error;
pub mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
