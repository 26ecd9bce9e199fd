// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shapes and numpy-style broadcasting.

use std::fmt;

/// Dimensions of a [`crate::Tensor`], outermost first. Rank 0 is a scalar
/// holding one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![1, 1, 4, 4]);
    /// assert_eq!(s.rank(), 4);
    /// assert_eq!(s.num_elements(), 16);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::new(vec![rows, cols])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of the dimensions; 1 for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Bytes needed to store this shape as `dtype`.
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// [`Shape::num_elements`] for untrusted dims; `None` on overflow.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// [`Shape::size_bytes`] for untrusted dims; `None` on overflow.
    pub fn checked_size_bytes(&self, dtype: super::DType) -> Option<usize> {
        self.checked_num_elements()?.checked_mul(dtype.size_bytes())
    }

    /// Row-major element strides.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (1..self.dims.len()).rev() {
            strides[i - 1] = strides[i] * self.dims[i];
        }
        strides
    }

    /// Result shape of broadcasting `self` against `other`, or `None` when a
    /// right-aligned pair of dimensions differs and neither is 1.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let padded = |s: &Shape, axis: usize| {
            let pad = rank - s.rank();
            if axis < pad {
                1
            } else {
                s.dims[axis - pad]
            }
        };
        (0..rank)
            .map(|axis| match (padded(self, axis), padded(other, axis)) {
                (a, b) if a == b => Some(a),
                (1, b) => Some(b),
                (a, 1) => Some(a),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_scalar_has_one_element() {
        let s = Shape::scalar();
        assert_eq!(s.num_elements(), 1);
        assert!(s.strides().is_empty());
        assert_eq!(s.to_string(), "[]");
    }

    #[test]
    fn test_strides_and_bytes() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert_eq!(s.size_bytes(DType::F16), 48);
        assert_eq!(s.to_string(), "[2, 3, 4]");
    }

    #[test]
    fn test_checked_sizes() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.checked_num_elements(), Some(12));
        assert_eq!(s.checked_size_bytes(DType::F32), Some(48));

        let huge = Shape::matrix(1 << 40, 1 << 40);
        assert_eq!(huge.checked_num_elements(), None);
        let wide = Shape::vector(usize::MAX / 2 + 1);
        assert!(wide.checked_num_elements().is_some());
        assert_eq!(wide.checked_size_bytes(DType::F16), None);
    }

    #[test]
    fn test_zero_sized_dimension() {
        let s = Shape::matrix(0, 5);
        assert_eq!(s.num_elements(), 0);
        assert_eq!(s.size_bytes(DType::F32), 0);
    }

    #[test]
    fn test_broadcast() {
        assert_eq!(
            Shape::matrix(4, 1).broadcast_with(&Shape::vector(3)),
            Some(Shape::matrix(4, 3))
        );
        assert_eq!(
            Shape::new(vec![1, 1, 4, 4]).broadcast_with(&Shape::scalar()),
            Some(Shape::new(vec![1, 1, 4, 4]))
        );
        assert_eq!(Shape::vector(3).broadcast_with(&Shape::vector(4)), None);
        assert_eq!(Shape::matrix(2, 8).broadcast_with(&Shape::vector(8)), Some(Shape::matrix(2, 8)));
    }
}
