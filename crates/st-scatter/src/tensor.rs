// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Interleaved complex tensors.
//!
//! Every operator in this crate shares one data convention: an N-dimensional
//! complex array is a real array with an extra trailing axis of length 2
//! holding the (real, imaginary) components of each element. [`ComplexTensor`]
//! enforces that convention at construction, so downstream code never has to
//! re-check it and a non-complex array is rejected before any device work is
//! issued.

use ndarray::{ArrayD, IxDyn};

use crate::dtype::Scalar;
use crate::error::{dtype, layout, shape, Result};

/// Dense array of rank ≥ 3 whose trailing axis has length exactly 2,
/// interpreted as interleaved (real, imaginary) pairs.
///
/// The two innermost spatial axes are height (axis −3) and width (axis −2);
/// every leading axis is a batch/channel axis folded flat by the kernels.
#[derive(Clone, Debug)]
pub struct ComplexTensor<T: Scalar> {
    data: ArrayD<T>,
}

impl<T: Scalar> ComplexTensor<T> {
    /// Wrap an existing array, validating the complex representation.
    pub fn from_array(data: ArrayD<T>) -> Result<Self> {
        if data.ndim() < 3 {
            return Err(shape(&format!(
                "complex tensor needs rank >= 3 (got rank {})",
                data.ndim()
            )));
        }
        let pair = data.shape()[data.ndim() - 1];
        if pair != 2 {
            return Err(dtype(&format!(
                "input is not complex: trailing axis must have length 2 (got {pair})"
            )));
        }
        Ok(Self { data })
    }

    /// Build from a flat interleaved buffer in row-major order.
    pub fn from_shape_vec(shape_dims: &[usize], values: Vec<T>) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape_dims), values)
            .map_err(|err| shape(&err.to_string()))?;
        Self::from_array(data)
    }

    /// All-zero tensor of the given shape.
    pub fn zeros(shape_dims: &[usize]) -> Result<Self> {
        Self::from_array(ArrayD::zeros(IxDyn(shape_dims)))
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn into_array(self) -> ArrayD<T> {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Spatial height (axis −3).
    pub fn height(&self) -> usize {
        self.data.shape()[self.data.ndim() - 3]
    }

    /// Spatial width (axis −2).
    pub fn width(&self) -> usize {
        self.data.shape()[self.data.ndim() - 2]
    }

    /// Product of every axis before the spatial pair — the flattened
    /// batch·channel extent seen by the kernels.
    pub fn batch_len(&self) -> usize {
        self.data.shape()[..self.data.ndim() - 3].iter().product()
    }

    /// Number of complex elements (half the scalar count).
    pub fn complex_len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn is_standard_layout(&self) -> bool {
        self.data.is_standard_layout()
    }

    /// Borrow the underlying buffer, failing when the memory is not
    /// contiguous row-major. No implicit copy is made.
    pub fn contiguous_slice(&self) -> Result<&[T]> {
        self.data
            .as_slice()
            .ok_or_else(|| layout("tensor memory must be contiguous (row-major)"))
    }

    /// Owned row-major copy; identical to the input when already contiguous.
    pub(crate) fn standard_owned(&self) -> ArrayD<T> {
        self.data.as_standard_layout().into_owned()
    }
}
