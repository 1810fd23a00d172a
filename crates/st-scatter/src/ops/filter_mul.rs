// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pointwise complex multiplication of a batch against one shared filter.
//!
//! The filter is a plain complex map of rank exactly 3 `(h, w, 2)`,
//! broadcast across every leading axis of the batch operand. The device fast
//! path realizes the product as a diagonal-matrix multiply
//! (`C = diag(filter) · batch`) through cuBLAS; the portable path spells out
//! the four real products. Both operands share one scalar type by
//! construction, so mixed-precision calls are impossible rather than checked.

use crate::dtype::Scalar;
use crate::error::{shape, Result};
use crate::tensor::ComplexTensor;

/// Filter application operator with an optional device fast path.
pub struct FilterMultiply {
    fast_path: bool,
}

impl FilterMultiply {
    pub fn new(fast_path: bool) -> Self {
        Self { fast_path }
    }

    pub fn fast_path(&self) -> bool {
        self.fast_path
    }

    /// `batch ⊙ filter` with the filter broadcast over leading axes.
    pub fn apply<T: Scalar>(
        &self,
        batch: &ComplexTensor<T>,
        filter: &ComplexTensor<T>,
    ) -> Result<ComplexTensor<T>> {
        validate_operands(batch, filter)?;
        if self.fast_path {
            #[cfg(feature = "cuda")]
            {
                match crate::backend::cuda::runtime() {
                    Ok(rt) => return rt.filter_multiply(batch, filter),
                    Err(err) => tracing::debug!(
                        "cuda runtime unavailable ({err}); filter multiply takes the portable path"
                    ),
                }
            }
        }
        filter_multiply_reference(batch, filter)
    }

    /// In-place variant reusing the batch tensor as output.
    pub fn apply_inplace<T: Scalar>(
        &self,
        batch: &mut ComplexTensor<T>,
        filter: &ComplexTensor<T>,
    ) -> Result<()> {
        *batch = self.apply(batch, filter)?;
        Ok(())
    }
}

fn validate_operands<T: Scalar>(
    batch: &ComplexTensor<T>,
    filter: &ComplexTensor<T>,
) -> Result<()> {
    if filter.ndim() != 3 {
        return Err(shape(&format!(
            "filter must be a plain complex map of rank 3 (got rank {})",
            filter.ndim()
        )));
    }
    let trailing = &batch.shape()[batch.ndim() - 3..];
    if trailing != filter.shape() {
        return Err(shape(&format!(
            "filter shape {:?} does not match batch trailing axes {:?}",
            filter.shape(),
            trailing
        )));
    }
    Ok(())
}

/// Reference implementation on host memory.
pub fn filter_multiply_reference<T: Scalar>(
    batch: &ComplexTensor<T>,
    filter: &ComplexTensor<T>,
) -> Result<ComplexTensor<T>> {
    validate_operands(batch, filter)?;

    let batch_owned = batch.standard_owned();
    let filter_owned = filter.standard_owned();
    let b = batch_owned
        .as_slice()
        .ok_or_else(|| crate::error::layout("batch could not be made contiguous"))?;
    let f = filter_owned
        .as_slice()
        .ok_or_else(|| crate::error::layout("filter could not be made contiguous"))?;

    let mut out = vec![T::zero(); b.len()];
    for (dst, src) in out.chunks_exact_mut(f.len()).zip(b.chunks_exact(f.len())) {
        for i in 0..f.len() / 2 {
            let (br, bi) = (src[2 * i], src[2 * i + 1]);
            let (fr, fi) = (f[2 * i], f[2 * i + 1]);
            dst[2 * i] = br * fr - bi * fi;
            dst[2 * i + 1] = br * fi + bi * fr;
        }
    }
    ComplexTensor::from_shape_vec(batch.shape(), out)
}
