// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Periodized downsampling of complex feature maps.
//!
//! Reducing a spectrum-domain map by an integer factor `k` must average the
//! elements that alias onto each other under periodic folding, not a local
//! k×k neighbourhood: `out[.., i, j]` is the mean of `in[.., i + a·(h/k),
//! j + b·(w/k)]` over all `a, b` in `[0, k)`. Block pooling gives a different
//! (wrong) result for anything but constant input.
//!
//! The portable path expresses the fold as a reshape to
//! `(.., k, h/k, k, w/k, 2)` followed by a mean over the two fold axes; the
//! reduction order does not affect the result. With the `cuda` feature a JIT
//! kernel computes the same sums on-device; when no device is present the
//! operator quietly uses the portable path instead.

use ndarray::{Axis, IxDyn};

use crate::dtype::Scalar;
use crate::error::{shape, Result};
use crate::tensor::ComplexTensor;

/// Folding/aliasing downsampler with an optional device fast path.
pub struct Periodize {
    fast_path: bool,
}

impl Periodize {
    pub fn new(fast_path: bool) -> Self {
        Self { fast_path }
    }

    pub fn fast_path(&self) -> bool {
        self.fast_path
    }

    /// Downsample both spatial axes by `factor`.
    pub fn apply<T: Scalar>(
        &self,
        input: &ComplexTensor<T>,
        factor: usize,
    ) -> Result<ComplexTensor<T>> {
        check_factor(input, factor)?;
        if self.fast_path {
            #[cfg(feature = "cuda")]
            {
                match crate::backend::cuda::runtime() {
                    Ok(rt) => return rt.periodize(input, factor),
                    Err(err) => tracing::debug!(
                        "cuda runtime unavailable ({err}); periodize takes the portable path"
                    ),
                }
            }
        }
        periodize_reference(input, factor)
    }
}

fn check_factor<T: Scalar>(input: &ComplexTensor<T>, factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(shape("downsampling factor must be at least 1"));
    }
    let (h, w) = (input.height(), input.width());
    if h % factor != 0 || w % factor != 0 {
        return Err(shape(&format!(
            "downsampling factor {factor} must divide both spatial extents ({h}, {w})"
        )));
    }
    Ok(())
}

/// Reference implementation on host memory.
pub fn periodize_reference<T: Scalar>(
    input: &ComplexTensor<T>,
    factor: usize,
) -> Result<ComplexTensor<T>> {
    check_factor(input, factor)?;
    let (h, w) = (input.height(), input.width());
    let (oh, ow) = (h / factor, w / factor);
    let lead = input.ndim() - 3;

    let mut fold_shape: Vec<usize> = input.shape()[..lead].to_vec();
    fold_shape.extend([factor, oh, factor, ow, 2]);

    let folded = input
        .standard_owned()
        .into_shape(IxDyn(&fold_shape))
        .map_err(|err| shape(&err.to_string()))?;
    let width_folded = folded
        .mean_axis(Axis(lead + 2))
        .ok_or_else(|| shape("empty fold axis"))?;
    let out = width_folded
        .mean_axis(Axis(lead))
        .ok_or_else(|| shape("empty fold axis"))?;
    ComplexTensor::from_array(out)
}
