// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Complex-modulus nonlinearity. Each element maps to its magnitude,
//! re-embedded as a complex value with zero imaginary part so the uniform
//! interleaved representation survives the nonlinearity.

use crate::dtype::Scalar;
use crate::error::Result;
use crate::tensor::ComplexTensor;

/// Pointwise magnitude operator with an optional device fast path.
pub struct Modulus {
    fast_path: bool,
}

impl Modulus {
    pub fn new(fast_path: bool) -> Self {
        Self { fast_path }
    }

    pub fn fast_path(&self) -> bool {
        self.fast_path
    }

    pub fn apply<T: Scalar>(&self, input: &ComplexTensor<T>) -> Result<ComplexTensor<T>> {
        if self.fast_path {
            #[cfg(feature = "cuda")]
            {
                match crate::backend::cuda::runtime() {
                    Ok(rt) => return rt.modulus(input),
                    Err(err) => tracing::debug!(
                        "cuda runtime unavailable ({err}); modulus takes the portable path"
                    ),
                }
            }
        }
        modulus_reference(input)
    }
}

/// Reference implementation on host memory.
pub fn modulus_reference<T: Scalar>(input: &ComplexTensor<T>) -> Result<ComplexTensor<T>> {
    let owned = input.standard_owned();
    let src = owned
        .as_slice()
        .ok_or_else(|| crate::error::layout("modulus input could not be made contiguous"))?;
    let mut out = vec![T::zero(); src.len()];
    for (dst, pair) in out.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        dst[0] = pair[0].hypot(pair[1]);
    }
    ComplexTensor::from_shape_vec(input.shape(), out)
}
