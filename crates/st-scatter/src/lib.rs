// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/st-scatter/src/lib.rs

//! GPU primitives for 2-D wavelet scattering transforms.
//!
//! Four independent operators over interleaved complex maps (trailing axis of
//! length 2 holding real/imaginary parts): periodized downsampling, the
//! complex-modulus nonlinearity, batched unnormalized 2-D spectral
//! transforms, and pointwise multiplication against a shared filter. Each
//! operator has a portable reference path; with the `cuda` feature the
//! periodization and modulus run as JIT-compiled device kernels and the
//! filter multiply goes through the cuBLAS diagonal-multiply primitive. The
//! crate only exposes the primitives — sequencing them into a scattering
//! network is the caller's business.

pub mod backend;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod tensor;

pub use dtype::{DType, Scalar};
pub use error::{Error, Result};
pub use ops::fft::{Spectral2d, SpectralMode, SpectralOutput};
pub use ops::filter_mul::FilterMultiply;
pub use ops::modulus::Modulus;
pub use ops::periodize::Periodize;
pub use tensor::ComplexTensor;

#[cfg(feature = "cuda")]
pub mod cuda_support {
    pub use crate::backend::cuda::*;
}
