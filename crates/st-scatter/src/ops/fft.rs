// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Batched 2-D spectral transforms over interleaved complex maps.
//!
//! This is a thin adapter around an external FFT engine; the transform
//! itself is not part of this crate's design. Every direction is
//! **unnormalized**: neither the forward nor the inverse transform divides by
//! the signal length, so a forward/inverse round trip scales the input by
//! `height · width` and callers apply their own normalization.
//!
//! Inputs must be contiguous; a non-contiguous tensor is a layout error, not
//! an implicit copy. Plans are cached inside the adapter and released when it
//! is dropped.

use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::dtype::Scalar;
use crate::error::{other, shape, Result};
use crate::tensor::ComplexTensor;

/// Transform direction and output representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpectralMode {
    /// Complex-to-complex forward transform.
    C2cForward,
    /// Complex-to-complex inverse transform.
    C2cInverse,
    /// Inverse transform returning only the real plane. C2R is always an
    /// inverse transform.
    C2rInverse,
}

/// Output of [`Spectral2d::transform`]: complex modes keep the interleaved
/// representation, the C2R mode drops the pair axis.
pub enum SpectralOutput<T: Scalar> {
    Complex(ComplexTensor<T>),
    Real(ArrayD<T>),
}

/// Batched 2-D FFT/IFFT adapter over the two innermost spatial axes.
pub struct Spectral2d<T: Scalar> {
    planner: Mutex<FftPlanner<T>>,
}

impl<T: Scalar> Spectral2d<T> {
    pub fn new() -> Self {
        Self { planner: Mutex::new(FftPlanner::new()) }
    }

    /// Unnormalized forward transform.
    pub fn forward(&self, input: &ComplexTensor<T>) -> Result<ComplexTensor<T>> {
        let buf = self.run(input, false)?;
        repack_complex(input.shape(), buf)
    }

    /// Unnormalized inverse transform.
    pub fn inverse(&self, input: &ComplexTensor<T>) -> Result<ComplexTensor<T>> {
        let buf = self.run(input, true)?;
        repack_complex(input.shape(), buf)
    }

    /// Unnormalized inverse transform keeping only the real plane; the pair
    /// axis is dropped and the spatial extent is unchanged.
    pub fn inverse_real(&self, input: &ComplexTensor<T>) -> Result<ArrayD<T>> {
        let buf = self.run(input, true)?;
        let real_shape = &input.shape()[..input.ndim() - 1];
        let values: Vec<T> = buf.iter().map(|v| v.re).collect();
        ArrayD::from_shape_vec(IxDyn(real_shape), values).map_err(|err| shape(&err.to_string()))
    }

    /// Mode-driven entry point mirroring the operator table.
    pub fn transform(
        &self,
        input: &ComplexTensor<T>,
        mode: SpectralMode,
    ) -> Result<SpectralOutput<T>> {
        match mode {
            SpectralMode::C2cForward => self.forward(input).map(SpectralOutput::Complex),
            SpectralMode::C2cInverse => self.inverse(input).map(SpectralOutput::Complex),
            SpectralMode::C2rInverse => self.inverse_real(input).map(SpectralOutput::Real),
        }
    }

    /// Row transforms followed by column transforms per leading-axis image.
    fn run(&self, input: &ComplexTensor<T>, inverse: bool) -> Result<Vec<Complex<T>>> {
        let src = input.contiguous_slice()?;
        let (h, w) = (input.height(), input.width());

        let mut buf: Vec<Complex<T>> = src
            .chunks_exact(2)
            .map(|pair| Complex::new(pair[0], pair[1]))
            .collect();

        let (row_fft, col_fft) = {
            let mut planner = self
                .planner
                .lock()
                .map_err(|_| other("spectral planner lock poisoned"))?;
            if inverse {
                (planner.plan_fft_inverse(w), planner.plan_fft_inverse(h))
            } else {
                (planner.plan_fft_forward(w), planner.plan_fft_forward(h))
            }
        };

        let mut column = vec![Complex::new(T::zero(), T::zero()); h];
        for image in buf.chunks_exact_mut(h * w) {
            for row in image.chunks_exact_mut(w) {
                row_fft.process(row);
            }
            for x in 0..w {
                for y in 0..h {
                    column[y] = image[y * w + x];
                }
                col_fft.process(&mut column);
                for y in 0..h {
                    image[y * w + x] = column[y];
                }
            }
        }
        Ok(buf)
    }
}

impl<T: Scalar> Default for Spectral2d<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn repack_complex<T: Scalar>(shape_dims: &[usize], buf: Vec<Complex<T>>) -> Result<ComplexTensor<T>> {
    let mut values = Vec::with_capacity(buf.len() * 2);
    for v in &buf {
        values.push(v.re);
        values.push(v.im);
    }
    ComplexTensor::from_shape_vec(shape_dims, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(h: usize, w: usize) -> ComplexTensor<f32> {
        let mut values = vec![0.0_f32; h * w * 2];
        values[0] = 1.0;
        ComplexTensor::from_shape_vec(&[1, h, w, 2], values).unwrap()
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let fft = Spectral2d::new();
        let out = fft.forward(&impulse(4, 4)).unwrap();
        for pair in out.contiguous_slice().unwrap().chunks_exact(2) {
            assert!((pair[0] - 1.0).abs() < 1e-5);
            assert!(pair[1].abs() < 1e-5);
        }
    }

    #[test]
    fn constant_input_concentrates_at_dc() {
        let mut values = vec![0.0_f32; 4 * 8 * 2];
        for pair in values.chunks_exact_mut(2) {
            pair[0] = 0.5;
        }
        let input = ComplexTensor::from_shape_vec(&[1, 4, 8, 2], values).unwrap();
        let out = Spectral2d::new().forward(&input).unwrap();
        let flat = out.contiguous_slice().unwrap();
        assert!((flat[0] - 0.5 * 32.0).abs() < 1e-4, "dc bin holds the sum");
        for pair in flat.chunks_exact(2).skip(1) {
            assert!(pair[0].abs() < 1e-4);
            assert!(pair[1].abs() < 1e-4);
        }
    }

    #[test]
    fn round_trip_scales_by_element_count() {
        let mut values = Vec::new();
        for idx in 0..2 * 4 * 4 {
            values.push((idx as f32 * 0.37).sin());
            values.push((idx as f32 * 0.11).cos());
        }
        let input = ComplexTensor::from_shape_vec(&[2, 4, 4, 2], values).unwrap();

        let fft = Spectral2d::new();
        let spectrum = fft.forward(&input).unwrap();
        let back = fft.inverse(&spectrum).unwrap();

        let scale = (4 * 4) as f32;
        for (got, src) in back
            .contiguous_slice()
            .unwrap()
            .iter()
            .zip(input.contiguous_slice().unwrap())
        {
            assert!((got - src * scale).abs() < 1e-3);
        }
    }

    #[test]
    fn inverse_real_drops_the_pair_axis() {
        let input = impulse(4, 4);
        let out = Spectral2d::new().inverse_real(&input).unwrap();
        assert_eq!(out.shape(), &[1, 4, 4]);
        // Inverse of an impulse spreads it evenly, all bins real 1.0.
        for v in out.iter() {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn non_contiguous_input_is_a_layout_error() {
        let base = ComplexTensor::<f32>::zeros(&[4, 8, 2]).unwrap();
        let twisted =
            ComplexTensor::from_array(base.into_array().permuted_axes(vec![1, 0, 2])).unwrap();
        let err = Spectral2d::new().forward(&twisted).unwrap_err();
        assert!(matches!(err, crate::error::Error::Layout(_)));
    }

    #[test]
    fn transform_mode_table() {
        let fft = Spectral2d::new();
        let input = impulse(2, 2);
        assert!(matches!(
            fft.transform(&input, SpectralMode::C2cForward).unwrap(),
            SpectralOutput::Complex(_)
        ));
        assert!(matches!(
            fft.transform(&input, SpectralMode::C2rInverse).unwrap(),
            SpectralOutput::Real(_)
        ));
    }
}
