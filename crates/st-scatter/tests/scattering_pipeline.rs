// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! End-to-end pass over the portable paths: spectral transform, filter
//! application, inverse transform, periodization and modulus chained the way
//! a scattering layer consumes them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use st_scatter::{ComplexTensor, FilterMultiply, Modulus, Periodize, Spectral2d};

fn random_batch(shape: &[usize], seed: u64) -> ComplexTensor<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len: usize = shape.iter().product();
    let values = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    ComplexTensor::from_shape_vec(shape, values).unwrap()
}

fn unit_filter(h: usize, w: usize) -> ComplexTensor<f32> {
    let mut values = vec![0.0_f32; h * w * 2];
    for pair in values.chunks_exact_mut(2) {
        pair[0] = 1.0;
    }
    ComplexTensor::from_shape_vec(&[h, w, 2], values).unwrap()
}

#[test]
fn identity_filter_round_trip_recovers_input() {
    let input = random_batch(&[2, 3, 8, 8, 2], 7);
    let fft = Spectral2d::new();
    let multiply = FilterMultiply::new(false);

    let spectrum = fft.forward(&input).unwrap();
    let filtered = multiply.apply(&spectrum, &unit_filter(8, 8)).unwrap();
    let back = fft.inverse(&filtered).unwrap();

    // Transforms are unnormalized: forward + inverse scales by h·w.
    let scale = (8 * 8) as f32;
    for (got, src) in back
        .contiguous_slice()
        .unwrap()
        .iter()
        .zip(input.contiguous_slice().unwrap())
    {
        assert!((got / scale - src).abs() < 1e-4);
    }
}

#[test]
fn scattering_layer_shapes_and_invariants() {
    let input = random_batch(&[2, 4, 16, 16, 2], 21);
    let fft = Spectral2d::new();
    let multiply = FilterMultiply::new(false);
    let periodize = Periodize::new(false);
    let modulus = Modulus::new(false);

    let spectrum = fft.forward(&input).unwrap();
    let filtered = multiply.apply(&spectrum, &unit_filter(16, 16)).unwrap();
    let back = fft.inverse(&filtered).unwrap();
    let pooled = periodize.apply(&back, 4).unwrap();
    let coefficients = modulus.apply(&pooled).unwrap();

    assert_eq!(coefficients.shape(), &[2, 4, 4, 4, 2]);
    for pair in coefficients.contiguous_slice().unwrap().chunks_exact(2) {
        assert!(pair[0] >= 0.0, "magnitudes are nonnegative");
        assert_eq!(pair[1], 0.0, "modulus leaves zero imaginary parts");
    }
}

#[test]
fn periodizing_a_spectrum_subsamples_the_signal() {
    // Periodization in the frequency domain equals subsampling in the signal
    // domain: ifft(periodize(fft(x), k)) at (i, j) matches x at (k·i, k·j)
    // up to the unnormalized transform scale.
    let input = random_batch(&[1, 1, 8, 8, 2], 3);
    let fft = Spectral2d::new();
    let periodize = Periodize::new(false);

    let spectrum = fft.forward(&input).unwrap();
    let folded = periodize.apply(&spectrum, 2).unwrap();
    let small = fft.inverse(&folded).unwrap();

    // inverse(forward(x)) scales by the *small* grid size 4·4, and the fold
    // itself divides by k² while subsampling keeps unit amplitude, so the
    // net scale is (h/k)·(w/k)·1.
    let scale = (4 * 4) as f32;
    for i in 0..4 {
        for j in 0..4 {
            for part in 0..2 {
                let got = small.data()[[0, 0, i, j, part]] / scale;
                let want = input.data()[[0, 0, 2 * i, 2 * j, part]];
                assert!(
                    (got - want).abs() < 1e-4,
                    "subsample mismatch at ({i},{j},{part})"
                );
            }
        }
    }
}
