
pub mod fft;
pub mod filter_mul;
pub mod modulus;
pub mod periodize;
