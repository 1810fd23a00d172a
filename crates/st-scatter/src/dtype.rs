
use num_traits::Float;
use rustfft::FftNum;

/// Scalar precisions accepted by the scattering operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType { F32, F64 }

impl DType {
    /// Name of the scalar type in generated kernel source.
    pub fn kernel_name(self) -> &'static str {
        match self { DType::F32 => "float", DType::F64 => "double" }
    }
}

/// Real scalar driving every operator in this crate. Implemented for `f32`
/// and `f64` only; the associated tag selects the scalar names substituted
/// into kernel source. With the `cuda` feature enabled the
/// [`KernelScalar`](crate::backend::KernelScalar) supertrait additionally
/// binds the device representation and the cuBLAS diagonal-multiply entry
/// point for the same scalar.
pub trait Scalar: Float + FftNum + crate::backend::KernelScalar {
    const DTYPE: DType;
}

impl Scalar for f32 { const DTYPE: DType = DType::F32; }
impl Scalar for f64 { const DTYPE: DType = DType::F64; }
