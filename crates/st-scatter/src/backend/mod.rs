
pub mod kernel_cache;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "cuda")]
pub use cuda::KernelScalar;

/// Device-side requirements attached to every [`Scalar`](crate::dtype::Scalar).
/// Without the `cuda` feature there is nothing to require.
#[cfg(not(feature = "cuda"))]
pub trait KernelScalar {}
#[cfg(not(feature = "cuda"))]
impl KernelScalar for f32 {}
#[cfg(not(feature = "cuda"))]
impl KernelScalar for f64 {}
