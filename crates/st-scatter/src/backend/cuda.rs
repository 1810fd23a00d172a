// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/st-scatter/src/backend/cuda.rs

//! CUDA fast paths for the scattering primitives.
//!
//! Kernels are compiled on first use through NVRTC from the `.cu` templates
//! next to this file, cached per (name, device, substituted source) in a
//! [`KernelCache`], and launched on the bound device's stream. The
//! device-resident `*_dev` entry points return as soon as the work is issued;
//! only the host convenience wrappers synchronize, in their final copy back
//! to host memory. Pipelines built from `*_dev` calls therefore execute in
//! issue order on the stream with no intermediate blocking.
//!
//! The pointwise filter multiply delegates to the cuBLAS diagonal-multiply
//! primitive instead of a hand-written kernel; the handle is created against
//! the same device so its work lands on the same stream.

#![cfg(feature = "cuda")]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cudarc::cublas::{sys, CudaBlas};
use cudarc::driver::{
    CudaDevice, CudaFunction, CudaSlice, DevicePtr, DevicePtrMut, DeviceRepr, LaunchAsync,
    LaunchConfig, ValidAsZeroBits,
};
use cudarc::nvrtc::compile_ptx;
use once_cell::sync::OnceCell;

use crate::backend::kernel_cache::{render_source, KernelCache, KernelKey};
use crate::dtype::Scalar;
use crate::error::{compile, device as device_err, shape, Result};
use crate::tensor::ComplexTensor;

const PERIODIZE_KERNEL: &str = "periodize";
const PERIODIZE_TEMPLATE: &str = include_str!("cuda_periodize.cu");
const MODULUS_KERNEL: &str = "abs_complex_value";
const MODULUS_TEMPLATE: &str = include_str!("cuda_modulus.cu");

const PERIODIZE_BLOCK: (u32, u32, u32) = (32, 32, 1);
const MODULUS_THREADS: u32 = 1024;

/// Device-side face of a [`Scalar`]: the names substituted into kernel
/// source plus the cuBLAS diagonal-multiply entry point for this precision.
pub trait KernelScalar: DeviceRepr + ValidAsZeroBits + Unpin {
    /// Scalar type name in kernel source (`float` / `double`).
    const CUDA_REAL: &'static str;
    /// Euclidean-norm device function for this precision.
    const CUDA_NORM: &'static str;

    /// `C = diag(x) · A` on interleaved complex buffers, side = left.
    ///
    /// # Safety
    /// All pointers must be valid device pointers on the device owning
    /// `handle`, with `a`/`c` holding `m × n` and `x` holding `m` complex
    /// elements. `c` may alias `a` for in-place operation.
    unsafe fn dgmm_left(
        handle: sys::cublasHandle_t,
        m: i32,
        n: i32,
        a: u64,
        lda: i32,
        x: u64,
        incx: i32,
        c: u64,
        ldc: i32,
    ) -> sys::cublasStatus_t;
}

impl KernelScalar for f32 {
    const CUDA_REAL: &'static str = "float";
    const CUDA_NORM: &'static str = "normf";

    unsafe fn dgmm_left(
        handle: sys::cublasHandle_t,
        m: i32,
        n: i32,
        a: u64,
        lda: i32,
        x: u64,
        incx: i32,
        c: u64,
        ldc: i32,
    ) -> sys::cublasStatus_t {
        sys::cublasCdgmm(
            handle,
            sys::cublasSideMode_t::CUBLAS_SIDE_LEFT,
            m,
            n,
            a as *const sys::cuComplex,
            lda,
            x as *const sys::cuComplex,
            incx,
            c as *mut sys::cuComplex,
            ldc,
        )
    }
}

impl KernelScalar for f64 {
    const CUDA_REAL: &'static str = "double";
    const CUDA_NORM: &'static str = "norm";

    unsafe fn dgmm_left(
        handle: sys::cublasHandle_t,
        m: i32,
        n: i32,
        a: u64,
        lda: i32,
        x: u64,
        incx: i32,
        c: u64,
        ldc: i32,
    ) -> sys::cublasStatus_t {
        sys::cublasZdgmm(
            handle,
            sys::cublasSideMode_t::CUBLAS_SIDE_LEFT,
            m,
            n,
            a as *const sys::cuDoubleComplex,
            lda,
            x as *const sys::cuDoubleComplex,
            incx,
            c as *mut sys::cuDoubleComplex,
            ldc,
        )
    }
}

/// Device-resident interleaved complex tensor.
pub struct CudaComplexTensor<T: Scalar> {
    data: CudaSlice<T>,
    shape: Vec<usize>,
}

impl<T: Scalar> CudaComplexTensor<T> {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[self.shape.len() - 3]
    }

    pub fn width(&self) -> usize {
        self.shape[self.shape.len() - 2]
    }

    pub fn batch_len(&self) -> usize {
        self.shape[..self.shape.len() - 3].iter().product()
    }

    pub fn complex_len(&self) -> usize {
        self.data.len() / 2
    }
}

/// Process-wide scattering context for device 0.
static RUNTIME: OnceCell<CudaScattering> = OnceCell::new();

/// Shared context on the default device. Absence of a usable device surfaces
/// as `Error::Device`, which operator dispatch downgrades to the portable
/// path.
pub fn runtime() -> Result<&'static CudaScattering> {
    RUNTIME.get_or_try_init(CudaScattering::new)
}

/// CUDA device context: driver handle, JIT kernel cache and cuBLAS handle.
pub struct CudaScattering {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
    kernels: KernelCache<CudaFunction>,
}

impl CudaScattering {
    pub fn new() -> Result<Self> {
        Self::with_device(0)
    }

    pub fn with_device(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(|err| device_err(&err.to_string()))?;
        let blas = CudaBlas::new(device.clone()).map_err(|err| device_err(&err.to_string()))?;
        tracing::debug!(ordinal, "cuda scattering context ready");
        Ok(Self { device, blas, kernels: KernelCache::new() })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Distinct kernels compiled so far on this context.
    pub fn compiled_kernels(&self) -> usize {
        self.kernels.len()
    }

    /// Copy a host tensor to the device, making it contiguous first.
    pub fn upload<T: Scalar>(&self, host: &ComplexTensor<T>) -> Result<CudaComplexTensor<T>> {
        let owned = host.standard_owned();
        let slice = owned
            .as_slice()
            .ok_or_else(|| crate::error::layout("tensor could not be made contiguous"))?;
        let data = self
            .device
            .htod_sync_copy(slice)
            .map_err(|err| device_err(&err.to_string()))?;
        Ok(CudaComplexTensor { data, shape: host.shape().to_vec() })
    }

    /// Copy a device tensor back to the host. This synchronizes the stream.
    pub fn download<T: Scalar>(&self, tensor: &CudaComplexTensor<T>) -> Result<ComplexTensor<T>> {
        let host = self
            .device
            .dtoh_sync_copy(&tensor.data)
            .map_err(|err| device_err(&err.to_string()))?;
        ComplexTensor::from_shape_vec(&tensor.shape, host)
    }

    /// Host wrapper: upload, periodize on-device, download.
    pub fn periodize<T: Scalar>(
        &self,
        input: &ComplexTensor<T>,
        factor: usize,
    ) -> Result<ComplexTensor<T>> {
        let dev_in = self.upload(input)?;
        let dev_out = self.periodize_dev(&dev_in, factor)?;
        self.download(&dev_out)
    }

    /// Issue the periodization kernel; returns once the launch is queued.
    pub fn periodize_dev<T: Scalar>(
        &self,
        input: &CudaComplexTensor<T>,
        factor: usize,
    ) -> Result<CudaComplexTensor<T>> {
        let (b, h, w) = (input.batch_len(), input.height(), input.width());
        if factor == 0 || h % factor != 0 || w % factor != 0 {
            return Err(shape(&format!(
                "downsampling factor {factor} must divide both spatial extents ({h}, {w})"
            )));
        }
        let (oh, ow) = (h / factor, w / factor);

        let func = self.kernel(
            PERIODIZE_KERNEL,
            PERIODIZE_TEMPLATE,
            &[
                ("B", b.to_string()),
                ("H", h.to_string()),
                ("W", w.to_string()),
                ("k", factor.to_string()),
                ("Dtype", T::CUDA_REAL.to_string()),
            ],
        )?;

        let mut out = self
            .device
            .alloc_zeros::<T>(b * oh * ow * 2)
            .map_err(|err| device_err(&err.to_string()))?;
        let cfg = LaunchConfig {
            grid_dim: (
                ceil_div(ow as u32, PERIODIZE_BLOCK.0),
                ceil_div(oh as u32, PERIODIZE_BLOCK.1),
                ceil_div(b as u32, PERIODIZE_BLOCK.2),
            ),
            block_dim: PERIODIZE_BLOCK,
            shared_mem_bytes: 0,
        };
        unsafe { func.as_ref().clone().launch(cfg, (&input.data, &mut out)) }
            .map_err(|err| device_err(&err.to_string()))?;

        let mut out_shape = input.shape.clone();
        let n = out_shape.len();
        out_shape[n - 3] = oh;
        out_shape[n - 2] = ow;
        Ok(CudaComplexTensor { data: out, shape: out_shape })
    }

    /// Host wrapper: upload, modulus on-device, download.
    pub fn modulus<T: Scalar>(&self, input: &ComplexTensor<T>) -> Result<ComplexTensor<T>> {
        let dev_in = self.upload(input)?;
        let dev_out = self.modulus_dev(&dev_in)?;
        self.download(&dev_out)
    }

    /// Issue the modulus kernel; returns once the launch is queued.
    pub fn modulus_dev<T: Scalar>(
        &self,
        input: &CudaComplexTensor<T>,
    ) -> Result<CudaComplexTensor<T>> {
        let n = input.complex_len();
        let func = self.kernel(
            MODULUS_KERNEL,
            MODULUS_TEMPLATE,
            &[
                ("Dtype", T::CUDA_REAL.to_string()),
                ("Norm", T::CUDA_NORM.to_string()),
            ],
        )?;

        let mut out = self
            .device
            .alloc_zeros::<T>(input.data.len())
            .map_err(|err| device_err(&err.to_string()))?;
        let cfg = LaunchConfig {
            grid_dim: (ceil_div(n as u32, MODULUS_THREADS), 1, 1),
            block_dim: (MODULUS_THREADS, 1, 1),
            shared_mem_bytes: 0,
        };
        unsafe { func.as_ref().clone().launch(cfg, (&input.data, &mut out, n as i32)) }
            .map_err(|err| device_err(&err.to_string()))?;

        Ok(CudaComplexTensor { data: out, shape: input.shape.clone() })
    }

    /// Host wrapper: upload both operands, multiply on-device, download.
    pub fn filter_multiply<T: Scalar>(
        &self,
        batch: &ComplexTensor<T>,
        filter: &ComplexTensor<T>,
    ) -> Result<ComplexTensor<T>> {
        let dev_batch = self.upload(batch)?;
        let dev_filter = self.upload(filter)?;
        let dev_out = self.filter_multiply_dev(&dev_batch, &dev_filter)?;
        self.download(&dev_out)
    }

    /// Issue the diagonal multiply into a fresh output buffer.
    pub fn filter_multiply_dev<T: Scalar>(
        &self,
        batch: &CudaComplexTensor<T>,
        filter: &CudaComplexTensor<T>,
    ) -> Result<CudaComplexTensor<T>> {
        let (m, n) = dgmm_extents(batch, filter)?;
        let mut out = self
            .device
            .alloc_zeros::<T>(batch.data.len())
            .map_err(|err| device_err(&err.to_string()))?;
        let status = unsafe {
            T::dgmm_left(
                *self.blas.handle(),
                m,
                n,
                *batch.data.device_ptr(),
                m,
                *filter.data.device_ptr(),
                1,
                *out.device_ptr_mut(),
                m,
            )
        };
        check_cublas(status)?;
        Ok(CudaComplexTensor { data: out, shape: batch.shape.clone() })
    }

    /// Issue the diagonal multiply writing back into the batch buffer.
    pub fn filter_multiply_dev_inplace<T: Scalar>(
        &self,
        batch: &mut CudaComplexTensor<T>,
        filter: &CudaComplexTensor<T>,
    ) -> Result<()> {
        let (m, n) = dgmm_extents(batch, filter)?;
        let ptr = *batch.data.device_ptr_mut();
        let status = unsafe {
            T::dgmm_left(
                *self.blas.handle(),
                m,
                n,
                ptr,
                m,
                *filter.data.device_ptr(),
                1,
                ptr,
                m,
            )
        };
        check_cublas(status)
    }

    /// Render, then compile at most once per (name, device, source).
    fn kernel(
        &self,
        name: &'static str,
        template: &str,
        params: &[(&str, String)],
    ) -> Result<Arc<CudaFunction>> {
        let source = render_source(template, params)?;
        let key = KernelKey::new(name, self.device.ordinal(), source);
        let device = Arc::clone(&self.device);
        self.kernels.get_or_compile(key, move |key| {
            let ptx = compile_ptx(&key.source).map_err(|err| {
                compile(&format!("nvrtc rejected kernel `{}`: {err}", key.name))
            })?;
            let module = format!("{}_{:016x}", key.name, source_hash(&key.source));
            device
                .load_ptx(ptx, &module, &[key.name])
                .map_err(|err| device_err(&err.to_string()))?;
            device.get_func(&module, key.name).ok_or_else(|| {
                compile(&format!("kernel `{}` missing after module load", key.name))
            })
        })
    }
}

fn dgmm_extents<T: Scalar>(
    batch: &CudaComplexTensor<T>,
    filter: &CudaComplexTensor<T>,
) -> Result<(i32, i32)> {
    if filter.shape.len() != 3 {
        return Err(shape(&format!(
            "filter must be a plain complex map of rank 3 (got rank {})",
            filter.shape.len()
        )));
    }
    let trailing = &batch.shape[batch.shape.len() - 3..];
    if trailing != filter.shape() {
        return Err(shape(&format!(
            "filter shape {:?} does not match batch trailing axes {trailing:?}",
            filter.shape()
        )));
    }
    let m = filter.complex_len();
    Ok((m as i32, (batch.complex_len() / m) as i32))
}

fn check_cublas(status: sys::cublasStatus_t) -> Result<()> {
    if status == sys::cublasStatus_t::CUBLAS_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(device_err(&format!("cublas dgmm failed: {status:?}")))
    }
}

fn ceil_div(value: u32, block: u32) -> u32 {
    value.div_ceil(block).max(1)
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}
