//! The public matrix multiplication entry point.
//!
//! This is the single seam between the host and the kernel zone: it
//! validates shapes, pairs the dtype tags with the engines compiled for
//! the target, and reports through its return value whether a handwritten
//! kernel serviced the request.

use crate::dtype::DType;
use crate::params::{MatmulParams, Threadpool};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "x86_64")]
use crate::kernels::x86::gemm_fp::TileEngineFp;

#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
use crate::kernels::q_common::{BlockIq4Nl, BlockQ4_0, BlockQ5_0, BlockQ8_0, QK};
#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
use crate::kernels::x86::gemm_q0::TileEngineQ0;

#[cfg(all(
    target_arch = "x86_64",
    any(
        target_feature = "avx512f",
        all(target_feature = "avx", target_feature = "f16c")
    )
))]
use half::f16;

#[cfg(all(
    target_arch = "x86_64",
    any(target_feature = "avx512f", target_feature = "avx2")
))]
use half::bf16;

/// Multithreaded matrix multiplication `C = Aᵀ · B`, column major.
///
/// `A` is `m` rows of `k` elements with row stride `lda`; `B` is `n` rows
/// of `k` elements with row stride `ldb`; `C` receives `m * n` f32 results
/// at `c + ldc*j + i`. For quantised dtypes the rows are arrays of blocks
/// and `lda`/`ldb` count blocks. All `nth` workers of the host pool must
/// enter with identical arguments except `params.ith`.
///
/// Despite the name this is not a general GEMM: work happens only when a
/// handwritten kernel matches the dtype triple, the compiled instruction
/// set, and the shape. A `false` return means the caller must run its
/// generic fallback; `C` has not been touched. `true` means `C` is fully
/// written.
///
/// # Safety
///
/// `a`, `b` and `c` must be valid, non-aliasing buffers of the tagged
/// element types covering the indexed extent, `a` and `b` immutable and
/// `c` exclusive-write for the duration of the call across all workers.
/// `params.ith` must be unique per worker and every worker must use the
/// same pool.
#[allow(clippy::too_many_arguments)]
pub unsafe fn matmul<P: Threadpool>(
    params: &MatmulParams<'_, P>,
    m: usize,
    n: usize,
    k: usize,
    a: *const u8,
    lda: usize,
    b: *const u8,
    ldb: usize,
    c: *mut f32,
    ldc: usize,
    atype: DType,
    btype: DType,
    ctype: DType,
) -> bool {
    debug_assert!(params.nth > 0);
    debug_assert!(params.ith < params.nth);
    debug_assert!(ldc >= m);

    #[cfg(not(target_arch = "x86_64"))]
    let _ = (m, k, a, lda, b, ldb, c, ldc);

    // matrix-vector shapes are left to the caller's gemv fallback
    if n < 2 {
        return false;
    }
    if ctype != DType::F32 {
        return false;
    }

    match atype {
        DType::F32 => {
            if btype != DType::F32 {
                return false;
            }
            debug_assert!(lda >= k && ldb >= k);
            #[cfg(all(target_arch = "x86_64", target_feature = "avx512f"))]
            let serviced = unsafe {
                TileEngineFp::<_, __m512, __m512, f32, f32, 16>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(all(
                target_arch = "x86_64",
                target_feature = "avx",
                not(target_feature = "avx512f")
            ))]
            let serviced = unsafe {
                TileEngineFp::<_, __m256, __m256, f32, f32, 8>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(all(target_arch = "x86_64", not(target_feature = "avx")))]
            let serviced = unsafe {
                TileEngineFp::<_, __m128, __m128, f32, f32, 4>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(not(target_arch = "x86_64"))]
            let serviced = false;
            serviced
        }

        DType::BF16 => {
            if btype != DType::BF16 {
                return false;
            }
            debug_assert!(lda >= k && ldb >= k);
            #[cfg(all(target_arch = "x86_64", target_feature = "avx512bf16"))]
            let serviced = unsafe {
                TileEngineFp::<_, __m512bh, __m512, bf16, bf16, 32>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(all(
                target_arch = "x86_64",
                target_feature = "avx512f",
                not(target_feature = "avx512bf16")
            ))]
            let serviced = unsafe {
                TileEngineFp::<_, __m512, __m512, bf16, bf16, 16>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(all(
                target_arch = "x86_64",
                target_feature = "avx2",
                not(target_feature = "avx512f")
            ))]
            let serviced = unsafe {
                TileEngineFp::<_, __m256, __m256, bf16, bf16, 8>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(not(all(
                target_arch = "x86_64",
                any(
                    target_feature = "avx512bf16",
                    target_feature = "avx512f",
                    target_feature = "avx2"
                )
            )))]
            let serviced = false;
            serviced
        }

        DType::F16 => {
            if btype != DType::F16 {
                return false;
            }
            debug_assert!(lda >= k && ldb >= k);
            #[cfg(all(target_arch = "x86_64", target_feature = "avx512f"))]
            let serviced = unsafe {
                TileEngineFp::<_, __m512, __m512, f16, f16, 16>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(all(
                target_arch = "x86_64",
                target_feature = "avx",
                target_feature = "f16c",
                not(target_feature = "avx512f")
            ))]
            let serviced = unsafe {
                TileEngineFp::<_, __m256, __m256, f16, f16, 8>::new(
                    params,
                    k,
                    a.cast(),
                    lda,
                    b.cast(),
                    ldb,
                    c,
                    ldc,
                )
                .matmul(m, n)
            };
            #[cfg(not(all(
                target_arch = "x86_64",
                any(
                    target_feature = "avx512f",
                    all(target_feature = "avx", target_feature = "f16c")
                )
            )))]
            let serviced = false;
            serviced
        }

        DType::Q8_0 => {
            if btype != DType::Q8_0 {
                return false;
            }
            #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
            let serviced =
                unsafe { quantized::<BlockQ8_0, P>(params, m, n, k, a, lda, b, ldb, c, ldc) };
            #[cfg(not(all(target_arch = "x86_64", target_feature = "avx")))]
            let serviced = false;
            serviced
        }

        DType::Q4_0 => {
            if btype != DType::Q8_0 {
                return false;
            }
            #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
            let serviced =
                unsafe { quantized::<BlockQ4_0, P>(params, m, n, k, a, lda, b, ldb, c, ldc) };
            #[cfg(not(all(target_arch = "x86_64", target_feature = "avx")))]
            let serviced = false;
            serviced
        }

        DType::Q5_0 => {
            if btype != DType::Q8_0 {
                return false;
            }
            #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
            let serviced =
                unsafe { quantized::<BlockQ5_0, P>(params, m, n, k, a, lda, b, ldb, c, ldc) };
            #[cfg(not(all(target_arch = "x86_64", target_feature = "avx")))]
            let serviced = false;
            serviced
        }

        DType::Iq4Nl => {
            if btype != DType::Q8_0 {
                return false;
            }
            #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
            let serviced =
                unsafe { quantized::<BlockIq4Nl, P>(params, m, n, k, a, lda, b, ldb, c, ldc) };
            #[cfg(not(all(target_arch = "x86_64", target_feature = "avx")))]
            let serviced = false;
            serviced
        }
    }
}

/// Shared tail of the four quantised dispatch arms: block-count
/// conversion plus engine instantiation against a q8_0 right operand.
#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
#[allow(clippy::too_many_arguments)]
unsafe fn quantized<TA, P>(
    params: &MatmulParams<'_, P>,
    m: usize,
    n: usize,
    k: usize,
    a: *const u8,
    lda: usize,
    b: *const u8,
    ldb: usize,
    c: *mut f32,
    ldc: usize,
) -> bool
where
    TA: crate::kernels::x86::gemm_q0::Q0Block,
    P: Threadpool,
{
    if k % QK != 0 {
        return false;
    }
    let kb = k / QK;
    debug_assert!(lda >= kb && ldb >= kb);
    unsafe {
        TileEngineQ0::<TA, BlockQ8_0>::new(
            kb,
            a.cast(),
            lda,
            b.cast(),
            ldb,
            c,
            ldc,
            params.ith,
            params.nth,
        )
        .matmul(m, n);
    }
    true
}
