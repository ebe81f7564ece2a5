//! The vectorised arithmetic vocabulary.
//!
//! Every tile engine is written against these three traits and
//! monomorphised per register width, so kernel bodies contain no runtime
//! dtype or width branches. A missing (vector, element) combination is a
//! compile error at the instantiation site, never a runtime fallback.

#![allow(unsafe_code)]

use std::arch::x86_64::*;

#[cfg(any(target_feature = "avx2", target_feature = "avx512bf16"))]
use half::bf16;
#[cfg(any(target_feature = "avx512f", target_feature = "f16c"))]
use half::f16;

/// Lanewise float arithmetic on one vector register.
#[allow(dead_code)]
pub(crate) trait Arith: Copy {
    unsafe fn add(self, y: Self) -> Self;
    unsafe fn sub(self, y: Self) -> Self;
    unsafe fn mul(self, y: Self) -> Self;
}

/// An accumulator `D` fed by operand vectors `V`: zeroing, fused
/// multiply-add, and the final reduction to one scalar. `madd` uses a
/// fused instruction when the target has one and composes `add(mul(..))`
/// otherwise; `hsum` is only called after the k-reduction is complete.
pub(crate) trait Accumulate<V>: Copy {
    unsafe fn zero() -> Self;
    unsafe fn madd(a: V, b: V, c: Self) -> Self;
    unsafe fn hsum(self) -> f32;
}

/// Typed load of one vector's worth of `T`, widening half-width storage
/// formats into the f32 lane layout of the register.
pub(crate) trait LoadFrom<T>: Copy {
    unsafe fn load(p: *const T) -> Self;
}

// ---------------------------------------------------------------------
// 128-bit lane group (baseline SSE)
// ---------------------------------------------------------------------

impl Arith for __m128 {
    #[inline]
    unsafe fn add(self, y: Self) -> Self {
        unsafe { _mm_add_ps(self, y) }
    }
    #[inline]
    unsafe fn sub(self, y: Self) -> Self {
        unsafe { _mm_sub_ps(self, y) }
    }
    #[inline]
    unsafe fn mul(self, y: Self) -> Self {
        unsafe { _mm_mul_ps(self, y) }
    }
}

impl Accumulate<__m128> for __m128 {
    #[inline]
    unsafe fn zero() -> Self {
        unsafe { _mm_setzero_ps() }
    }

    #[inline]
    unsafe fn madd(a: Self, b: Self, c: Self) -> Self {
        unsafe {
            #[cfg(target_feature = "fma")]
            return _mm_fmadd_ps(a, b, c);
            #[cfg(not(target_feature = "fma"))]
            return c.add(a.mul(b));
        }
    }

    #[inline]
    unsafe fn hsum(self) -> f32 {
        unsafe {
            #[cfg(target_feature = "sse3")]
            let x = {
                let x = _mm_add_ps(self, _mm_movehl_ps(self, self));
                _mm_add_ss(x, _mm_movehdup_ps(x))
            };
            #[cfg(not(target_feature = "sse3"))]
            let x = {
                let t = _mm_shuffle_ps::<0b10_11_00_01>(self, self);
                let x = _mm_add_ps(self, t);
                let t = _mm_movehl_ps(t, x);
                _mm_add_ss(x, t)
            };
            _mm_cvtss_f32(x)
        }
    }
}

impl LoadFrom<f32> for __m128 {
    #[inline]
    unsafe fn load(p: *const f32) -> Self {
        unsafe { _mm_loadu_ps(p) }
    }
}

// ---------------------------------------------------------------------
// 256-bit lane group (AVX)
// ---------------------------------------------------------------------

#[cfg(target_feature = "avx")]
impl Arith for __m256 {
    #[inline]
    unsafe fn add(self, y: Self) -> Self {
        unsafe { _mm256_add_ps(self, y) }
    }
    #[inline]
    unsafe fn sub(self, y: Self) -> Self {
        unsafe { _mm256_sub_ps(self, y) }
    }
    #[inline]
    unsafe fn mul(self, y: Self) -> Self {
        unsafe { _mm256_mul_ps(self, y) }
    }
}

#[cfg(target_feature = "avx")]
impl Accumulate<__m256> for __m256 {
    #[inline]
    unsafe fn zero() -> Self {
        unsafe { _mm256_setzero_ps() }
    }

    #[inline]
    unsafe fn madd(a: Self, b: Self, c: Self) -> Self {
        unsafe {
            #[cfg(target_feature = "fma")]
            return _mm256_fmadd_ps(a, b, c);
            #[cfg(not(target_feature = "fma"))]
            return c.add(a.mul(b));
        }
    }

    #[inline]
    unsafe fn hsum(self) -> f32 {
        unsafe {
            let folded = _mm_add_ps(_mm256_extractf128_ps::<1>(self), _mm256_castps256_ps128(self));
            <__m128 as Accumulate<__m128>>::hsum(folded)
        }
    }
}

#[cfg(target_feature = "avx")]
impl LoadFrom<f32> for __m256 {
    #[inline]
    unsafe fn load(p: *const f32) -> Self {
        unsafe { _mm256_loadu_ps(p) }
    }
}

#[cfg(all(target_feature = "avx", target_feature = "f16c"))]
impl LoadFrom<f16> for __m256 {
    #[inline]
    unsafe fn load(p: *const f16) -> Self {
        unsafe { _mm256_cvtph_ps(_mm_loadu_si128(p as *const __m128i)) }
    }
}

#[cfg(target_feature = "avx2")]
impl LoadFrom<bf16> for __m256 {
    #[inline]
    unsafe fn load(p: *const bf16) -> Self {
        // bf16 is the upper half of an f32: zero-extend and shift into
        // the mantissa position.
        unsafe {
            _mm256_castsi256_ps(_mm256_slli_epi32::<16>(_mm256_cvtepu16_epi32(_mm_loadu_si128(
                p as *const __m128i,
            ))))
        }
    }
}

// ---------------------------------------------------------------------
// 512-bit lane group (AVX-512)
// ---------------------------------------------------------------------

#[cfg(target_feature = "avx512f")]
impl Arith for __m512 {
    #[inline]
    unsafe fn add(self, y: Self) -> Self {
        unsafe { _mm512_add_ps(self, y) }
    }
    #[inline]
    unsafe fn sub(self, y: Self) -> Self {
        unsafe { _mm512_sub_ps(self, y) }
    }
    #[inline]
    unsafe fn mul(self, y: Self) -> Self {
        unsafe { _mm512_mul_ps(self, y) }
    }
}

#[cfg(target_feature = "avx512f")]
impl Accumulate<__m512> for __m512 {
    #[inline]
    unsafe fn zero() -> Self {
        unsafe { _mm512_setzero_ps() }
    }

    #[inline]
    unsafe fn madd(a: Self, b: Self, c: Self) -> Self {
        unsafe {
            #[cfg(target_feature = "fma")]
            return _mm512_fmadd_ps(a, b, c);
            #[cfg(not(target_feature = "fma"))]
            return c.add(a.mul(b));
        }
    }

    #[inline]
    unsafe fn hsum(self) -> f32 {
        unsafe { _mm512_reduce_add_ps(self) }
    }
}

#[cfg(target_feature = "avx512f")]
impl LoadFrom<f32> for __m512 {
    #[inline]
    unsafe fn load(p: *const f32) -> Self {
        unsafe { _mm512_loadu_ps(p) }
    }
}

#[cfg(target_feature = "avx512f")]
impl LoadFrom<f16> for __m512 {
    #[inline]
    unsafe fn load(p: *const f16) -> Self {
        unsafe { _mm512_cvtph_ps(_mm256_loadu_si256(p as *const __m256i)) }
    }
}

#[cfg(target_feature = "avx512f")]
impl LoadFrom<bf16> for __m512 {
    #[inline]
    unsafe fn load(p: *const bf16) -> Self {
        unsafe {
            _mm512_castsi512_ps(_mm512_slli_epi32::<16>(_mm512_cvtepu16_epi32(
                _mm256_loadu_si256(p as *const __m256i),
            )))
        }
    }
}

// ---------------------------------------------------------------------
// Hardware bf16 dot (AVX512-BF16): 32 bf16 lanes feeding an f32
// accumulator without a widening load.
// ---------------------------------------------------------------------

#[cfg(target_feature = "avx512bf16")]
impl Accumulate<__m512bh> for __m512 {
    #[inline]
    unsafe fn zero() -> Self {
        unsafe { _mm512_setzero_ps() }
    }

    #[inline]
    unsafe fn madd(a: __m512bh, b: __m512bh, c: Self) -> Self {
        unsafe { _mm512_dpbf16_ps(c, a, b) }
    }

    #[inline]
    unsafe fn hsum(self) -> f32 {
        unsafe { _mm512_reduce_add_ps(self) }
    }
}

#[cfg(target_feature = "avx512bf16")]
impl LoadFrom<bf16> for __m512bh {
    #[inline]
    unsafe fn load(p: *const bf16) -> Self {
        unsafe { std::mem::transmute(_mm512_loadu_ps(p as *const f32)) }
    }
}
