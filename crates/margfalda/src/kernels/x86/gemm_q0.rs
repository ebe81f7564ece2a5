//! Register-tiled matrix multiplication over block-quantised operands.
//!
//! The left operand is one of q8_0 / q4_0 / q5_0 / iq4_nl, the right is
//! always q8_0. Each block decodes to 32 signed bytes which feed a
//! 32-lane byte dot product; the result of every block dot is rescaled by
//! the product of the two block deltas. Tiles are distributed flat: each
//! worker claims a contiguous range of tile ids, with no barrier and no
//! shared counter, because block decoding dominates the runtime and
//! imbalance stays small.

#![allow(unsafe_code)]

use std::arch::x86_64::*;

use half::f16;

use super::simd::Accumulate;
use crate::kernels::q_common::{BlockIq4Nl, BlockQ4_0, BlockQ5_0, BlockQ8_0, IQ4NL_QUANTS};

#[inline]
unsafe fn mm256_set_m128i(hi: __m128i, lo: __m128i) -> __m256i {
    unsafe { _mm256_insertf128_si256::<1>(_mm256_castsi128_si256(lo), hi) }
}

#[inline]
unsafe fn madd(a: __m256, b: __m256, c: __m256) -> __m256 {
    unsafe { <__m256 as Accumulate<__m256>>::madd(a, b, c) }
}

#[inline]
unsafe fn hsum(x: __m256) -> f32 {
    unsafe { <__m256 as Accumulate<__m256>>::hsum(x) }
}

/// Unsigned-by-signed 32-lane byte dot product: lane quads of `u`·`s`
/// accumulate into eight i32 partial sums, returned as f32 lanes.
///
/// All tiers produce bit-identical results as long as `u` is
/// non-negative, which callers guarantee by sign-folding the left
/// operand through `sign_epi8` first.
#[cfg(target_feature = "avx2")]
#[inline]
unsafe fn updot(u: __m256i, s: __m256i) -> __m256 {
    unsafe {
        #[cfg(all(target_feature = "avx512vnni", target_feature = "avx512vl"))]
        let sums = _mm256_dpbusd_epi32(_mm256_setzero_si256(), u, s);
        #[cfg(all(
            target_feature = "avxvnni",
            not(all(target_feature = "avx512vnni", target_feature = "avx512vl"))
        ))]
        let sums = _mm256_dpbusd_avx_epi32(_mm256_setzero_si256(), u, s);
        #[cfg(not(any(
            all(target_feature = "avx512vnni", target_feature = "avx512vl"),
            target_feature = "avxvnni"
        )))]
        let sums = _mm256_madd_epi16(_mm256_set1_epi16(1), _mm256_maddubs_epi16(u, s));
        _mm256_cvtepi32_ps(sums)
    }
}

/// Splits 16 packed bytes into 32 nibble lanes: low nibbles in lanes
/// 0..16, high nibbles in lanes 16..32.
#[cfg(target_feature = "avx2")]
#[inline]
unsafe fn denibble(qs: &[u8; 16]) -> __m256i {
    unsafe {
        let x = _mm_loadu_si128(qs.as_ptr() as *const __m128i);
        _mm256_and_si256(
            _mm256_set1_epi8(15),
            mm256_set_m128i(_mm_srli_epi16::<4>(x), x),
        )
    }
}

/// Expands the 32-bit fifth-bit bank to one byte per lane: 0x00 where the
/// bit is set, 0xF0 where it is clear, ready to OR over nibble lanes.
#[cfg(target_feature = "avx2")]
#[inline]
unsafe fn bittobyte(qh: &[u8; 4]) -> __m256i {
    unsafe {
        let x32 = u32::from_le_bytes(*qh);
        let replicated = _mm256_shuffle_epi8(
            _mm256_set1_epi32(x32 as i32),
            _mm256_set_epi64x(
                0x0303030303030303,
                0x0202020202020202,
                0x0101010101010101,
                0x0000000000000000,
            ),
        );
        let bytes = _mm256_cmpeq_epi8(
            _mm256_set1_epi64x(-1),
            _mm256_or_si256(_mm256_set1_epi64x(0x7fbfdfeff7fbfdfe), replicated),
        );
        _mm256_andnot_si256(bytes, _mm256_set1_epi8(0xF0u8 as i8))
    }
}

/// One quantised block viewed as dot-product input: the shared delta and
/// the 32 signed byte lanes, as a full 256-bit group or as two 128-bit
/// halves for targets without 256-bit integer ops.
pub(crate) trait Q0Block: Copy {
    fn delta(&self) -> f16;
    #[cfg(target_feature = "avx2")]
    unsafe fn load(&self) -> __m256i;
    unsafe fn load0(&self) -> __m128i;
    unsafe fn load1(&self) -> __m128i;
}

impl Q0Block for BlockQ8_0 {
    #[inline]
    fn delta(&self) -> f16 {
        self.d
    }

    #[cfg(target_feature = "avx2")]
    #[inline]
    unsafe fn load(&self) -> __m256i {
        unsafe { _mm256_loadu_si256(self.qs.as_ptr() as *const __m256i) }
    }

    #[inline]
    unsafe fn load0(&self) -> __m128i {
        unsafe { _mm_loadu_si128(self.qs.as_ptr() as *const __m128i) }
    }

    #[inline]
    unsafe fn load1(&self) -> __m128i {
        unsafe { _mm_loadu_si128((self.qs.as_ptr() as *const __m128i).add(1)) }
    }
}

impl Q0Block for BlockQ4_0 {
    #[inline]
    fn delta(&self) -> f16 {
        self.d
    }

    #[cfg(target_feature = "avx2")]
    #[inline]
    unsafe fn load(&self) -> __m256i {
        unsafe { _mm256_sub_epi8(denibble(&self.qs), _mm256_set1_epi8(8)) }
    }

    #[inline]
    unsafe fn load0(&self) -> __m128i {
        unsafe {
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            _mm_sub_epi8(_mm_and_si128(_mm_set1_epi8(15), x), _mm_set1_epi8(8))
        }
    }

    #[inline]
    unsafe fn load1(&self) -> __m128i {
        unsafe {
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            _mm_sub_epi8(
                _mm_and_si128(_mm_set1_epi8(15), _mm_srli_epi16::<4>(x)),
                _mm_set1_epi8(8),
            )
        }
    }
}

impl Q0Block for BlockQ5_0 {
    #[inline]
    fn delta(&self) -> f16 {
        self.d
    }

    #[cfg(target_feature = "avx2")]
    #[inline]
    unsafe fn load(&self) -> __m256i {
        unsafe { _mm256_or_si256(denibble(&self.qs), bittobyte(&self.qh)) }
    }

    #[inline]
    unsafe fn load0(&self) -> __m128i {
        unsafe {
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            let x32 = u32::from_le_bytes(self.qh);
            let qxl = _mm_and_si128(_mm_set1_epi8(15), x);
            let bytesl = _mm_cmpeq_epi8(
                _mm_set1_epi64x(-1),
                _mm_or_si128(
                    _mm_set1_epi64x(0x7fbfdfeff7fbfdfe),
                    _mm_shuffle_epi8(
                        _mm_set1_epi32(x32 as i32),
                        _mm_set_epi64x(0x0101010101010101, 0x0000000000000000),
                    ),
                ),
            );
            let bytesl = _mm_andnot_si128(bytesl, _mm_set1_epi8(0xF0u8 as i8));
            _mm_or_si128(qxl, bytesl)
        }
    }

    #[inline]
    unsafe fn load1(&self) -> __m128i {
        unsafe {
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            let x32 = u32::from_le_bytes(self.qh);
            let qxh = _mm_and_si128(_mm_set1_epi8(15), _mm_srli_epi16::<4>(x));
            let bytesh = _mm_cmpeq_epi8(
                _mm_set1_epi64x(-1),
                _mm_or_si128(
                    _mm_set1_epi64x(0x7fbfdfeff7fbfdfe),
                    _mm_shuffle_epi8(
                        _mm_set1_epi32(x32 as i32),
                        _mm_set_epi64x(0x0303030303030303, 0x0202020202020202),
                    ),
                ),
            );
            let bytesh = _mm_andnot_si128(bytesh, _mm_set1_epi8(0xF0u8 as i8));
            _mm_or_si128(qxh, bytesh)
        }
    }
}

impl Q0Block for BlockIq4Nl {
    #[inline]
    fn delta(&self) -> f16 {
        self.d
    }

    #[cfg(target_feature = "avx2")]
    #[inline]
    unsafe fn load(&self) -> __m256i {
        unsafe { mm256_set_m128i(self.load1(), self.load0()) }
    }

    #[inline]
    unsafe fn load0(&self) -> __m128i {
        unsafe {
            let lut = _mm_loadu_si128(IQ4NL_QUANTS.as_ptr() as *const __m128i);
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            _mm_shuffle_epi8(lut, _mm_and_si128(_mm_set1_epi8(15), x))
        }
    }

    #[inline]
    unsafe fn load1(&self) -> __m128i {
        unsafe {
            let lut = _mm_loadu_si128(IQ4NL_QUANTS.as_ptr() as *const __m128i);
            let x = _mm_loadu_si128(self.qs.as_ptr() as *const __m128i);
            _mm_shuffle_epi8(lut, _mm_and_si128(_mm_set1_epi8(15), _mm_srli_epi16::<4>(x)))
        }
    }
}

/// The quantised tile engine. `k`, `lda` and `ldb` count blocks, not
/// scalars.
pub(crate) struct TileEngineQ0<TA: Q0Block, TB: Q0Block> {
    a: *const TA,
    b: *const TB,
    c: *mut f32,
    k: usize,
    lda: usize,
    ldb: usize,
    ldc: usize,
    ith: usize,
    nth: usize,
}

impl<TA: Q0Block, TB: Q0Block> TileEngineQ0<TA, TB> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        k: usize,
        a: *const TA,
        lda: usize,
        b: *const TB,
        ldb: usize,
        c: *mut f32,
        ldc: usize,
        ith: usize,
        nth: usize,
    ) -> Self {
        Self { a, b, c, k, lda, ldb, ldc, ith, nth }
    }

    pub(crate) unsafe fn matmul(&self, m: usize, n: usize) {
        unsafe { self.mnpack(0, m, 0, n) }
    }

    /// Picks the widest tile the remaining region and the register file
    /// admit, covers the divisible sub-rectangle with it, then recurses
    /// on the two remaining strips.
    unsafe fn mnpack(&self, m0: usize, m: usize, n0: usize, n: usize) {
        let mc: usize;
        let nc: usize;
        unsafe {
            match (m - m0).min(4) << 4 | (n - n0).min(4) {
                0x44 => {
                    #[cfg(target_feature = "avx512f")]
                    {
                        mc = 4;
                        nc = 4;
                        self.gemm4xn::<4>(m0, m, n0, n);
                    }
                    #[cfg(not(target_feature = "avx512f"))]
                    {
                        mc = 4;
                        nc = 2;
                        self.gemm4xn::<2>(m0, m, n0, n);
                    }
                }
                0x43 => {
                    #[cfg(target_feature = "avx512f")]
                    {
                        mc = 4;
                        nc = 3;
                        self.gemm4xn::<3>(m0, m, n0, n);
                    }
                    #[cfg(not(target_feature = "avx512f"))]
                    {
                        mc = 4;
                        nc = 2;
                        self.gemm4xn::<2>(m0, m, n0, n);
                    }
                }
                0x42 => {
                    mc = 4;
                    nc = 2;
                    self.gemm4xn::<2>(m0, m, n0, n);
                }
                0x34 => {
                    #[cfg(target_feature = "avx512f")]
                    {
                        mc = 3;
                        nc = 4;
                        self.gemm_mx4::<3>(m0, m, n0, n);
                    }
                    #[cfg(not(target_feature = "avx512f"))]
                    {
                        mc = 2;
                        nc = 4;
                        self.gemm_mx4::<2>(m0, m, n0, n);
                    }
                }
                0x24 => {
                    mc = 2;
                    nc = 4;
                    self.gemm_mx4::<2>(m0, m, n0, n);
                }
                0x33 => {
                    #[cfg(target_feature = "avx512f")]
                    {
                        mc = 3;
                        nc = 3;
                        self.gemm::<3, 3>(m0, m, n0, n);
                    }
                    #[cfg(not(target_feature = "avx512f"))]
                    {
                        mc = 3;
                        nc = 2;
                        self.gemm::<3, 2>(m0, m, n0, n);
                    }
                }
                0x32 => {
                    mc = 3;
                    nc = 2;
                    self.gemm::<3, 2>(m0, m, n0, n);
                }
                0x23 => {
                    mc = 2;
                    nc = 3;
                    self.gemm::<2, 3>(m0, m, n0, n);
                }
                0x41 => {
                    mc = 4;
                    nc = 1;
                    self.gemm4xn::<1>(m0, m, n0, n);
                }
                0x22 => {
                    mc = 2;
                    nc = 2;
                    self.gemm::<2, 2>(m0, m, n0, n);
                }
                0x14 => {
                    mc = 1;
                    nc = 4;
                    self.gemm_mx4::<1>(m0, m, n0, n);
                }
                0x31 => {
                    mc = 3;
                    nc = 1;
                    self.gemm::<3, 1>(m0, m, n0, n);
                }
                0x13 => {
                    mc = 1;
                    nc = 3;
                    self.gemm::<1, 3>(m0, m, n0, n);
                }
                0x21 => {
                    mc = 2;
                    nc = 1;
                    self.gemm::<2, 1>(m0, m, n0, n);
                }
                0x12 => {
                    mc = 1;
                    nc = 2;
                    self.gemm::<1, 2>(m0, m, n0, n);
                }
                0x11 => {
                    mc = 1;
                    nc = 1;
                    self.gemm::<1, 1>(m0, m, n0, n);
                }
                _ => return,
            }
            let mp = m0 + (m - m0) / mc * mc;
            let np = n0 + (n - n0) / nc * nc;
            self.mnpack(mp, m, n0, np);
            self.mnpack(m0, m, np, n);
        }
    }

    /// 4 x RN tiles with the fixed dimension on rows: the four row deltas
    /// are packed into one 64-bit word, converted to f32 lanes in a
    /// single cvtph, and broadcast per lane pair via shuffles.
    #[cfg(all(target_feature = "avx2", target_feature = "f16c"))]
    unsafe fn gemm4xn<const RN: usize>(&self, m0: usize, m: usize, n0: usize, n: usize) {
        let ytiles = (m - m0) / 4;
        let xtiles = (n - n0) / RN;
        let tiles = xtiles * ytiles;
        let duty = (tiles + self.nth - 1) / self.nth;
        let start = duty * self.ith;
        let end = (start + duty).min(tiles);
        unsafe {
            for job in start..end {
                let ii = m0 + job / xtiles * 4;
                let jj = n0 + job % xtiles * RN;
                let mut cv = [[_mm256_setzero_ps(); 4]; RN];
                for l in 0..self.k {
                    let a0 = &*self.a.add(self.lda * ii + l);
                    let a1 = &*self.a.add(self.lda * (ii + 1) + l);
                    let a2 = &*self.a.add(self.lda * (ii + 2) + l);
                    let a3 = &*self.a.add(self.lda * (ii + 3) + l);
                    let packed = (a3.delta().to_bits() as u64) << 48
                        | (a2.delta().to_bits() as u64) << 32
                        | (a1.delta().to_bits() as u64) << 16
                        | a0.delta().to_bits() as u64;
                    let da = _mm_cvtph_ps(_mm_set_epi64x(0, packed as i64));
                    let av0 = a0.load();
                    let av1 = a1.load();
                    let av2 = a2.load();
                    let av3 = a3.load();
                    for (j, cj) in cv.iter_mut().enumerate() {
                        let bj = &*self.b.add(self.ldb * (jj + j) + l);
                        let db = _mm_set1_ps(bj.delta().to_f32());
                        // four delta products, replicated across both
                        // 128-bit halves so shuffles can broadcast them
                        let dv = _mm256_castps128_ps256(_mm_mul_ps(da, db));
                        let dv = _mm256_permute2f128_ps::<0>(dv, dv);
                        let bv = bj.load();
                        cj[0] = madd(
                            _mm256_shuffle_ps::<0>(dv, dv),
                            updot(_mm256_sign_epi8(av0, av0), _mm256_sign_epi8(bv, av0)),
                            cj[0],
                        );
                        cj[1] = madd(
                            _mm256_shuffle_ps::<85>(dv, dv),
                            updot(_mm256_sign_epi8(av1, av1), _mm256_sign_epi8(bv, av1)),
                            cj[1],
                        );
                        cj[2] = madd(
                            _mm256_shuffle_ps::<170>(dv, dv),
                            updot(_mm256_sign_epi8(av2, av2), _mm256_sign_epi8(bv, av2)),
                            cj[2],
                        );
                        cj[3] = madd(
                            _mm256_shuffle_ps::<255>(dv, dv),
                            updot(_mm256_sign_epi8(av3, av3), _mm256_sign_epi8(bv, av3)),
                            cj[3],
                        );
                    }
                }
                for (j, cj) in cv.iter().enumerate() {
                    for (i, &acc) in cj.iter().enumerate() {
                        *self.c.add(self.ldc * (jj + j) + (ii + i)) = hsum(acc);
                    }
                }
            }
        }
    }

    #[cfg(not(all(target_feature = "avx2", target_feature = "f16c")))]
    unsafe fn gemm4xn<const RN: usize>(&self, m0: usize, m: usize, n0: usize, n: usize) {
        unsafe { self.gemm::<4, RN>(m0, m, n0, n) }
    }

    /// RM x 4 tiles with the fixed dimension on columns; mirror image of
    /// [`Self::gemm4xn`] with the delta packing on B.
    #[cfg(all(target_feature = "avx2", target_feature = "f16c"))]
    unsafe fn gemm_mx4<const RM: usize>(&self, m0: usize, m: usize, n0: usize, n: usize) {
        let ytiles = (m - m0) / RM;
        let xtiles = (n - n0) / 4;
        let tiles = xtiles * ytiles;
        let duty = (tiles + self.nth - 1) / self.nth;
        let start = duty * self.ith;
        let end = (start + duty).min(tiles);
        unsafe {
            for job in start..end {
                let ii = m0 + job / xtiles * RM;
                let jj = n0 + job % xtiles * 4;
                let mut cv = [[_mm256_setzero_ps(); RM]; 4];
                for l in 0..self.k {
                    let b0 = &*self.b.add(self.ldb * jj + l);
                    let b1 = &*self.b.add(self.ldb * (jj + 1) + l);
                    let b2 = &*self.b.add(self.ldb * (jj + 2) + l);
                    let b3 = &*self.b.add(self.ldb * (jj + 3) + l);
                    let packed = (b3.delta().to_bits() as u64) << 48
                        | (b2.delta().to_bits() as u64) << 32
                        | (b1.delta().to_bits() as u64) << 16
                        | b0.delta().to_bits() as u64;
                    let db = _mm_cvtph_ps(_mm_set_epi64x(0, packed as i64));
                    let bv0 = b0.load();
                    let bv1 = b1.load();
                    let bv2 = b2.load();
                    let bv3 = b3.load();
                    for i in 0..RM {
                        let ai = &*self.a.add(self.lda * (ii + i) + l);
                        let da = _mm_set1_ps(ai.delta().to_f32());
                        let dv = _mm256_castps128_ps256(_mm_mul_ps(da, db));
                        let dv = _mm256_permute2f128_ps::<0>(dv, dv);
                        let av = ai.load();
                        let folded = _mm256_sign_epi8(av, av);
                        cv[0][i] = madd(
                            _mm256_shuffle_ps::<0>(dv, dv),
                            updot(folded, _mm256_sign_epi8(bv0, av)),
                            cv[0][i],
                        );
                        cv[1][i] = madd(
                            _mm256_shuffle_ps::<85>(dv, dv),
                            updot(folded, _mm256_sign_epi8(bv1, av)),
                            cv[1][i],
                        );
                        cv[2][i] = madd(
                            _mm256_shuffle_ps::<170>(dv, dv),
                            updot(folded, _mm256_sign_epi8(bv2, av)),
                            cv[2][i],
                        );
                        cv[3][i] = madd(
                            _mm256_shuffle_ps::<255>(dv, dv),
                            updot(folded, _mm256_sign_epi8(bv3, av)),
                            cv[3][i],
                        );
                    }
                }
                for (j, cj) in cv.iter().enumerate() {
                    for (i, &acc) in cj.iter().enumerate() {
                        *self.c.add(self.ldc * (jj + j) + (ii + i)) = hsum(acc);
                    }
                }
            }
        }
    }

    #[cfg(not(all(target_feature = "avx2", target_feature = "f16c")))]
    unsafe fn gemm_mx4<const RM: usize>(&self, m0: usize, m: usize, n0: usize, n: usize) {
        unsafe { self.gemm::<RM, 4>(m0, m, n0, n) }
    }

    /// The generic RM x RN tile. On AVX2 the whole block decodes into one
    /// 256-bit group; with only AVX the two 128-bit halves go through
    /// `maddubs` and are recombined.
    unsafe fn gemm<const RM: usize, const RN: usize>(
        &self,
        m0: usize,
        m: usize,
        n0: usize,
        n: usize,
    ) {
        let ytiles = (m - m0) / RM;
        let xtiles = (n - n0) / RN;
        let tiles = xtiles * ytiles;
        let duty = (tiles + self.nth - 1) / self.nth;
        let start = duty * self.ith;
        let end = (start + duty).min(tiles);
        unsafe {
            for job in start..end {
                let ii = m0 + job / xtiles * RM;
                let jj = n0 + job % xtiles * RN;
                let mut cv = [[_mm256_setzero_ps(); RM]; RN];
                for l in 0..self.k {
                    for (j, cj) in cv.iter_mut().enumerate() {
                        let bj = &*self.b.add(self.ldb * (jj + j) + l);
                        for (i, acc) in cj.iter_mut().enumerate() {
                            let ai = &*self.a.add(self.lda * (ii + i) + l);
                            #[cfg(target_feature = "avx2")]
                            let ud = {
                                let av = ai.load();
                                updot(_mm256_sign_epi8(av, av), _mm256_sign_epi8(bj.load(), av))
                            };
                            #[cfg(not(target_feature = "avx2"))]
                            let ud = {
                                let al0 = ai.load0();
                                let al1 = ai.load1();
                                let sep_aa0 = _mm_sign_epi8(al0, al0);
                                let sep_aa1 = _mm_sign_epi8(al1, al1);
                                let sep_ba0 = _mm_sign_epi8(bj.load0(), al0);
                                let sep_ba1 = _mm_sign_epi8(bj.load1(), al1);
                                let ones = _mm_set1_epi16(1);
                                let mad0 =
                                    _mm_madd_epi16(ones, _mm_maddubs_epi16(sep_aa0, sep_ba0));
                                let mad1 =
                                    _mm_madd_epi16(ones, _mm_maddubs_epi16(sep_aa1, sep_ba1));
                                _mm256_cvtepi32_ps(mm256_set_m128i(mad1, mad0))
                            };
                            *acc = madd(
                                _mm256_set1_ps(ai.delta().to_f32() * bj.delta().to_f32()),
                                ud,
                                *acc,
                            );
                        }
                    }
                }
                for (j, cj) in cv.iter().enumerate() {
                    for (i, &acc) in cj.iter().enumerate() {
                        *self.c.add(self.ldc * (jj + j) + (ii + i)) = hsum(acc);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::q_common::QK;
    use crate::kernels::scalar;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    unsafe fn lanes128(v: __m128i) -> [i8; 16] {
        unsafe { std::mem::transmute(v) }
    }

    /// Integer lanes of a block decoded with a unit delta.
    fn reference_lanes(decoded: [f32; QK]) -> [i8; QK] {
        decoded.map(|x| x as i8)
    }

    fn sample_q8(seed: u64) -> BlockQ8_0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut qs = [0i8; QK];
        rng.fill(&mut qs[..]);
        BlockQ8_0 { d: f16::from_f32(1.0), qs }
    }

    fn sample_q4(seed: u64) -> BlockQ4_0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut qs = [0u8; QK / 2];
        rng.fill(&mut qs[..]);
        BlockQ4_0 { d: f16::from_f32(1.0), qs }
    }

    fn sample_q5(seed: u64) -> BlockQ5_0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut qs = [0u8; QK / 2];
        let mut qh = [0u8; 4];
        rng.fill(&mut qs[..]);
        rng.fill(&mut qh[..]);
        BlockQ5_0 { d: f16::from_f32(1.0), qh, qs }
    }

    fn sample_iq4(seed: u64) -> BlockIq4Nl {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut qs = [0u8; QK / 2];
        rng.fill(&mut qs[..]);
        BlockIq4Nl { d: f16::from_f32(1.0), qs }
    }

    fn assert_halves_match(b: &impl Q0Block, expected: [i8; QK], label: &str) {
        let (lo, hi) = unsafe { (lanes128(b.load0()), lanes128(b.load1())) };
        assert_eq!(lo, expected[..QK / 2], "{label}: low half");
        assert_eq!(hi, expected[QK / 2..], "{label}: high half");
    }

    #[test]
    fn half_block_decoders_match_scalar() {
        let q8 = sample_q8(1);
        assert_halves_match(&q8, reference_lanes(scalar::dequantize_q8_0(&q8)), "q8_0");
        let q4 = sample_q4(2);
        assert_halves_match(&q4, reference_lanes(scalar::dequantize_q4_0(&q4)), "q4_0");
        let q5 = sample_q5(3);
        assert_halves_match(&q5, reference_lanes(scalar::dequantize_q5_0(&q5)), "q5_0");
        let iq4 = sample_iq4(4);
        assert_halves_match(&iq4, reference_lanes(scalar::dequantize_iq4_nl(&iq4)), "iq4_nl");
    }

    #[cfg(target_feature = "avx2")]
    #[test]
    fn full_block_decoders_match_scalar() {
        unsafe fn lanes256(v: __m256i) -> [i8; QK] {
            unsafe { std::mem::transmute(v) }
        }
        let q8 = sample_q8(5);
        assert_eq!(
            unsafe { lanes256(q8.load()) },
            reference_lanes(scalar::dequantize_q8_0(&q8))
        );
        let q4 = sample_q4(6);
        assert_eq!(
            unsafe { lanes256(q4.load()) },
            reference_lanes(scalar::dequantize_q4_0(&q4))
        );
        let q5 = sample_q5(7);
        assert_eq!(
            unsafe { lanes256(q5.load()) },
            reference_lanes(scalar::dequantize_q5_0(&q5))
        );
        let iq4 = sample_iq4(8);
        assert_eq!(
            unsafe { lanes256(iq4.load()) },
            reference_lanes(scalar::dequantize_iq4_nl(&iq4))
        );
    }
}
