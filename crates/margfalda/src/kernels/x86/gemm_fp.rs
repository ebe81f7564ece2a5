//! Register-tiled floating-point matrix multiplication.
//!
//! One engine instantiation binds a vector width `KN`, an operand vector
//! type `V`, an accumulator type `D` and the two element types; the
//! dispatcher in `ops` picks the instantiation for the compiled target.
//! Work is split two ways: `m` into row-tiles of `RM * BM` rows and `n`
//! into coarse column stripes, with a shared atomic counter balancing the
//! tail across workers.

#![allow(unsafe_code)]

use std::marker::PhantomData;

use super::simd::{Accumulate, LoadFrom};
use super::VECTOR_REGISTERS;
use crate::params::{MatmulParams, Threadpool};

/// Splits `n` into equal blocks no wider than `bloc` and returns the
/// width of the widest block.
fn block_size(n: usize, bloc: usize) -> usize {
    let nb = (n + bloc - 1) / bloc;
    if n % nb == 0 {
        n / nb
    } else {
        n / nb + 1
    }
}

/// Start position of block `ib` when the first `ibn` blocks are one wider
/// than the rest.
fn bloc_pos(ib: usize, ibn: usize, bloc_size: usize) -> usize {
    if ib < ibn {
        ib * bloc_size
    } else {
        ibn * bloc_size + (ib - ibn) * (bloc_size - 1)
    }
}

/// The floating-point tile engine. Immutable for the duration of one
/// dispatcher call; every worker builds its own on the stack.
pub(crate) struct TileEngineFp<'a, P: Threadpool, V, D, TA, TB, const KN: usize> {
    params: &'a MatmulParams<'a, P>,
    a: *const TA,
    b: *const TB,
    c: *mut f32,
    k: usize,
    lda: usize,
    ldb: usize,
    ldc: usize,
    _vec: PhantomData<(V, D)>,
}

impl<'a, P, V, D, TA, TB, const KN: usize> TileEngineFp<'a, P, V, D, TA, TB, KN>
where
    P: Threadpool,
    V: Copy + LoadFrom<TA> + LoadFrom<TB>,
    D: Accumulate<V>,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        params: &'a MatmulParams<'a, P>,
        k: usize,
        a: *const TA,
        lda: usize,
        b: *const TB,
        ldb: usize,
        c: *mut f32,
        ldc: usize,
    ) -> Self {
        Self { params, a, b, c, k, lda, ldb, ldc, _vec: PhantomData }
    }

    /// Runs the multiplication if a register tiling exists for `m`.
    /// Returns false (touching nothing) when `k` is not a whole number of
    /// vectors or `m` is not a multiple of the smallest row tile.
    pub(crate) unsafe fn matmul(&self, m: usize, n: usize) -> bool {
        if self.k % KN != 0 {
            return false;
        }
        unsafe {
            if VECTOR_REGISTERS == 32 {
                if m % 16 == 0 && m / 16 >= self.params.nth {
                    self.mnpack::<4>(m, n, block_size(n, 6), 12);
                    return true;
                }
                if m % 8 == 0 {
                    self.mnpack::<2>(m, n, block_size(n, 6), 12);
                    return true;
                }
                if m % 4 == 0 {
                    self.mnpack::<1>(m, n, block_size(n, 6), 12);
                    return true;
                }
            } else {
                if m % 16 == 0 && m / 16 >= self.params.nth {
                    self.mnpack::<4>(m, n, block_size(n, 3), 24);
                    return true;
                }
                if m % 8 == 0 {
                    self.mnpack::<2>(m, n, block_size(n, 3), 24);
                    return true;
                }
                if m % 4 == 0 {
                    self.mnpack::<1>(m, n, block_size(n, 3), 24);
                    return true;
                }
            }
        }
        false
    }

    /// Monomorphises the column tile width chosen by [`block_size`].
    unsafe fn mnpack<const BM: usize>(&self, m: usize, n: usize, size_n: usize, bn: usize) {
        unsafe {
            match size_n {
                1 => self.gemm::<4, 1, BM>(m, n, bn),
                2 => self.gemm::<4, 2, BM>(m, n, bn),
                3 => self.gemm::<4, 3, BM>(m, n, bn),
                4 => self.gemm::<4, 4, BM>(m, n, bn),
                5 => self.gemm::<4, 5, BM>(m, n, bn),
                6 => self.gemm::<4, 6, BM>(m, n, bn),
                _ => {
                    log::error!("no register tiling for column width {size_n}");
                    unreachable!("column tile width {size_n}");
                }
            }
        }
    }

    unsafe fn gemm<const RM: usize, const RN: usize, const BM: usize>(
        &self,
        m: usize,
        n: usize,
        bn: usize,
    ) {
        assert!(m % (RM * BM) == 0);
        let ytiles = m / (RM * BM);
        let xtiles = (n + RN - 1) / RN;
        // the first jj_rn tiles are RN wide, the rest RN - 1
        let jj_rn = xtiles - (xtiles * RN - n);

        // group the tiles into stripes of roughly bn tiles for cache
        // reuse on A; the first jj_bn stripes are one tile wider
        let nb_bn = if xtiles < bn { 1 } else { (xtiles + bn / 2) / bn };
        let size_bn = if xtiles % nb_bn == 0 { xtiles / nb_bn } else { xtiles / nb_bn + 1 };
        let jj_bn = nb_bn - (nb_bn * size_bn - xtiles);
        let nb_job = ytiles * nb_bn;

        if self.params.ith == 0 {
            assert!(jj_bn * size_bn + (nb_bn - jj_bn) * (size_bn - 1) == xtiles);
            // every worker starts on its own ith, so the first unclaimed
            // job id is nth; seeding the counter there skips a round of
            // fetch-adds
            self.params.pool.chunk_set(self.params.nth);
        }
        self.params.pool.barrier();

        let mut job = self.params.ith;
        while job < nb_job {
            let ii = job % ytiles * (RM * BM);
            let jb = job / ytiles;
            let jr0 = bloc_pos(jb, jj_bn, size_bn);
            let jr1 = bloc_pos(jb + 1, jj_bn, size_bn);
            let jj0 = bloc_pos(jr0, jj_rn, RN);
            let jj2 = bloc_pos(jr1, jj_rn, RN);
            let jj1 = jj2.min(jj_rn * RN);

            for bi in (0..BM * RM).step_by(RM) {
                let mut jj = jj0;
                while jj < jj1 {
                    unsafe { self.gemm_bloc::<RM, RN>(ii + bi, jj) };
                    jj += RN;
                }
                if RN > 1 {
                    while jj < jj2 {
                        unsafe { self.gemm_bloc_narrow::<RM>(RN - 1, ii + bi, jj) };
                        jj += RN - 1;
                    }
                }
                debug_assert!(jj == jj2);
            }

            job = self.params.pool.chunk_add(1);
        }
        self.params.pool.barrier();
    }

    /// Tail tiles are one column narrower than the stripe's tile width;
    /// re-monomorphise for them.
    unsafe fn gemm_bloc_narrow<const RM: usize>(&self, rn: usize, ii: usize, jj: usize) {
        unsafe {
            match rn {
                1 => self.gemm_bloc::<RM, 1>(ii, jj),
                2 => self.gemm_bloc::<RM, 2>(ii, jj),
                3 => self.gemm_bloc::<RM, 3>(ii, jj),
                4 => self.gemm_bloc::<RM, 4>(ii, jj),
                5 => self.gemm_bloc::<RM, 5>(ii, jj),
                _ => unreachable!("narrow tile width {rn}"),
            }
        }
    }

    /// Computes one RM x RN tile: a strict left-to-right reduction
    /// over k, one accumulator register per output cell.
    unsafe fn gemm_bloc<const RM: usize, const RN: usize>(&self, ii: usize, jj: usize) {
        let mut cv = unsafe { [[D::zero(); RM]; RN] };
        let mut l = 0;
        while l < self.k {
            // keep the narrower side of the tile resident in registers
            // and stream the wider side through a single vector
            if RM <= RN {
                let av: [V; RM] = std::array::from_fn(|i| unsafe {
                    <V as LoadFrom<TA>>::load(self.a.add(self.lda * (ii + i) + l))
                });
                for (j, cj) in cv.iter_mut().enumerate() {
                    let bv = unsafe { <V as LoadFrom<TB>>::load(self.b.add(self.ldb * (jj + j) + l)) };
                    for i in 0..RM {
                        cj[i] = unsafe { D::madd(av[i], bv, cj[i]) };
                    }
                }
            } else {
                let bv: [V; RN] = std::array::from_fn(|j| unsafe {
                    <V as LoadFrom<TB>>::load(self.b.add(self.ldb * (jj + j) + l))
                });
                for i in 0..RM {
                    let av = unsafe { <V as LoadFrom<TA>>::load(self.a.add(self.lda * (ii + i) + l)) };
                    for (j, cj) in cv.iter_mut().enumerate() {
                        cj[i] = unsafe { D::madd(av, bv[j], cj[i]) };
                    }
                }
            }
            l += KN;
        }
        for (j, cj) in cv.iter().enumerate() {
            for (i, &acc) in cj.iter().enumerate() {
                unsafe {
                    *self.c.add(self.ldc * (jj + j) + (ii + i)) = acc.hsum();
                }
            }
        }
    }
}
