//! Generic source transposition: `[iw][16] -> [16][tr_iw]`.
//!
//! One call transposes a row of `iw` spatial positions of a 16-channel block
//! into 16 channel rows of pitch `tr_iw`, with `l_pad` zero columns before
//! the data and `r_pad = tr_iw - iw - l_pad` after it. The row is processed
//! in tiles of 16 spatial positions; the last tile may be partial, in which
//! case its loads and stores are limited to the valid positions.
//!
//! # Buffer extents
//! - `src`: `iw * 16` elements, read.
//! - `tr_src`: `16 * tr_iw` elements, every one written.

use std::marker::PhantomData;

use log::debug;

use crate::conf::ConvConf;
use crate::kernel::{TransSrc, TransSrcCtx, TransSrcKind};
use crate::micro_kernel::{MicroKernel, NetworkKernel};
use crate::plan::{build_iw_ic_program, IwIcProgram, IwIcTile};
use crate::tuning::Tuning;
use crate::zmm::{prefetch_t0, prefetch_t1, store_fence, Opmask, Zmm};
use crate::{CACHE_LINE_SIZE, SIMD_W, TRANSPOSE_SIZE};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum blocks per batch to justify multi-threaded execution.
#[cfg(feature = "parallel")]
pub const MIN_PAR_BLOCKS: usize = 8;

const CACHE_LINE_ELEMS: usize = CACHE_LINE_SIZE / std::mem::size_of::<f32>();

/// Generic transpose kernel built for one shape.
pub struct JitTransIwIc<K: MicroKernel = NetworkKernel> {
    conf: ConvConf,
    program: IwIcProgram,
    _kernel: PhantomData<fn() -> K>,
}

impl JitTransIwIc {
    /// Build with default tuning.
    ///
    /// # Panics
    /// If `ic_block != 16`, `iw == 0` or `l_pad + iw > tr_iw`.
    pub fn new(conf: &ConvConf) -> Self {
        Self::build(conf, &Tuning::default())
    }

    /// Build with explicit tuning; results do not depend on it.
    ///
    /// # Panics
    /// As [`JitTransIwIc::new`].
    pub fn with_tuning(conf: &ConvConf, tuning: &Tuning) -> Self {
        Self::build(conf, tuning)
    }
}

impl<K: MicroKernel> JitTransIwIc<K> {
    /// Build with an explicit micro-kernel.
    pub fn build(conf: &ConvConf, tuning: &Tuning) -> Self {
        let program = build_iw_ic_program(conf, tuning);
        debug!(
            "jit_trans_iw_ic: iw={} tr_iw={} l_pad={} tiles={} tail={} r_pad={} prefetch={} nt={}",
            conf.iw,
            conf.tr_iw,
            conf.l_pad,
            program.tiles().count(),
            program.tail.nrows,
            program.tail.r_pad,
            program.prefetch,
            program.nontemporal_stores,
        );
        Self {
            conf: conf.clone(),
            program,
            _kernel: PhantomData,
        }
    }

    pub fn program(&self) -> &IwIcProgram {
        &self.program
    }

    /// Elements read from `src` per call.
    pub fn src_len(&self) -> usize {
        self.conf.iw * self.conf.ic_block
    }

    /// Elements written to `tr_src` per call.
    pub fn tr_src_len(&self) -> usize {
        self.conf.ic_block * self.conf.tr_iw
    }

    /// Transpose one block between slices.
    ///
    /// # Panics
    /// If either slice is shorter than the shape requires.
    pub fn transpose(&self, src: &[f32], tr_src: &mut [f32]) {
        assert!(
            src.len() >= self.src_len(),
            "src has {} elements, {} required",
            src.len(),
            self.src_len()
        );
        assert!(
            tr_src.len() >= self.tr_src_len(),
            "tr_src has {} elements, {} required",
            tr_src.len(),
            self.tr_src_len()
        );
        unsafe { self.run(&TransSrcCtx::new(src.as_ptr(), tr_src.as_mut_ptr())) }
    }

    /// Transpose `nblocks` consecutive blocks, prefetching each next block.
    ///
    /// # Panics
    /// If either slice is shorter than `nblocks` blocks.
    pub fn transpose_batch(&self, src: &[f32], tr_src: &mut [f32], nblocks: usize) {
        let (sl, dl) = (self.src_len(), self.tr_src_len());
        assert!(src.len() >= nblocks * sl, "src too short for {nblocks} blocks");
        assert!(
            tr_src.len() >= nblocks * dl,
            "tr_src too short for {nblocks} blocks"
        );

        let src_addr = src.as_ptr() as usize;
        let tr_src_addr = tr_src.as_mut_ptr() as usize;
        for b in 0..nblocks {
            unsafe { self.run(&self.block_ctx(src_addr, tr_src_addr, b)) };
        }
    }

    /// Parallel [`transpose_batch`](Self::transpose_batch) over the rayon pool.
    ///
    /// Falls back to the sequential path below [`MIN_PAR_BLOCKS`] blocks.
    #[cfg(feature = "parallel")]
    pub fn transpose_batch_par(&self, src: &[f32], tr_src: &mut [f32], nblocks: usize) {
        if nblocks < MIN_PAR_BLOCKS {
            self.transpose_batch(src, tr_src, nblocks);
            return;
        }
        let (sl, dl) = (self.src_len(), self.tr_src_len());
        assert!(src.len() >= nblocks * sl, "src too short for {nblocks} blocks");
        assert!(
            tr_src.len() >= nblocks * dl,
            "tr_src too short for {nblocks} blocks"
        );

        // Blocks write disjoint destination ranges.
        let src_addr = src.as_ptr() as usize;
        let tr_src_addr = tr_src.as_mut_ptr() as usize;
        (0..nblocks)
            .into_par_iter()
            .for_each(|b| unsafe { self.run(&self.block_ctx(src_addr, tr_src_addr, b)) });
    }

    /// Context of block `b` of a batch; prefetch targets are block `b + 1`.
    fn block_ctx(&self, src_addr: usize, tr_src_addr: usize, b: usize) -> TransSrcCtx {
        let (sl, dl) = (self.src_len(), self.tr_src_len());
        let src = src_addr as *const f32;
        let tr_src = tr_src_addr as *mut f32;
        TransSrcCtx::new(src.wrapping_add(b * sl), tr_src.wrapping_add(b * dl)).with_prefetch(
            src.wrapping_add((b + 1) * sl),
            tr_src.wrapping_add((b + 1) * dl),
        )
    }

    /// # Safety
    /// See [`TransSrc::ker`]; `src` and `tr_src` must cover the extents in
    /// the module documentation.
    unsafe fn run(&self, ctx: &TransSrcCtx) {
        let p = &self.program;
        let mut src = ctx.src;
        let mut tr_src = ctx.tr_src;
        let mut src_prf = ctx.src_prf;
        let mut tr_src_prf = ctx.tr_src_prf;

        for tile in p.tiles() {
            self.transpose_tile(&tile, src, tr_src, src_prf, tr_src_prf);
            src = src.add(tile.src_step);
            tr_src = tr_src.add(tile.tr_src_step);
            src_prf = src_prf.wrapping_add(tile.src_step);
            tr_src_prf = tr_src_prf.wrapping_add(tile.tr_src_step);
        }

        if p.nontemporal_stores {
            store_fence();
        }
    }

    #[inline(always)]
    unsafe fn transpose_tile(
        &self,
        tile: &IwIcTile,
        src: *const f32,
        tr_src: *mut f32,
        src_prf: *const f32,
        tr_src_prf: *const f32,
    ) {
        let p = &self.program;

        let mut regs = [Zmm::ZERO; TRANSPOSE_SIZE];
        for (i, r) in regs.iter_mut().enumerate().take(tile.nrows) {
            *r = Zmm::load(src.add(i * p.src_stride));
        }

        if p.prefetch {
            self.prefetch_tile(src, tr_src, src_prf, tr_src_prf);
        }

        K::transpose_16x16(&mut regs);

        let mask = tile.store_mask();
        let data = tr_src.add(tile.l_pad);
        for (c, r) in regs.iter().enumerate() {
            let row = data.add(c * p.tr_src_stride);
            match mask {
                Some(k) => r.store_masked(row, k),
                None if p.nontemporal_stores => r.stream(row),
                None => r.store(row),
            }
            if tile.r_pad > 0 {
                store_zeros(row.add(tile.nrows), tile.r_pad);
            }
            if tile.l_pad > 0 {
                store_zeros(tr_src.add(c * p.tr_src_stride), tile.l_pad);
            }
        }
    }

    /// Hint the next tile's source and destination lines (near) and the
    /// next call's lines (far).
    #[inline(always)]
    fn prefetch_tile(
        &self,
        src: *const f32,
        tr_src: *const f32,
        src_prf: *const f32,
        tr_src_prf: *const f32,
    ) {
        let p = &self.program;
        for i in 0..TRANSPOSE_SIZE {
            prefetch_t0(src.wrapping_add(p.src_pf_dist + i * p.src_stride));
            prefetch_t1(src_prf.wrapping_add(i * p.src_stride));

            let near = tr_src.wrapping_add(p.tr_src_pf_dist + i * p.tr_src_stride);
            prefetch_t0(near);
            prefetch_t0(near.wrapping_add(CACHE_LINE_ELEMS));
            prefetch_t1(tr_src_prf.wrapping_add(i * p.tr_src_stride));
        }
    }
}

/// Zero `width` consecutive elements with masked vector stores.
#[inline(always)]
unsafe fn store_zeros(ptr: *mut f32, width: usize) {
    let mut off = 0;
    while off < width {
        let n = (width - off).min(SIMD_W);
        Zmm::ZERO.store_masked(ptr.add(off), Opmask::low(n));
        off += n;
    }
}

impl<K: MicroKernel> TransSrc for JitTransIwIc<K> {
    fn kind(&self) -> TransSrcKind {
        TransSrcKind::IwIc
    }

    fn conf(&self) -> &ConvConf {
        &self.conf
    }

    unsafe fn ker(&self, ctx: &TransSrcCtx) {
        self.run(ctx);
    }
}
