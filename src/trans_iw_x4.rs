//! First-layer source transposition: `[ih][iw/4][4] -> [ih][4][iw/4]`.
//!
//! Each input row of `iw` elements becomes four destination rows of pitch
//! `tr_ld`; destination row `k` holds elements `k, k + 4, k + 8, ...` of the
//! input row, zero-filled past `iw`. Consecutive input rows are
//! `stride_w * tr_ld` elements apart in the destination.
//!
//! A call handles the rows `[tr_src_ih_start, tr_src_ih_end)` of its context
//! and is bracketed by two rendezvous on the team barrier: nobody starts
//! before the whole team has entered, and nobody returns before the whole
//! team has finished writing.
//!
//! # Buffer extents
//! For rows `[s, e)`:
//! - `src`: elements `[s * iw, e * iw)`, read.
//! - `tr_src`: for each row `ih`, elements `ih * stride_w * tr_ld + k * tr_ld + j`
//!   for `k < 4`, `j < tr_ld`, written.

use std::marker::PhantomData;

use log::debug;

use crate::barrier::{barrier, BarrierCtx};
use crate::conf::{ConvConf, MAX_X4_TILES};
use crate::kernel::{TransSrc, TransSrcCtx, TransSrcKind};
use crate::micro_kernel::{MicroKernel, NetworkKernel};
use crate::plan::{build_iw_x4_program, IwX4Program, TileLoad};
use crate::zmm::Zmm;
use crate::SIMD_W;

/// First-layer transpose kernel built for one shape and team size.
pub struct JitTransIwX4<K: MicroKernel = NetworkKernel> {
    conf: ConvConf,
    program: IwX4Program,
    _kernel: PhantomData<fn() -> K>,
}

impl JitTransIwX4 {
    /// # Panics
    /// If a row needs more than four 16-lane destination tiles.
    pub fn new(conf: &ConvConf) -> Self {
        Self::build(conf)
    }
}

impl<K: MicroKernel> JitTransIwX4<K> {
    /// Build with an explicit micro-kernel.
    pub fn build(conf: &ConvConf) -> Self {
        let program = build_iw_x4_program(conf);
        debug!(
            "jit_trans_iw_x4: iw={} tr_ld={} stride_w={} tiles={} nthr={}",
            conf.iw, conf.tr_ld, conf.stride_w, program.niters, program.nthr
        );
        Self {
            conf: conf.clone(),
            program,
            _kernel: PhantomData,
        }
    }

    pub fn program(&self) -> &IwX4Program {
        &self.program
    }

    /// Threads that must invoke every call together.
    pub fn nthr(&self) -> usize {
        self.program.nthr
    }

    /// Elements of `src` covering rows `[0, ih)`.
    pub fn src_len(&self, ih: usize) -> usize {
        ih * self.program.src_row_step
    }

    /// Elements of `tr_src` covering rows `[0, ih)`.
    pub fn tr_src_len(&self, ih: usize) -> usize {
        match ih {
            0 => 0,
            _ => (ih - 1) * self.program.tr_src_row_step + 4 * self.program.tr_ld,
        }
    }

    /// # Safety
    /// See [`TransSrc::ker`] and the buffer extents in the module documentation.
    unsafe fn run(&self, ctx: &TransSrcCtx) {
        let p = &self.program;
        let bctx = ctx.tr_src_bctx.as_ref();
        assert!(
            bctx.is_some() || p.nthr == 1,
            "a team of {} threads needs a barrier context",
            p.nthr
        );

        self.sync(bctx);

        for ih in ctx.tr_src_ih_start..ctx.tr_src_ih_end {
            self.transpose_row(
                ctx.src.add(ih * p.src_row_step),
                ctx.tr_src.add(ih * p.tr_src_row_step),
            );
        }

        self.sync(bctx);
    }

    #[inline]
    fn sync(&self, bctx: Option<&BarrierCtx>) {
        if let Some(ctx) = bctx {
            barrier(ctx, self.program.nthr);
        }
    }

    #[inline(always)]
    unsafe fn transpose_row(&self, src: *const f32, tr_src: *mut f32) {
        let p = &self.program;

        let mut regs = [[Zmm::ZERO; 4]; MAX_X4_TILES];
        for (t, load) in p.loads.iter().enumerate() {
            regs[t / 4][t % 4] = match *load {
                TileLoad::Full => Zmm::load(src.add(t * SIMD_W)),
                TileLoad::Partial(k) => Zmm::load_masked_z(src.add(t * SIMD_W), k),
                TileLoad::Zero => Zmm::ZERO,
            };
        }

        for group in regs.iter_mut().take(p.niters) {
            K::deinterleave_x4(group);
        }

        for i in 0..4 {
            for (iter, group) in regs.iter().enumerate().take(p.niters) {
                group[i].store(tr_src.add(i * p.tr_ld + iter * SIMD_W));
            }
        }
    }
}

impl<K: MicroKernel> TransSrc for JitTransIwX4<K> {
    fn kind(&self) -> TransSrcKind {
        TransSrcKind::IwX4
    }

    fn conf(&self) -> &ConvConf {
        &self.conf
    }

    unsafe fn ker(&self, ctx: &TransSrcCtx) {
        self.run(ctx);
    }
}
