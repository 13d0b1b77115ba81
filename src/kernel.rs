//! Kernel interface and variant dispatch.

use std::ptr;

use log::debug;

use crate::barrier::BarrierCtx;
use crate::conf::{ConvConf, ConvVer};
use crate::micro_kernel::NetworkKernel;
use crate::trans_iw_ic::JitTransIwIc;
use crate::trans_iw_x4::JitTransIwX4;
use crate::tuning::Tuning;

/// Which transposition a kernel performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransSrcKind {
    /// `[iw][16] -> [16][tr_iw]`, see [`JitTransIwIc`].
    IwIc,
    /// `[ih][iw/4][4] -> [ih][4][iw/4]`, see [`JitTransIwX4`].
    IwX4,
}

/// Per-call parameters of a transpose kernel.
///
/// `src_prf` / `tr_src_prf` are prefetch targets for the *next* call and are
/// never dereferenced. The row range and barrier handle are read by the
/// first-layer kernel only.
#[derive(Debug, Clone, Copy)]
pub struct TransSrcCtx {
    pub src: *const f32,
    pub tr_src: *mut f32,
    pub src_prf: *const f32,
    pub tr_src_prf: *const f32,
    pub tr_src_ih_start: usize,
    pub tr_src_ih_end: usize,
    pub tr_src_bctx: *const BarrierCtx,
}

impl Default for TransSrcCtx {
    fn default() -> Self {
        Self {
            src: ptr::null(),
            tr_src: ptr::null_mut(),
            src_prf: ptr::null(),
            tr_src_prf: ptr::null(),
            tr_src_ih_start: 0,
            tr_src_ih_end: 0,
            tr_src_bctx: ptr::null(),
        }
    }
}

impl TransSrcCtx {
    /// Context whose prefetch targets are the buffers themselves.
    pub fn new(src: *const f32, tr_src: *mut f32) -> Self {
        Self {
            src,
            tr_src,
            src_prf: src,
            tr_src_prf: tr_src,
            ..Default::default()
        }
    }

    pub fn with_prefetch(mut self, src_prf: *const f32, tr_src_prf: *const f32) -> Self {
        self.src_prf = src_prf;
        self.tr_src_prf = tr_src_prf;
        self
    }

    /// Rows `[ih_start, ih_end)` of a first-layer call and the team barrier.
    pub fn with_rows(mut self, ih_start: usize, ih_end: usize, bctx: &BarrierCtx) -> Self {
        self.tr_src_ih_start = ih_start;
        self.tr_src_ih_end = ih_end;
        self.tr_src_bctx = bctx;
        self
    }
}

/// A transpose kernel built for one shape and invoked per call.
///
/// Kernels hold no per-call state; one instance may be invoked from any
/// number of threads at once.
pub trait TransSrc: Send + Sync {
    fn kind(&self) -> TransSrcKind;

    /// Shape the kernel was built for.
    fn conf(&self) -> &ConvConf;

    /// Run the kernel on the buffers named by `ctx`.
    ///
    /// # Safety
    /// The buffers in `ctx` must cover the extents the shape implies (see
    /// each kernel's documentation), must not overlap, and must not be
    /// accessed by other threads during the call except as the kernel's own
    /// contract allows. For the first-layer kernel `tr_src_bctx` must point
    /// to a barrier shared by exactly `nthr_oc_b` concurrent callers.
    unsafe fn ker(&self, ctx: &TransSrcCtx);
}

/// Build the transpose kernel for `conf` with default tuning.
///
/// # Panics
/// If `conf` names a configuration without a transpose kernel, or violates
/// an invariant of the selected kernel. Run [`ConvConf::validate`] first.
pub fn create_trans_src(conf: &ConvConf) -> Box<dyn TransSrc> {
    create_trans_src_with(conf, &Tuning::default())
}

/// Build the transpose kernel for `conf` with explicit tuning.
pub fn create_trans_src_with(conf: &ConvConf, tuning: &Tuning) -> Box<dyn TransSrc> {
    match (conf.ver, conf.is_1stconv) {
        (ConvVer::FourFma, false) => {
            debug!("trans_src: iw x ic transpose for iw={}", conf.iw);
            Box::new(JitTransIwIc::<NetworkKernel>::with_tuning(conf, tuning))
        }
        (ConvVer::FourFma, true) => {
            debug!("trans_src: iw x4 deinterleave for iw={}", conf.iw);
            Box::new(JitTransIwX4::<NetworkKernel>::new(conf))
        }
        (ver, is_1stconv) => {
            panic!("unsupported configuration: ver={ver:?}, is_1stconv={is_1stconv}")
        }
    }
}
