//! Construction-time schedules for the transpose kernels.
//!
//! Building a kernel resolves everything that depends only on the shape:
//! how many tiles a row splits into, which tile carries the left pad, which
//! carries the tail and the right pad, the mask of every partial access and
//! the pointer increment after every tile. The kernels then only walk these
//! programs with the call-time addresses.

use crate::conf::{ConvConf, MAX_X4_TILES};
use crate::tuning::Tuning;
use crate::zmm::Opmask;
use crate::{SIMD_W, TRANSPOSE_SIZE};

/// One pass of the 16x16 transpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IwIcTile {
    /// Valid spatial positions in this tile (1..=16).
    pub nrows: usize,
    /// Zero columns written before the tile's data.
    pub l_pad: usize,
    /// Zero columns written after the tile's data.
    pub r_pad: usize,
    /// Source advance after the tile, in elements.
    pub src_step: usize,
    /// Destination advance after the tile, in elements.
    pub tr_src_step: usize,
}

impl IwIcTile {
    /// Store mask of a partial tile; `None` for a full one.
    pub fn store_mask(&self) -> Option<Opmask> {
        (self.nrows < TRANSPOSE_SIZE).then(|| Opmask::low(self.nrows))
    }
}

/// Schedule of the generic kernel: `head`, then `body` `loop_iters` times,
/// then `tail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IwIcProgram {
    /// First full tile when it carries the left pad.
    pub head: Option<IwIcTile>,
    pub body: IwIcTile,
    pub loop_iters: usize,
    /// Last (possibly partial) tile; carries the right pad, and the left pad
    /// too when the row is a single tile.
    pub tail: IwIcTile,
    /// Source pitch between spatial positions.
    pub src_stride: usize,
    /// Destination pitch between channels.
    pub tr_src_stride: usize,
    pub prefetch: bool,
    /// Near-future source prefetch distance, in elements.
    pub src_pf_dist: usize,
    /// Near-future destination prefetch distance, in elements.
    pub tr_src_pf_dist: usize,
    pub nontemporal_stores: bool,
}

impl IwIcProgram {
    /// Tiles in execution order.
    pub fn tiles(&self) -> impl Iterator<Item = IwIcTile> + '_ {
        self.head
            .into_iter()
            .chain(std::iter::repeat(self.body).take(self.loop_iters))
            .chain(std::iter::once(self.tail))
    }
}

/// Build the generic kernel's schedule.
///
/// # Panics
/// If `ic_block != 16`, `iw == 0` or `l_pad + iw > tr_iw`.
pub fn build_iw_ic_program(conf: &ConvConf, tuning: &Tuning) -> IwIcProgram {
    assert_eq!(
        conf.ic_block, TRANSPOSE_SIZE,
        "transpose requires ic_block == {TRANSPOSE_SIZE}"
    );
    assert!(conf.iw > 0, "transpose requires a non-empty row");
    let r_pad = conf
        .r_pad()
        .unwrap_or_else(|| panic!("l_pad + iw exceeds tr_iw in {conf:?}"));

    let src_stride = conf.ic_block;
    assert_eq!(src_stride * std::mem::size_of::<f32>(), 64);
    let tr_src_stride = conf.tr_iw;

    let iw = conf.iw;
    let l_pad = conf.l_pad;
    let transposes = iw.div_ceil(TRANSPOSE_SIZE);
    let mut loop_iters = transposes - 1;
    let tail = iw - loop_iters * TRANSPOSE_SIZE;

    let src_step = conf.ic_block * TRANSPOSE_SIZE;
    let tr_src_step = TRANSPOSE_SIZE;

    let head = if l_pad > 0 && loop_iters > 0 {
        loop_iters -= 1;
        Some(IwIcTile {
            nrows: TRANSPOSE_SIZE,
            l_pad,
            r_pad: 0,
            src_step,
            tr_src_step: tr_src_step + l_pad,
        })
    } else {
        None
    };

    let body = IwIcTile {
        nrows: TRANSPOSE_SIZE,
        l_pad: 0,
        r_pad: 0,
        src_step,
        tr_src_step,
    };

    let tail = IwIcTile {
        nrows: tail,
        l_pad: if transposes > 1 { 0 } else { l_pad },
        r_pad,
        src_step: 0,
        tr_src_step: 0,
    };

    IwIcProgram {
        head,
        body,
        loop_iters,
        tail,
        src_stride,
        tr_src_stride,
        prefetch: tuning.prefetch_enabled(iw),
        src_pf_dist: tuning.src_prefetch_rows * src_stride,
        tr_src_pf_dist: tuning.tr_src_prefetch_cols,
        nontemporal_stores: tuning.nontemporal_stores,
    }
}

/// How one 16-lane source tile of a first-layer row is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoad {
    /// Entirely inside the row.
    Full,
    /// Straddles the row end; disabled lanes read as zero.
    Partial(Opmask),
    /// Entirely past the row end.
    Zero,
}

/// Schedule of the first-layer kernel for one input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IwX4Program {
    /// Destination tiles per deinterleaved row (`tr_ld / 16`).
    pub niters: usize,
    /// Load kind of source tile `iter * 4 + i`.
    pub loads: Vec<TileLoad>,
    /// Destination pitch between the four deinterleaved rows.
    pub tr_ld: usize,
    /// Source advance per input row.
    pub src_row_step: usize,
    /// Destination advance per input row.
    pub tr_src_row_step: usize,
    /// Threads taking part in each rendezvous.
    pub nthr: usize,
}

/// Build the first-layer kernel's schedule.
///
/// # Panics
/// On any shape [`ConvConf::validate`] rejects for the first layer: an empty
/// row, `tr_ld` not a positive multiple of 16, more than four destination
/// tiles, `iw > 4 * tr_ld`, `stride_w < 4` or an empty team.
pub fn build_iw_x4_program(conf: &ConvConf) -> IwX4Program {
    let iw = conf.iw;
    assert!(iw > 0, "transpose requires a non-empty row");
    assert!(
        conf.tr_ld > 0 && conf.tr_ld % SIMD_W == 0,
        "tr_ld = {} is not a positive multiple of {SIMD_W}",
        conf.tr_ld
    );
    let niters = conf.x4_tiles();
    assert!(
        niters <= MAX_X4_TILES,
        "tr_ld = {} needs {niters} tiles, at most {MAX_X4_TILES} fit in registers",
        conf.tr_ld
    );
    assert!(
        iw <= 4 * conf.tr_ld,
        "iw = {iw} exceeds the {} elements covered by tr_ld",
        4 * conf.tr_ld
    );
    // Rows of adjacent input rows may belong to different threads.
    assert!(
        conf.stride_w >= 4,
        "stride_w = {} overlaps destination rows",
        conf.stride_w
    );
    assert!(conf.nthr_oc_b > 0, "first-layer transpose requires a team");

    let loads = (0..niters * 4)
        .map(|t| {
            let off = t * SIMD_W;
            if off + SIMD_W <= iw {
                TileLoad::Full
            } else if off < iw {
                TileLoad::Partial(Opmask::low(iw - off))
            } else {
                TileLoad::Zero
            }
        })
        .collect();

    IwX4Program {
        niters,
        loads,
        tr_ld: conf.tr_ld,
        src_row_step: iw,
        tr_src_row_step: conf.stride_w * conf.tr_ld,
        nthr: conf.nthr_oc_b,
    }
}
