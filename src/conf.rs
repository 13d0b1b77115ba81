//! Convolution shape descriptor consumed by the transpose kernels.

use crate::{Result, TransError, SIMD_W, TRANSPOSE_SIZE};

/// Maximum number of 16-lane tiles per row held by the first-layer kernel.
pub const MAX_X4_TILES: usize = 4;

/// Convolution kernel family the shape was prepared for.
///
/// Only [`ConvVer::FourFma`] has source transposition kernels; the other
/// families read the input in its natural layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvVer {
    #[default]
    Unused,
    Fma,
    Avx512Core,
    FourFma,
    FourVnni,
    Vnni,
}

/// Per-layer convolution geometry, fixed before any kernel is built.
///
/// Sizes are in `f32` elements. The right pad of the generic layout is not
/// stored: it is whatever remains of `tr_iw` after `l_pad + iw`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvConf {
    pub ver: ConvVer,
    pub is_1stconv: bool,
    /// Channels per source block (the generic kernel requires 16).
    pub ic_block: usize,
    /// Source spatial width.
    pub iw: usize,
    /// Destination row pitch of the generic layout.
    pub tr_iw: usize,
    /// Destination row pitch of the first-layer layout.
    pub tr_ld: usize,
    pub l_pad: usize,
    pub stride_w: usize,
    /// Threads cooperating on one first-layer transposition.
    pub nthr_oc_b: usize,
}

impl ConvConf {
    /// Shape for the generic `[iw][16] -> [16][tr_iw]` kernel.
    pub fn generic(iw: usize, l_pad: usize, tr_iw: usize) -> Self {
        Self {
            ver: ConvVer::FourFma,
            is_1stconv: false,
            ic_block: TRANSPOSE_SIZE,
            iw,
            tr_iw,
            l_pad,
            stride_w: 1,
            ..Default::default()
        }
    }

    /// Shape for the first-layer `[iw/4][4] -> [4][iw/4]` kernel.
    pub fn first_conv(iw: usize, tr_ld: usize, stride_w: usize, nthr_oc_b: usize) -> Self {
        Self {
            ver: ConvVer::FourFma,
            is_1stconv: true,
            ic_block: 1,
            iw,
            tr_ld,
            stride_w,
            nthr_oc_b,
            ..Default::default()
        }
    }

    /// Zero columns after the real data in a generic destination row.
    ///
    /// `None` when `l_pad + iw` overruns `tr_iw`.
    pub fn r_pad(&self) -> Option<usize> {
        self.tr_iw.checked_sub(self.iw + self.l_pad)
    }

    /// Number of 16-lane tiles per first-layer destination row.
    pub fn x4_tiles(&self) -> usize {
        self.tr_ld / SIMD_W
    }

    /// Check that a kernel can be built for this shape.
    ///
    /// The calling layer runs this before asking for a kernel; the kernel
    /// constructors treat a violated rule as a bug and panic.
    pub fn validate(&self) -> Result<()> {
        match (self.ver, self.is_1stconv) {
            (ConvVer::FourFma, false) => self.validate_generic(),
            (ConvVer::FourFma, true) => self.validate_first_conv(),
            (ver, is_1stconv) => Err(TransError::UnsupportedConfiguration { ver, is_1stconv }),
        }
    }

    fn validate_generic(&self) -> Result<()> {
        if self.ic_block != TRANSPOSE_SIZE {
            return Err(TransError::IcBlockMismatch {
                expected: TRANSPOSE_SIZE,
                got: self.ic_block,
            });
        }
        if self.iw == 0 {
            return Err(TransError::EmptySpatial);
        }
        if self.r_pad().is_none() {
            return Err(TransError::NegativeRightPad {
                iw: self.iw,
                l_pad: self.l_pad,
                tr_iw: self.tr_iw,
            });
        }
        Ok(())
    }

    fn validate_first_conv(&self) -> Result<()> {
        if self.iw == 0 {
            return Err(TransError::EmptySpatial);
        }
        if self.tr_ld == 0 || self.tr_ld % SIMD_W != 0 {
            return Err(TransError::TrLdNotAligned {
                tr_ld: self.tr_ld,
                simd_w: SIMD_W,
            });
        }
        let niters = self.x4_tiles();
        if niters > MAX_X4_TILES {
            return Err(TransError::TooManyTiles {
                tr_ld: self.tr_ld,
                niters,
                max: MAX_X4_TILES,
            });
        }
        let capacity = 4 * self.tr_ld;
        if self.iw > capacity {
            return Err(TransError::SpatialOverflow {
                iw: self.iw,
                capacity,
            });
        }
        if self.stride_w < 4 {
            return Err(TransError::RowPitchOverlap {
                stride_w: self.stride_w,
            });
        }
        if self.nthr_oc_b == 0 {
            return Err(TransError::NoThreads);
        }
        Ok(())
    }
}
