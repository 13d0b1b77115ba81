//! Straightforward whole-buffer versions of both transpositions.
//!
//! Each destination element is written from its index formula, with no
//! tiling, masking or registers involved. Used to check the kernels.

use crate::conf::ConvConf;
use crate::SIMD_W;

/// `tr_src[c][l_pad + i] = src[i][c]`, zeros elsewhere in each row.
///
/// # Panics
/// If the slices are shorter than the shape requires or `l_pad + iw > tr_iw`.
pub fn trans_iw_ic(conf: &ConvConf, src: &[f32], tr_src: &mut [f32]) {
    let ic = conf.ic_block;
    let tr_iw = conf.tr_iw;
    assert!(conf.l_pad + conf.iw <= tr_iw, "l_pad + iw exceeds tr_iw");

    for (c, row) in tr_src.chunks_exact_mut(tr_iw).take(ic).enumerate() {
        row.fill(0.0);
        for i in 0..conf.iw {
            row[conf.l_pad + i] = src[i * ic + c];
        }
    }
}

/// `tr_src[ih][k][j] = src[ih][4 * j + k]` for rows `[ih_start, ih_end)`,
/// zero where `4 * j + k >= iw`.
///
/// Only the `tr_ld / 16 * 16` leading elements of each destination row are
/// written, matching the kernel.
pub fn trans_iw_x4(
    conf: &ConvConf,
    src: &[f32],
    tr_src: &mut [f32],
    ih_start: usize,
    ih_end: usize,
) {
    let iw = conf.iw;
    let width = conf.x4_tiles() * SIMD_W;
    for ih in ih_start..ih_end {
        let row = &src[ih * iw..(ih + 1) * iw];
        let base = ih * conf.stride_w * conf.tr_ld;
        for k in 0..4 {
            for j in 0..width {
                let n = 4 * j + k;
                tr_src[base + k * conf.tr_ld + j] = if n < iw { row[n] } else { 0.0 };
            }
        }
    }
}
