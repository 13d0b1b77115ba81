//! Lane-shuffle networks.
//!
//! The 16x16 transpose is a four-stage butterfly. Stages 1, 2 and 4 exchange
//! lanes at distance 1, 2 and 4 between register pairs at the same distance,
//! each half of the tile (`regs[0..8]` and `regs[8..16]`) independently.
//! Stage 8 combines the halves with 256-bit shuffles.
//!
//! The x4 deinterleave gathers every register by `index % 4` and then runs a
//! two-stage 4-way shuffle of 128-bit lanes across the four registers.

use super::{MicroKernel, NetworkKernel, X4_GATHER};
use crate::zmm::{Opmask, Zmm};

impl MicroKernel for NetworkKernel {
    #[inline]
    fn transpose_16x16(regs: &mut [Zmm; 16]) {
        transpose_16x8(regs, 0);
        transpose_16x8(regs, 8);
        fixup_16x16(regs);
    }

    #[inline]
    fn deinterleave_x4(regs: &mut [Zmm; 4]) {
        for r in regs.iter_mut() {
            *r = Zmm::permute(&X4_GATHER, *r);
        }

        let t0 = Zmm::shuf_f32x4(regs[0], regs[1], 0x88);
        let t1 = Zmm::shuf_f32x4(regs[0], regs[1], 0xdd);
        let t2 = Zmm::shuf_f32x4(regs[2], regs[3], 0x88);
        let t3 = Zmm::shuf_f32x4(regs[2], regs[3], 0xdd);

        regs[0] = Zmm::shuf_f32x4(t0, t2, 0x88);
        regs[2] = Zmm::shuf_f32x4(t0, t2, 0xdd);
        regs[1] = Zmm::shuf_f32x4(t1, t3, 0x88);
        regs[3] = Zmm::shuf_f32x4(t1, t3, 0xdd);
    }
}

/// Stages 1, 2 and 4 over `regs[base..base + 8]`.
#[inline(always)]
fn transpose_16x8(regs: &mut [Zmm; 16], base: usize) {
    debug_assert!(base == 0 || base == 8);

    // swap 1
    for i in 0..4 {
        let i0 = base + 2 * i;
        let i1 = i0 + 1;
        let tmp0 = Zmm::align_d(regs[i0], regs[i0], 0x1);
        let tmp1 = Zmm::align_d(regs[i1], regs[i1], 0xf);
        regs[i0] = regs[i0].mask_mov(Opmask::KAAAA, tmp1);
        regs[i1] = regs[i1].mask_mov(Opmask::K5555, tmp0);
    }

    // swap 2
    for i in 0..4 {
        let select_half = if i < 2 { 0 } else { 2 };
        let i0 = base + i + select_half;
        let i2 = i0 + 2;
        let tmp0 = Zmm::align_d(regs[i0], regs[i0], 0x2);
        let tmp1 = Zmm::align_d(regs[i2], regs[i2], 0xe);
        regs[i2] = regs[i2].mask_mov(Opmask::K3333, tmp0);
        regs[i0] = regs[i0].mask_mov(Opmask::KCCCC, tmp1);
    }

    // swap 4
    for i in 0..4 {
        let i0 = base + i;
        let i4 = i0 + 4;
        let tmp0 = regs[i0];
        regs[i0] = regs[i0].mask_mov(Opmask::KF0F0, Zmm::shuf_f32x4(regs[i4], regs[i4], 0xb1));
        regs[i4] = regs[i4].mask_mov(Opmask::K0F0F, Zmm::shuf_f32x4(tmp0, tmp0, 0xb1));
    }
}

/// Stage 8: pair `regs[i]` with `regs[8 + i]`.
#[inline(always)]
fn fixup_16x16(regs: &mut [Zmm; 16]) {
    let src = *regs;
    for i in 0..8 {
        regs[i] = Zmm::shuf_f64x2(src[i], src[8 + i], 0x44);
        regs[8 + i] = Zmm::shuf_f64x2(src[i], src[8 + i], 0xee);
    }
}
