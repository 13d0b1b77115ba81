//! Reference micro-kernel: every output lane is written from its index formula.

use super::{MicroKernel, ScalarKernel};
use crate::zmm::Zmm;

impl MicroKernel for ScalarKernel {
    #[inline]
    fn transpose_16x16(regs: &mut [Zmm; 16]) {
        let src = *regs;
        for (c, reg) in regs.iter_mut().enumerate() {
            for (r, lane) in reg.0.iter_mut().enumerate() {
                *lane = src[r].0[c];
            }
        }
    }

    #[inline]
    fn deinterleave_x4(regs: &mut [Zmm; 4]) {
        let src = *regs;
        let x = |n: usize| src[n / 16].0[n % 16];
        for (k, reg) in regs.iter_mut().enumerate() {
            for (j, lane) in reg.0.iter_mut().enumerate() {
                *lane = x(4 * j + k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_16x16() {
        let mut regs = [Zmm::ZERO; 16];
        for (r, reg) in regs.iter_mut().enumerate() {
            for (c, lane) in reg.0.iter_mut().enumerate() {
                *lane = (r * 100 + c) as f32;
            }
        }
        ScalarKernel::transpose_16x16(&mut regs);
        for c in 0..16 {
            for r in 0..16 {
                assert_eq!(regs[c].0[r], (r * 100 + c) as f32, "mismatch at r={r}, c={c}");
            }
        }
    }

    #[test]
    fn test_scalar_x4() {
        let mut regs = [Zmm::ZERO; 4];
        for (i, reg) in regs.iter_mut().enumerate() {
            for (j, lane) in reg.0.iter_mut().enumerate() {
                *lane = (i * 16 + j) as f32;
            }
        }
        ScalarKernel::deinterleave_x4(&mut regs);
        assert_eq!(&regs[0].0[0..4], &[0.0, 4.0, 8.0, 12.0]);
        assert_eq!(regs[3].0[15], 63.0);
        assert_eq!(regs[1].0[2], 9.0);
    }
}
