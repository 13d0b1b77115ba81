//! In-register transpose micro-kernels.
//!
//! A micro-kernel rearranges lanes across a fixed set of registers; loading,
//! masking and storing are done by the tile routines around it. Two
//! implementations exist: [`NetworkKernel`] runs the lane-shuffle networks
//! the kernels are tuned for, [`ScalarKernel`] writes each lane from its
//! index formula and serves as the reference.

pub mod network;
pub mod scalar;

use crate::zmm::Zmm;

/// Lane permutation that groups a register's elements by `index % 4`.
///
/// Quarter `q` of the result holds elements `q, q + 4, q + 8, q + 12`.
pub const X4_GATHER: [u8; 16] = [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];

/// Register-level transpose building blocks.
pub trait MicroKernel {
    /// Transpose a 16x16 tile held in 16 registers.
    ///
    /// On entry `regs[r].0[c]` is element `(r, c)`; on exit `regs[c].0[r]`
    /// holds it.
    fn transpose_16x16(regs: &mut [Zmm; 16]);

    /// Deinterleave 64 consecutive elements held in 4 registers.
    ///
    /// With `x[n] = regs[n / 16].0[n % 16]` on entry, on exit
    /// `regs[k].0[j] == x[4 * j + k]`.
    fn deinterleave_x4(regs: &mut [Zmm; 4]);
}

/// Shuffle-network micro-kernel.
pub struct NetworkKernel;

/// Index-formula reference micro-kernel.
pub struct ScalarKernel;
