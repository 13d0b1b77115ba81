//! 16-lane register model and predicate masks.
//!
//! [`Zmm`] and [`Opmask`] provide the primitives the transpose kernels are
//! written in: unmasked, masked and streaming loads/stores, register zeroing,
//! lane rotation across a register pair, masked merges, 128-bit lane shuffles
//! and a full lane permute. Operand order follows the instruction forms
//! (`dst = op(a, b, imm)`) so the shuffle networks read like their assembly.
//!
//! Masked memory operations touch only the enabled lanes, so a partial tile
//! never reads or writes outside the caller's extent.

use crate::SIMD_W;

/// One vector register of 16 `f32` lanes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C, align(64))]
pub struct Zmm(pub [f32; SIMD_W]);

/// Per-lane enable mask; bit `i` enables lane `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opmask(pub u16);

impl Opmask {
    pub const ALL: Self = Self(0xffff);
    pub const K3333: Self = Self(0x3333);
    pub const K5555: Self = Self(0x5555);
    pub const KAAAA: Self = Self(0xaaaa);
    pub const KCCCC: Self = Self(0xcccc);
    pub const K0F0F: Self = Self(0x0f0f);
    pub const KF0F0: Self = Self(0xf0f0);

    /// Mask enabling the lowest `n` lanes.
    ///
    /// # Panics
    /// If `n > 16`.
    #[inline]
    pub fn low(n: usize) -> Self {
        assert!(n <= SIMD_W, "mask width {n} exceeds {SIMD_W} lanes");
        if n == SIMD_W {
            Self::ALL
        } else {
            Self((1u16 << n) - 1)
        }
    }

    #[inline(always)]
    pub fn lane(self, i: usize) -> bool {
        (self.0 >> i) & 1 == 1
    }

    /// Number of enabled lanes.
    #[inline]
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl Zmm {
    pub const ZERO: Self = Self([0.0; SIMD_W]);

    /// Load 16 consecutive lanes.
    ///
    /// # Safety
    /// `ptr` must be valid for reading 16 `f32`.
    #[inline(always)]
    pub unsafe fn load(ptr: *const f32) -> Self {
        Self(ptr.cast::<[f32; SIMD_W]>().read_unaligned())
    }

    /// Load the enabled lanes; disabled lanes are zero.
    ///
    /// # Safety
    /// `ptr.add(i)` must be readable for every enabled lane `i`.
    #[inline(always)]
    pub unsafe fn load_masked_z(ptr: *const f32, k: Opmask) -> Self {
        let mut v = Self::ZERO;
        for i in 0..SIMD_W {
            if k.lane(i) {
                v.0[i] = *ptr.add(i);
            }
        }
        v
    }

    /// Store all 16 lanes.
    ///
    /// # Safety
    /// `ptr` must be valid for writing 16 `f32`.
    #[inline(always)]
    pub unsafe fn store(self, ptr: *mut f32) {
        ptr.cast::<[f32; SIMD_W]>().write_unaligned(self.0);
    }

    /// Store the enabled lanes only.
    ///
    /// # Safety
    /// `ptr.add(i)` must be writable for every enabled lane `i`.
    #[inline(always)]
    pub unsafe fn store_masked(self, ptr: *mut f32, k: Opmask) {
        for i in 0..SIMD_W {
            if k.lane(i) {
                *ptr.add(i) = self.0[i];
            }
        }
    }

    /// Store all 16 lanes, bypassing the cache where the target allows it.
    ///
    /// Streaming stores are weakly ordered: call [`store_fence`] before the
    /// data is handed to another thread.
    ///
    /// # Safety
    /// `ptr` must be valid for writing 16 `f32`.
    #[inline(always)]
    pub unsafe fn stream(self, ptr: *mut f32) {
        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_mm_loadu_ps, _mm_stream_ps};
            if (ptr as usize) % 16 == 0 {
                for q in 0..4 {
                    _mm_stream_ps(ptr.add(4 * q), _mm_loadu_ps(self.0.as_ptr().add(4 * q)));
                }
                return;
            }
        }
        self.store(ptr);
    }

    /// Concatenate `a:b` (`b` in the low half) and take 16 lanes starting at `imm`.
    ///
    /// With `a == b` this rotates the register down by `imm` lanes.
    #[inline(always)]
    pub fn align_d(a: Zmm, b: Zmm, imm: usize) -> Zmm {
        let shift = imm % SIMD_W;
        let mut r = Self::ZERO;
        for i in 0..SIMD_W {
            let j = i + shift;
            r.0[i] = if j < SIMD_W { b.0[j] } else { a.0[j - SIMD_W] };
        }
        r
    }

    /// Lanes enabled in `k` take `src`, the others keep `self`.
    #[inline(always)]
    pub fn mask_mov(self, k: Opmask, src: Zmm) -> Zmm {
        let mut r = self;
        for i in 0..SIMD_W {
            if k.lane(i) {
                r.0[i] = src.0[i];
            }
        }
        r
    }

    /// Shuffle 128-bit lanes: two selected from `a` fill the low half, two
    /// from `b` the high half, each picked by a 2-bit field of `imm`.
    #[inline(always)]
    pub fn shuf_f32x4(a: Zmm, b: Zmm, imm: u8) -> Zmm {
        let mut r = Self::ZERO;
        for q in 0..4 {
            let from = if q < 2 { &a } else { &b };
            let sel = ((imm >> (2 * q)) & 3) as usize;
            r.0[4 * q..4 * q + 4].copy_from_slice(&from.0[4 * sel..4 * sel + 4]);
        }
        r
    }

    /// 64-bit element form of [`Zmm::shuf_f32x4`]; identical when unmasked.
    #[inline(always)]
    pub fn shuf_f64x2(a: Zmm, b: Zmm, imm: u8) -> Zmm {
        Self::shuf_f32x4(a, b, imm)
    }

    /// `r[i] = a[idx[i]]`.
    #[inline(always)]
    pub fn permute(idx: &[u8; SIMD_W], a: Zmm) -> Zmm {
        let mut r = Self::ZERO;
        for i in 0..SIMD_W {
            r.0[i] = a.0[(idx[i] as usize) % SIMD_W];
        }
        r
    }
}

/// Prefetch hint into all cache levels.
///
/// The address is never dereferenced and may lie outside any allocation.
#[inline(always)]
pub fn prefetch_t0(ptr: *const f32) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        unsafe { _mm_prefetch::<_MM_HINT_T0>(ptr.cast::<i8>()) };
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Prefetch hint into the second-level cache and below.
#[inline(always)]
pub fn prefetch_t1(ptr: *const f32) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T1};
        unsafe { _mm_prefetch::<_MM_HINT_T1>(ptr.cast::<i8>()) };
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

/// Order preceding streaming stores before any later store.
#[inline]
pub fn store_fence() {
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { std::arch::x86_64::_mm_sfence() };
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
}
