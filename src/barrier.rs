//! Team-wide rendezvous for the first-layer kernel.
//!
//! The shared state is an arrival counter plus a generation number. Each
//! participant reads the generation, then registers its arrival; the last
//! arriver resets the counter and publishes the next generation, which
//! releases everyone spinning on the old one. Arrivals use acquire-release
//! ordering and the generation is published with release / observed with
//! acquire, so every write made before the barrier by any participant is
//! visible to all participants after it.
//!
//! There is no timeout: if fewer than `nthr` threads arrive, the others wait
//! forever.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::CACHE_LINE_SIZE;

/// Spins between yields while waiting for the generation to change.
const SPINS_BEFORE_YIELD: u32 = 1 << 10;

/// Shared barrier state, one per team.
///
/// Reusable for any number of consecutive rendezvous by the same team.
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub struct BarrierCtx {
    ctr: AtomicUsize,
    sense: AtomicUsize,
}

const _: () = assert!(std::mem::align_of::<BarrierCtx>() == CACHE_LINE_SIZE);

impl BarrierCtx {
    pub const fn new() -> Self {
        Self {
            ctr: AtomicUsize::new(0),
            sense: AtomicUsize::new(0),
        }
    }

    /// Number of completed rendezvous.
    pub fn generation(&self) -> usize {
        self.sense.load(Ordering::Acquire)
    }
}

/// Block until `nthr` threads have called `barrier` on the same `ctx`.
#[inline]
pub fn barrier(ctx: &BarrierCtx, nthr: usize) {
    if nthr <= 1 {
        return;
    }

    let sense = ctx.sense.load(Ordering::Acquire);
    if ctx.ctr.fetch_add(1, Ordering::AcqRel) == nthr - 1 {
        ctx.ctr.store(0, Ordering::Relaxed);
        ctx.sense.store(sense.wrapping_add(1), Ordering::Release);
        return;
    }

    let mut spins = 0u32;
    while ctx.sense.load(Ordering::Acquire) == sense {
        std::hint::spin_loop();
        spins += 1;
        if spins == SPINS_BEFORE_YIELD {
            spins = 0;
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_single_thread_is_noop() {
        let ctx = BarrierCtx::new();
        barrier(&ctx, 1);
        barrier(&ctx, 1);
        assert_eq!(ctx.generation(), 0);
    }

    #[test]
    fn test_releases_all_and_advances_generation() {
        let ctx = BarrierCtx::new();
        let nthr = 4;
        std::thread::scope(|s| {
            for _ in 0..nthr {
                s.spawn(|| barrier(&ctx, nthr));
            }
        });
        assert_eq!(ctx.generation(), 1);
    }

    #[test]
    fn test_no_thread_passes_early() {
        let ctx = BarrierCtx::new();
        let nthr = 4;
        let rounds = 50;
        let arrived: Vec<AtomicUsize> = (0..rounds).map(|_| AtomicUsize::new(0)).collect();
        let early = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..nthr {
                s.spawn(|| {
                    for round in arrived.iter() {
                        round.fetch_add(1, Ordering::Relaxed);
                        barrier(&ctx, nthr);
                        if round.load(Ordering::Relaxed) != nthr {
                            early.store(true, Ordering::Relaxed);
                        }
                        barrier(&ctx, nthr);
                    }
                });
            }
        });

        assert!(!early.load(Ordering::Relaxed));
        assert_eq!(ctx.generation(), 2 * rounds);
    }

    #[test]
    fn test_writes_visible_after_rendezvous() {
        let ctx = BarrierCtx::new();
        let nthr = 3;
        let slots: Vec<AtomicUsize> = (0..nthr).map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|s| {
            for tid in 0..nthr {
                let ctx = &ctx;
                let slots = &slots;
                s.spawn(move || {
                    slots[tid].store(tid + 1, Ordering::Relaxed);
                    barrier(ctx, nthr);
                    let seen: usize = slots.iter().map(|x| x.load(Ordering::Relaxed)).sum();
                    assert_eq!(seen, 6);
                });
            }
        });
    }
}
