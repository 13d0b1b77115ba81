//! Scoped-thread driver for the first-layer kernel.
//!
//! The first-layer kernel only completes when exactly `nthr_oc_b` threads
//! call it together, so it cannot run on a work-stealing pool that may have
//! fewer workers. This driver spawns one OS thread per team member and gives
//! each a [`balance211`] share of the rows.

use log::trace;

use crate::barrier::BarrierCtx;
use crate::kernel::{TransSrc, TransSrcCtx};
use crate::micro_kernel::MicroKernel;
use crate::partition::balance211;
use crate::trans_iw_x4::JitTransIwX4;

/// Transpose rows `[0, ih)` with the kernel's full team.
///
/// Every team member takes part in both rendezvous, including members whose
/// share of the rows is empty.
///
/// # Panics
/// If either slice is shorter than `ih` rows require.
pub fn run_first_layer<K: MicroKernel>(
    kernel: &JitTransIwX4<K>,
    src: &[f32],
    tr_src: &mut [f32],
    ih: usize,
) {
    assert!(
        src.len() >= kernel.src_len(ih),
        "src has {} elements, {} required",
        src.len(),
        kernel.src_len(ih)
    );
    assert!(
        tr_src.len() >= kernel.tr_src_len(ih),
        "tr_src has {} elements, {} required",
        tr_src.len(),
        kernel.tr_src_len(ih)
    );

    let nthr = kernel.nthr();
    let bctx = BarrierCtx::new();

    if nthr == 1 {
        let ctx = TransSrcCtx::new(src.as_ptr(), tr_src.as_mut_ptr()).with_rows(0, ih, &bctx);
        unsafe { kernel.ker(&ctx) };
        return;
    }

    // Shares write disjoint destination rows.
    let src_addr = src.as_ptr() as usize;
    let tr_src_addr = tr_src.as_mut_ptr() as usize;

    std::thread::scope(|s| {
        for ithr in 0..nthr {
            let bctx = &bctx;
            s.spawn(move || {
                let (start, end) = balance211(ih, nthr, ithr);
                trace!("trans_iw_x4 team: thread {ithr}/{nthr} rows [{start}, {end})");
                let ctx = TransSrcCtx::new(src_addr as *const f32, tr_src_addr as *mut f32)
                    .with_rows(start, end, bctx);
                unsafe { kernel.ker(&ctx) };
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::ConvConf;
    use crate::reference;

    #[test]
    fn test_team_matches_reference() {
        for nthr in [1, 2, 3, 4] {
            let conf = ConvConf::first_conv(75, 32, 4, nthr);
            let ker = JitTransIwX4::new(&conf);
            let ih = 7;
            let src: Vec<f32> = (0..ih * 75).map(|i| i as f32).collect();
            let mut got = vec![0.0f32; ker.tr_src_len(ih)];
            let mut expected = vec![0.0f32; ker.tr_src_len(ih)];
            run_first_layer(&ker, &src, &mut got, ih);
            reference::trans_iw_x4(&conf, &src, &mut expected, 0, ih);
            assert_eq!(got, expected, "nthr={nthr}");
        }
    }

    #[test]
    fn test_team_larger_than_rows() {
        let conf = ConvConf::first_conv(16, 16, 4, 6);
        let ker = JitTransIwX4::new(&conf);
        let src: Vec<f32> = (0..2 * 16).map(|i| i as f32).collect();
        let mut got = vec![0.0f32; ker.tr_src_len(2)];
        run_first_layer(&ker, &src, &mut got, 2);
        assert_eq!(got[64 + 16], src[16 + 1]);
    }
}
