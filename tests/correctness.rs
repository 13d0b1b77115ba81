use conv_trans_src::reference;
use conv_trans_src::team::run_first_layer;
use conv_trans_src::{
    balance211, create_trans_src, BarrierCtx, ConvConf, JitTransIwIc, JitTransIwX4, TransSrc,
    TransSrcCtx, Tuning,
};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

const GUARD: usize = 64;
const SENTINEL: f32 = -12345.0;

fn random_vec(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

/// Buffer with sentinel-filled guard regions on both sides of `len` elements.
struct Guarded {
    data: Vec<f32>,
    len: usize,
}

impl Guarded {
    fn new(len: usize) -> Self {
        Self {
            data: vec![SENTINEL; len + 2 * GUARD],
            len,
        }
    }

    fn inner(&self) -> &[f32] {
        &self.data[GUARD..GUARD + self.len]
    }

    fn inner_mut(&mut self) -> &mut [f32] {
        &mut self.data[GUARD..GUARD + self.len]
    }

    fn guards_intact(&self) -> bool {
        self.data[..GUARD]
            .iter()
            .chain(self.data[GUARD + self.len..].iter())
            .all(|&x| x == SENTINEL)
    }
}

#[test]
fn test_worked_example_through_dispatcher() {
    let conf = ConvConf::generic(20, 1, 22);
    conf.validate().unwrap();
    let ker = create_trans_src(&conf);

    let src = random_vec(20 * 16, 1);
    let mut dst = vec![f32::NAN; 16 * 22];
    unsafe { ker.ker(&TransSrcCtx::new(src.as_ptr(), dst.as_mut_ptr())) };

    for c in 0..16 {
        assert_eq!(dst[c * 22], 0.0);
        assert_eq!(dst[c * 22 + 21], 0.0);
        for i in 0..20 {
            assert_eq!(dst[c * 22 + 1 + i], src[i * 16 + c]);
        }
    }
}

#[test]
fn test_generic_writes_stay_in_bounds() {
    let shapes = [(5, 0, 0), (20, 1, 1), (33, 7, 2), (64, 0, 9), (71, 17, 19)];
    for &(iw, l_pad, r_pad) in &shapes {
        let conf = ConvConf::generic(iw, l_pad, l_pad + iw + r_pad);
        let ker = JitTransIwIc::new(&conf);

        // The source ends exactly at the end of its allocation, so any read
        // past the last tile leaves it (reported under Miri or a sanitizer).
        let src: Box<[f32]> = random_vec(ker.src_len(), iw as u64).into_boxed_slice();
        assert_eq!(src.len(), ker.src_len());
        let mut dst = Guarded::new(ker.tr_src_len());
        let ctx = TransSrcCtx::new(src.as_ptr(), dst.inner_mut().as_mut_ptr());
        unsafe { ker.ker(&ctx) };

        assert!(dst.guards_intact(), "iw={iw}, l_pad={l_pad}, r_pad={r_pad}");
        assert!(dst.inner().iter().all(|&x| x != SENTINEL), "unwritten element");

        let mut expected = vec![0.0; ker.tr_src_len()];
        reference::trans_iw_ic(&conf, &src, &mut expected);
        assert_eq!(dst.inner(), &expected[..]);
    }
}

#[test]
fn test_first_layer_writes_stay_in_bounds() {
    let conf = ConvConf::first_conv(99, 32, 4, 3);
    let ker = JitTransIwX4::new(&conf);
    let ih = 5;

    let src: Box<[f32]> = random_vec(ker.src_len(ih), 7).into_boxed_slice();
    let mut dst = Guarded::new(ker.tr_src_len(ih));
    run_first_layer(&ker, &src, dst.inner_mut(), ih);
    assert!(dst.guards_intact());

    let mut expected = vec![SENTINEL; ker.tr_src_len(ih)];
    reference::trans_iw_x4(&conf, &src, &mut expected, 0, ih);
    assert_eq!(dst.inner(), &expected[..]);
}

#[test]
fn test_tuning_does_not_change_results() {
    let conf = ConvConf::generic(90, 3, 96);
    let src = random_vec(90 * 16, 3);
    let mut base = vec![0.0; 16 * 96];
    JitTransIwIc::new(&conf).transpose(&src, &mut base);

    let tunings = [
        Tuning {
            nontemporal_stores: true,
            ..Tuning::default()
        },
        Tuning {
            small_spatial: 1000,
            ..Tuning::default()
        },
        Tuning {
            src_prefetch_rows: 64,
            tr_src_prefetch_cols: 0,
            ..Tuning::default()
        },
    ];
    for tuning in &tunings {
        let mut got = vec![f32::NAN; 16 * 96];
        JitTransIwIc::with_tuning(&conf, tuning).transpose(&src, &mut got);
        assert_eq!(got, base, "{tuning:?}");
    }
}

/// Every thread checks, right after its kernel call returns, that the rows
/// of all other threads are already complete.
#[test]
fn test_first_layer_post_barrier_visibility() {
    let nthr = 4;
    let ih = 10;
    let iw = 64;
    let conf = ConvConf::first_conv(iw, 16, 4, nthr);
    let ker = JitTransIwX4::new(&conf);

    let src = random_vec(ker.src_len(ih), 11);
    let mut expected = vec![0.0f32; ker.tr_src_len(ih)];
    reference::trans_iw_x4(&conf, &src, &mut expected, 0, ih);

    let mut dst = vec![f32::NAN; ker.tr_src_len(ih)];
    let bctx = BarrierCtx::new();
    let checked = AtomicUsize::new(0);
    let dst_addr = dst.as_mut_ptr() as usize;
    let len = dst.len();

    for _round in 0..3 {
        std::thread::scope(|s| {
            for ithr in 0..nthr {
                let (ker, bctx, src, expected, checked) = (&ker, &bctx, &src, &expected, &checked);
                s.spawn(move || {
                    let (start, end) = balance211(ih, nthr, ithr);
                    let ctx = TransSrcCtx::new(src.as_ptr(), dst_addr as *mut f32)
                        .with_rows(start, end, bctx);
                    unsafe { ker.ker(&ctx) };

                    // After the exit rendezvous nobody writes any more.
                    let view = unsafe { std::slice::from_raw_parts(dst_addr as *const f32, len) };
                    assert_eq!(view, &expected[..], "thread {ithr} saw partial rows");
                    checked.fetch_add(1, Ordering::Relaxed);
                });
            }
        });
    }

    assert_eq!(checked.load(Ordering::Relaxed), 3 * nthr);
    assert_eq!(bctx.generation(), 3 * 2);
    assert_eq!(dst, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_generic_transpose(iw in 1usize..80, l_pad in 0usize..20, r_pad in 0usize..20, seed in any::<u64>()) {
        let conf = ConvConf::generic(iw, l_pad, l_pad + iw + r_pad);
        prop_assert!(conf.validate().is_ok());
        let ker = JitTransIwIc::new(&conf);
        let src = random_vec(ker.src_len(), seed);
        let mut dst = vec![f32::NAN; ker.tr_src_len()];
        ker.transpose(&src, &mut dst);

        let tr_iw = conf.tr_iw;
        for c in 0..16 {
            let row = &dst[c * tr_iw..(c + 1) * tr_iw];
            prop_assert!(row[..l_pad].iter().all(|&x| x == 0.0));
            prop_assert!(row[l_pad + iw..].iter().all(|&x| x == 0.0));
            for i in 0..iw {
                prop_assert_eq!(row[l_pad + i], src[i * 16 + c]);
            }
        }
    }

    #[test]
    fn prop_first_layer_deinterleave(iw in 1usize..=256, rows in 1usize..6, seed in any::<u64>()) {
        let tr_ld = iw.div_ceil(4).div_ceil(16) * 16;
        let conf = ConvConf::first_conv(iw, tr_ld, 4, 1);
        prop_assert!(conf.validate().is_ok());
        let ker = JitTransIwX4::new(&conf);
        let src = random_vec(ker.src_len(rows), seed);
        let mut dst = vec![f32::NAN; ker.tr_src_len(rows)];
        run_first_layer(&ker, &src, &mut dst, rows);

        for row in 0..rows {
            let base = row * 4 * tr_ld;
            for k in 0..4 {
                for j in 0..tr_ld {
                    let n = 4 * j + k;
                    let want = if n < iw { src[row * iw + n] } else { 0.0 };
                    prop_assert_eq!(dst[base + k * tr_ld + j], want);
                }
            }
        }
    }
}
