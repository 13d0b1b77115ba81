//! Shape-specialized source transposition for direct convolution.
//!
//! The backward-by-weights convolution micro-kernels consume their input
//! tensor in a layout that turns every FMA operand into a unit-stride vector
//! load. This crate builds the kernels that produce that layout. A kernel is
//! built once per convolution shape (all masks, pad widths, tile counts and
//! pointer increments are fixed at that point) and then invoked any number of
//! times with fresh buffer addresses.
//!
//! # Kernels
//!
//! - [`JitTransIwIc`]: `[iw][16] -> [16][tr_iw]` register transpose with left
//!   and right zero padding, tail masking and software prefetch.
//! - [`JitTransIwX4`]: `[ih][iw/4][4] -> [ih][4][iw/4]` deinterleave for the
//!   first convolution layer, bracketed by two team-wide barrier rendezvous.
//!
//! [`create_trans_src`] picks the variant from a [`ConvConf`].
//!
//! # Structure
//!
//! 1. [`zmm`]: 16-lane register model and predicate masks
//! 2. [`micro_kernel`]: in-register shuffle networks (and their scalar reference)
//! 3. [`plan`]: construction-time tile schedules
//! 4. [`trans_iw_ic`] / [`trans_iw_x4`]: schedule execution against a call context
//!
//! # Example
//!
//! ```rust
//! use conv_trans_src::{ConvConf, JitTransIwIc};
//!
//! // iw = 20 spatial positions, 1 column of padding on each side.
//! let conf = ConvConf::generic(20, 1, 22);
//! let kernel = JitTransIwIc::new(&conf);
//!
//! let src: Vec<f32> = (0..20 * 16).map(|i| i as f32).collect();
//! let mut tr_src = vec![f32::NAN; 16 * 22];
//! kernel.transpose(&src, &mut tr_src);
//!
//! // channel 3, spatial position 5 lands in column 5 + l_pad
//! assert_eq!(tr_src[3 * 22 + 6], src[5 * 16 + 3]);
//! assert_eq!(tr_src[3 * 22], 0.0);
//! assert_eq!(tr_src[3 * 22 + 21], 0.0);
//! ```

pub mod barrier;
pub mod conf;
pub mod kernel;
pub mod micro_kernel;
pub mod partition;
pub mod plan;
pub mod reference;
pub mod team;
pub mod trans_iw_ic;
pub mod trans_iw_x4;
pub mod tuning;
pub mod zmm;

// Re-export primary API
pub use barrier::{barrier, BarrierCtx};
pub use conf::{ConvConf, ConvVer};
pub use kernel::{create_trans_src, create_trans_src_with, TransSrc, TransSrcCtx, TransSrcKind};
pub use micro_kernel::{MicroKernel, NetworkKernel, ScalarKernel};
pub use partition::balance211;
pub use trans_iw_ic::JitTransIwIc;
pub use trans_iw_x4::JitTransIwX4;
pub use tuning::Tuning;

// Constants

/// Number of `f32` lanes in one vector register.
pub const SIMD_W: usize = 16;

/// Spatial positions handled by one pass of the 16x16 transpose.
pub const TRANSPOSE_SIZE: usize = 16;

/// Cache line size in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Errors reported while validating a shape or reading tuning overrides.
///
/// Kernel construction itself never returns these: building a kernel for a
/// configuration that fails validation is a programming error and panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransError {
    /// No kernel variant exists for this version / first-layer combination.
    #[error("unsupported configuration: ver={ver:?}, is_1stconv={is_1stconv}")]
    UnsupportedConfiguration { ver: ConvVer, is_1stconv: bool },

    /// The generic kernel transposes exactly one 16-channel block.
    #[error("ic_block must be {expected}, got {got}")]
    IcBlockMismatch { expected: usize, got: usize },

    /// The spatial extent is empty.
    #[error("iw must be positive")]
    EmptySpatial,

    /// `l_pad + iw` does not fit in the destination row.
    #[error("l_pad ({l_pad}) + iw ({iw}) exceeds tr_iw ({tr_iw})")]
    NegativeRightPad {
        iw: usize,
        l_pad: usize,
        tr_iw: usize,
    },

    /// `tr_ld` must be a positive multiple of the vector width.
    #[error("tr_ld ({tr_ld}) is not a positive multiple of {simd_w}")]
    TrLdNotAligned { tr_ld: usize, simd_w: usize },

    /// The first-layer kernel holds at most four tiles per row in registers.
    #[error("tr_ld ({tr_ld}) needs {niters} tiles per row, at most {max} are supported")]
    TooManyTiles {
        tr_ld: usize,
        niters: usize,
        max: usize,
    },

    /// The source row is longer than the destination rows can hold.
    #[error("iw ({iw}) exceeds the {capacity} elements covered by tr_ld")]
    SpatialOverflow { iw: usize, capacity: usize },

    /// Destination rows of consecutive input rows would overlap.
    #[error("stride_w ({stride_w}) must be at least 4 for the deinterleaved layout")]
    RowPitchOverlap { stride_w: usize },

    /// The first-layer kernel needs at least one cooperating thread.
    #[error("nthr_oc_b must be positive")]
    NoThreads,

    /// A tuning override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidTuning { var: &'static str, value: String },
}

/// Result type for validation and configuration.
pub type Result<T> = std::result::Result<T, TransError>;
