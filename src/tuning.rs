//! Microarchitecture-tuned constants of the generic transpose kernel.
//!
//! The defaults were tuned for 16-lane cores with 64-byte cache lines. They
//! only affect speed: every setting produces the same destination contents.

use crate::{Result, TransError, TRANSPOSE_SIZE};

/// Tuning knobs applied when a kernel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Prefetch is disabled unless `iw > small_spatial`.
    pub small_spatial: usize,
    /// How many spatial rows ahead of the load cursor the source is prefetched.
    pub src_prefetch_rows: usize,
    /// How many elements ahead of the store cursor destination rows are prefetched.
    pub tr_src_prefetch_cols: usize,
    /// Use streaming (cache-bypassing) stores for full tiles.
    ///
    /// Saves cache capacity when the transposed buffer is not read again
    /// soon, at the cost of store latency when it is.
    pub nontemporal_stores: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            small_spatial: 14,
            src_prefetch_rows: TRANSPOSE_SIZE,
            tr_src_prefetch_cols: TRANSPOSE_SIZE,
            nontemporal_stores: false,
        }
    }
}

impl Tuning {
    pub const ENV_SMALL_SPATIAL: &'static str = "CONV_TRANS_SMALL_SPATIAL";
    pub const ENV_SRC_PF_ROWS: &'static str = "CONV_TRANS_SRC_PF_ROWS";
    pub const ENV_TR_SRC_PF_COLS: &'static str = "CONV_TRANS_TR_SRC_PF_COLS";
    pub const ENV_NT_STORES: &'static str = "CONV_TRANS_NT_STORES";

    /// Defaults overlaid with any `CONV_TRANS_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with overrides from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self> {
        let mut tuning = Self::default();
        if let Some(v) = lookup(Self::ENV_SMALL_SPATIAL) {
            tuning.small_spatial = parse_usize(Self::ENV_SMALL_SPATIAL, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_SRC_PF_ROWS) {
            tuning.src_prefetch_rows = parse_usize(Self::ENV_SRC_PF_ROWS, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_TR_SRC_PF_COLS) {
            tuning.tr_src_prefetch_cols = parse_usize(Self::ENV_TR_SRC_PF_COLS, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_NT_STORES) {
            tuning.nontemporal_stores = parse_bool(Self::ENV_NT_STORES, &v)?;
        }
        Ok(tuning)
    }

    /// Whether prefetch hints are issued for a row of `iw` spatial positions.
    pub fn prefetch_enabled(&self, iw: usize) -> bool {
        iw > self.small_spatial
    }
}

fn parse_usize(var: &'static str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| TransError::InvalidTuning {
            var,
            value: value.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(TransError::InvalidTuning {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = Tuning::default();
        assert!(!t.prefetch_enabled(14));
        assert!(t.prefetch_enabled(15));
        assert!(!t.nontemporal_stores);
    }

    #[test]
    fn test_lookup_overrides() {
        let t = Tuning::from_lookup(|var| match var {
            Tuning::ENV_SMALL_SPATIAL => Some("32".into()),
            Tuning::ENV_NT_STORES => Some("true".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(t.small_spatial, 32);
        assert!(t.nontemporal_stores);
        assert_eq!(t.src_prefetch_rows, 16);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = Tuning::from_lookup(|var| {
            (var == Tuning::ENV_SRC_PF_ROWS).then(|| "many".to_string())
        })
        .unwrap_err();
        assert_eq!(
            err,
            TransError::InvalidTuning {
                var: "CONV_TRANS_SRC_PF_ROWS",
                value: "many".into()
            }
        );
    }
}
