//! Splitting work between the threads of a team.

/// Contiguous share `[start, end)` of `n` items for thread `tid` of `team`.
///
/// Shares are disjoint, cover `0..n` in thread order, and differ in size by
/// at most one; the larger shares go to the lower thread ids.
pub fn balance211(n: usize, team: usize, tid: usize) -> (usize, usize) {
    if team <= 1 || n == 0 {
        return (0, n);
    }

    let n1 = n.div_ceil(team);
    let n2 = n1 - 1;
    let t1 = n - n2 * team;
    let len = if tid < t1 { n1 } else { n2 };
    let start = if tid <= t1 {
        tid * n1
    } else {
        t1 * n1 + (tid - t1) * n2
    };
    (start, start + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(balance211(12, 4, 0), (0, 3));
        assert_eq!(balance211(12, 4, 3), (9, 12));
    }

    #[test]
    fn test_uneven_split_front_loaded() {
        let shares: Vec<_> = (0..4).map(|t| balance211(10, 4, t)).collect();
        assert_eq!(shares, vec![(0, 3), (3, 6), (6, 8), (8, 10)]);
    }

    #[test]
    fn test_more_threads_than_items() {
        let shares: Vec<_> = (0..5).map(|t| balance211(3, 5, t)).collect();
        assert_eq!(shares, vec![(0, 1), (1, 2), (2, 3), (3, 3), (3, 3)]);
    }

    #[test]
    fn test_covers_range() {
        for n in 0..40 {
            for team in 1..9 {
                let mut next = 0;
                for tid in 0..team {
                    let (s, e) = balance211(n, team, tid);
                    assert_eq!(s, next, "n={n}, team={team}, tid={tid}");
                    assert!(e >= s);
                    next = e;
                }
                assert_eq!(next, n);
            }
        }
    }
}
