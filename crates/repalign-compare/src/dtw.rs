//! Dynamic time warping between two scalar series.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use repalign_core::PlateauPolicy;

/// Optimal warping path and its accumulated cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtwAlignment {
    /// `(reference_index, query_index)` pairs, monotonic in both indices
    pub path: Vec<(usize, usize)>,
    pub distance: f64,
}

/// Align `query` against `reference` under absolute-difference cost.
///
/// The path starts at `(0, 0)`, ends at the last index of both series and advances
/// by at most one step in each index. On equal accumulated cost the backtrack
/// prefers the diagonal, then a reference-only step, then a query-only step.
/// Returns `None` when either series is empty.
pub fn dtw_path(query: &[f64], reference: &[f64]) -> Option<DtwAlignment> {
    let (n, m) = (reference.len(), query.len());
    if n == 0 || m == 0 {
        return None;
    }

    let mut cost = Array2::from_elem((n, m), f64::INFINITY);
    for r in 0..n {
        for q in 0..m {
            let local = (reference[r] - query[q]).abs();
            let best_prev = match (r, q) {
                (0, 0) => 0.0,
                (0, _) => cost[[0, q - 1]],
                (_, 0) => cost[[r - 1, 0]],
                _ => cost[[r - 1, q - 1]]
                    .min(cost[[r - 1, q]])
                    .min(cost[[r, q - 1]]),
            };
            cost[[r, q]] = local + best_prev;
        }
    }

    let mut path = Vec::with_capacity(n + m);
    let (mut r, mut q) = (n - 1, m - 1);
    path.push((r, q));
    while (r, q) != (0, 0) {
        if r == 0 {
            q -= 1;
        } else if q == 0 {
            r -= 1;
        } else {
            let diagonal = cost[[r - 1, q - 1]];
            let reference_only = cost[[r - 1, q]];
            let query_only = cost[[r, q - 1]];

            if diagonal <= reference_only && diagonal <= query_only {
                r -= 1;
                q -= 1;
            } else if reference_only <= query_only {
                r -= 1;
            } else {
                q -= 1;
            }
        }
        path.push((r, q));
    }
    path.reverse();

    Some(DtwAlignment {
        path,
        distance: cost[[n - 1, m - 1]],
    })
}

/// Collapse a warping path to exactly one query index per reference index.
///
/// A reference index matched by several consecutive query indices keeps the last
/// or the first of them, depending on `policy`. The output is indexed by
/// reference position.
pub fn reduce_path(path: &[(usize, usize)], policy: PlateauPolicy) -> Vec<usize> {
    let mut reduced: Vec<usize> = Vec::new();
    let mut current: Option<usize> = None;

    for &(r, q) in path {
        if current == Some(r) {
            if policy == PlateauPolicy::KeepLast {
                if let Some(last) = reduced.last_mut() {
                    *last = q;
                }
            }
        } else {
            reduced.push(q);
            current = Some(r);
        }
    }

    reduced
}
