//! CPU kernel implementations
//!
//! Low-level data-parallel kernels for the assembly phases. Sorting and
//! scatter/gather phases fan out through rayon; the run-length reduction is
//! a sequential compaction so that duplicate summation order is exactly the
//! sorted order.

use crate::layout::GlobalOrdinal;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Raw mutable pointer that may cross rayon task boundaries
///
/// Safety rests on the kernels writing disjoint index sets per task.
#[derive(Clone, Copy)]
pub(crate) struct SendMut<T>(pub *mut T);

unsafe impl<T> Send for SendMut<T> {}
unsafe impl<T> Sync for SendMut<T> {}

/// Which index of a raw contribution violated the global extent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BoundsKind {
    Row,
    Col,
}

/// First out-of-range contribution found by a bounds check
#[derive(Clone, Copy, Debug)]
pub(crate) struct Violation {
    pub pos: usize,
    pub kind: BoundsKind,
    pub index: GlobalOrdinal,
}

/// Expand per-segment row indices into one key per raw contribution
///
/// # Safety
/// `rows_out` must be valid for `row_start[last]` writes; segments are
/// disjoint by the layout contract.
pub(crate) unsafe fn expand_row_keys(
    row_indices: &[GlobalOrdinal],
    row_start: &[GlobalOrdinal],
    rows_out: *mut GlobalOrdinal,
) {
    let out = SendMut(rows_out);
    row_indices.par_iter().enumerate().for_each(|(s, &row)| {
        let out = out;
        let start = row_start[s] as usize;
        let end = row_start[s + 1] as usize;
        for i in start..end {
            unsafe {
                *out.0.add(i) = row;
            }
        }
    });
}

/// Find the first (lowest-position) out-of-range matrix contribution
pub(crate) fn find_matrix_violation(
    rows: &[GlobalOrdinal],
    cols: &[GlobalOrdinal],
    row_bound: GlobalOrdinal,
    col_bound: GlobalOrdinal,
    sentinel_col: Option<GlobalOrdinal>,
) -> Option<Violation> {
    (0..rows.len()).into_par_iter().find_map_first(|i| {
        if sentinel_col == Some(cols[i]) {
            return None;
        }
        if rows[i] < 0 || rows[i] >= row_bound {
            return Some(Violation {
                pos: i,
                kind: BoundsKind::Row,
                index: rows[i],
            });
        }
        if cols[i] < 0 || cols[i] >= col_bound {
            return Some(Violation {
                pos: i,
                kind: BoundsKind::Col,
                index: cols[i],
            });
        }
        None
    })
}

/// Find the first out-of-range rhs contribution
pub(crate) fn find_rhs_violation(
    rows: &[GlobalOrdinal],
    row_bound: GlobalOrdinal,
    sentinel_row: Option<GlobalOrdinal>,
) -> Option<Violation> {
    (0..rows.len()).into_par_iter().find_map_first(|i| {
        if sentinel_row == Some(rows[i]) {
            return None;
        }
        if rows[i] < 0 || rows[i] >= row_bound {
            return Some(Violation {
                pos: i,
                kind: BoundsKind::Row,
                index: rows[i],
            });
        }
        None
    })
}

#[inline]
fn matrix_key(
    p: usize,
    rows: &[GlobalOrdinal],
    cols: &[GlobalOrdinal],
    sentinel_col: Option<GlobalOrdinal>,
) -> (GlobalOrdinal, GlobalOrdinal) {
    if sentinel_col == Some(cols[p]) {
        // sentinel entries sort behind every valid key
        (GlobalOrdinal::MAX, GlobalOrdinal::MAX)
    } else {
        (rows[p], cols[p])
    }
}

/// Build the sort permutation for (row, col, value) triples
///
/// Keyed by (row, col); value bits break ties when `by_value`, the original
/// position otherwise, so the sort is always total and stable.
pub(crate) fn sort_matrix_permutation(
    rows: &[GlobalOrdinal],
    cols: &[GlobalOrdinal],
    values: &[f64],
    perm: &mut [GlobalOrdinal],
    by_value: bool,
    sentinel_col: Option<GlobalOrdinal>,
) {
    perm.par_iter_mut()
        .enumerate()
        .for_each(|(i, p)| *p = i as GlobalOrdinal);
    perm.par_sort_unstable_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        matrix_key(a, rows, cols, sentinel_col)
            .cmp(&matrix_key(b, rows, cols, sentinel_col))
            .then_with(|| {
                if by_value {
                    values[a].total_cmp(&values[b])
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.cmp(&b))
    });
}

#[inline]
fn rhs_key(p: usize, rows: &[GlobalOrdinal], sentinel_row: Option<GlobalOrdinal>) -> GlobalOrdinal {
    if sentinel_row == Some(rows[p]) {
        GlobalOrdinal::MAX
    } else {
        rows[p]
    }
}

/// Build the sort permutation for (row, value) pairs
pub(crate) fn sort_rhs_permutation(
    rows: &[GlobalOrdinal],
    values: &[f64],
    perm: &mut [GlobalOrdinal],
    by_value: bool,
    sentinel_row: Option<GlobalOrdinal>,
) {
    perm.par_iter_mut()
        .enumerate()
        .for_each(|(i, p)| *p = i as GlobalOrdinal);
    perm.par_sort_unstable_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        rhs_key(a, rows, sentinel_row)
            .cmp(&rhs_key(b, rows, sentinel_row))
            .then_with(|| {
                if by_value {
                    values[a].total_cmp(&values[b])
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| a.cmp(&b))
    });
}

/// Reorder `data` by the permutation, using `scratch` as gather space
///
/// # Safety
/// `data` and `scratch` must each be valid for `perm.len()` elements and
/// must not overlap.
pub(crate) unsafe fn apply_permutation<T: Copy + Send + Sync>(
    data: *mut T,
    perm: &[GlobalOrdinal],
    scratch: *mut T,
) {
    let n = perm.len();
    if n == 0 {
        return;
    }
    let src = unsafe { std::slice::from_raw_parts(data as *const T, n) };
    let dst = SendMut(scratch);
    perm.par_iter().enumerate().for_each(|(i, &p)| {
        let dst = dst;
        unsafe {
            *dst.0.add(i) = src[p as usize];
        }
    });
    unsafe {
        std::ptr::copy_nonoverlapping(scratch as *const T, data, n);
    }
}

/// Sum adjacent duplicate (row, col) runs; compact in place
///
/// Sentinel entries sit at the tail after sorting and are dropped.
/// Returns the surviving nonzero count.
pub(crate) fn reduce_matrix_triples(
    rows: &mut [GlobalOrdinal],
    cols: &mut [GlobalOrdinal],
    values: &mut [f64],
    sentinel_col: Option<GlobalOrdinal>,
) -> usize {
    let n = rows.len();
    let mut out = 0usize;
    let mut i = 0usize;
    while i < n {
        if sentinel_col == Some(cols[i]) {
            break;
        }
        let (row, col) = (rows[i], cols[i]);
        let mut acc = values[i];
        let mut j = i + 1;
        while j < n && rows[j] == row && cols[j] == col {
            acc += values[j];
            j += 1;
        }
        rows[out] = row;
        cols[out] = col;
        values[out] = acc;
        out += 1;
        i = j;
    }
    out
}

/// Sum adjacent duplicate rows; compact in place
///
/// Returns the distinct row count.
pub(crate) fn reduce_rhs_pairs(
    rows: &mut [GlobalOrdinal],
    values: &mut [f64],
    sentinel_row: Option<GlobalOrdinal>,
) -> usize {
    let n = rows.len();
    let mut out = 0usize;
    let mut i = 0usize;
    while i < n {
        if sentinel_row == Some(rows[i]) {
            break;
        }
        let row = rows[i];
        let mut acc = values[i];
        let mut j = i + 1;
        while j < n && rows[j] == row {
            acc += values[j];
            j += 1;
        }
        rows[out] = row;
        values[out] = acc;
        out += 1;
        i = j;
    }
    out
}

/// Count distinct rows among sorted, reduced row keys
pub(crate) fn count_distinct_rows(rows: &[GlobalOrdinal]) -> usize {
    if rows.is_empty() {
        return 0;
    }
    1 + (1..rows.len())
        .into_par_iter()
        .filter(|&i| rows[i] != rows[i - 1])
        .count()
}

/// Run-length encode reduced row keys into (row index, nonzero count)
///
/// Returns the number of distinct rows written.
pub(crate) fn fill_row_structure(
    rows: &[GlobalOrdinal],
    row_indices: &mut [GlobalOrdinal],
    row_counts: &mut [GlobalOrdinal],
) -> usize {
    let n = rows.len();
    let mut out = 0usize;
    let mut i = 0usize;
    while i < n {
        let row = rows[i];
        let mut j = i + 1;
        while j < n && rows[j] == row {
            j += 1;
        }
        row_indices[out] = row;
        row_counts[out] = (j - i) as GlobalOrdinal;
        out += 1;
        i = j;
    }
    out
}

/// Owned span `[lo, hi)` within sorted distinct rows
pub(crate) fn owned_span(
    rows: &[GlobalOrdinal],
    lower: GlobalOrdinal,
    upper: GlobalOrdinal,
) -> (usize, usize) {
    let lo = rows.partition_point(|&r| r < lower);
    let hi = rows.partition_point(|&r| r <= upper);
    (lo, hi)
}

/// Parallel sum of per-row nonzero counts
pub(crate) fn sum_counts(counts: &[GlobalOrdinal]) -> usize {
    counts.par_iter().map(|&c| c as usize).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_fills_each_segment() {
        let row_indices = [5, 2, 7];
        let row_start = [0, 2, 2, 5];
        let mut out = vec![0i64; 5];
        unsafe { expand_row_keys(&row_indices, &row_start, out.as_mut_ptr()) };
        assert_eq!(out, vec![5, 5, 7, 7, 7]);
    }

    #[test]
    fn sort_then_reduce_merges_duplicates() {
        let mut rows = vec![1, 0, 0, 1];
        let mut cols = vec![0, 3, 3, 0];
        let mut values = vec![2.0, 1.0, 4.0, -1.0];
        let mut perm = vec![0i64; 4];

        sort_matrix_permutation(&rows, &cols, &values, &mut perm, false, None);
        let mut scratch = vec![0i64; 4];
        unsafe {
            apply_permutation(rows.as_mut_ptr(), &perm, scratch.as_mut_ptr());
            apply_permutation(cols.as_mut_ptr(), &perm, scratch.as_mut_ptr());
            apply_permutation(
                values.as_mut_ptr(),
                &perm,
                scratch.as_mut_ptr() as *mut f64,
            );
        }

        let nnz = reduce_matrix_triples(&mut rows, &mut cols, &mut values, None);
        assert_eq!(nnz, 2);
        assert_eq!(&rows[..nnz], &[0, 1]);
        assert_eq!(&cols[..nnz], &[3, 0]);
        assert_eq!(&values[..nnz], &[5.0, 1.0]);
    }

    #[test]
    fn sentinel_entries_sort_last_and_are_dropped() {
        let mut rows = vec![0, 9, 0];
        let mut cols = vec![1, -1, 0];
        let mut values = vec![1.0, 99.0, 2.0];
        let mut perm = vec![0i64; 3];

        sort_matrix_permutation(&rows, &cols, &values, &mut perm, false, Some(-1));
        let mut scratch = vec![0i64; 3];
        unsafe {
            apply_permutation(rows.as_mut_ptr(), &perm, scratch.as_mut_ptr());
            apply_permutation(cols.as_mut_ptr(), &perm, scratch.as_mut_ptr());
            apply_permutation(
                values.as_mut_ptr(),
                &perm,
                scratch.as_mut_ptr() as *mut f64,
            );
        }
        assert_eq!(cols[2], -1);

        let nnz = reduce_matrix_triples(&mut rows, &mut cols, &mut values, Some(-1));
        assert_eq!(nnz, 2);
        assert_eq!(&cols[..nnz], &[0, 1]);
    }

    #[test]
    fn value_tie_key_is_input_order_independent() {
        let rows = [0, 0, 0];
        let cols = [2, 2, 2];
        let fwd = [3.0, 1.0, 2.0];
        let rev = [2.0, 1.0, 3.0];

        let mut perm_fwd = vec![0i64; 3];
        let mut perm_rev = vec![0i64; 3];
        sort_matrix_permutation(&rows, &cols, &fwd, &mut perm_fwd, true, None);
        sort_matrix_permutation(&rows, &cols, &rev, &mut perm_rev, true, None);

        let ordered_fwd: Vec<f64> = perm_fwd.iter().map(|&p| fwd[p as usize]).collect();
        let ordered_rev: Vec<f64> = perm_rev.iter().map(|&p| rev[p as usize]).collect();
        assert_eq!(ordered_fwd, ordered_rev);
    }

    #[test]
    fn row_structure_and_span() {
        let rows = [2, 2, 4, 7, 7, 7];
        let mut idx = vec![0i64; 3];
        let mut counts = vec![0i64; 3];
        assert_eq!(fill_row_structure(&rows, &mut idx, &mut counts), 3);
        assert_eq!(idx, vec![2, 4, 7]);
        assert_eq!(counts, vec![2, 1, 3]);

        assert_eq!(owned_span(&idx, 3, 6), (1, 2));
        assert_eq!(owned_span(&idx, 0, 10), (0, 3));
        assert_eq!(owned_span(&idx, 8, 10), (3, 3));
        assert_eq!(sum_counts(&counts), 6);
    }
}
