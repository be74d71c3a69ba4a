//! `AssemblyOps` implementation for the CPU backend
//!
//! On this backend a device handle is a host pointer, so each phase wraps
//! the handles in slices and calls straight into the rayon kernels. Every
//! method is synchronous; by the time it returns its output is visible to
//! the next phase.

use super::client::CpuClient;
use super::kernels;
use super::runtime::CpuRuntime;
use crate::buffer::DeviceBuffer;
use crate::error::{Error, Result};
use crate::layout::{GlobalOrdinal, RowLayout, RowRange};
use crate::ops::AssemblyOps;
use crate::pool::Workspace;

/// View a raw handle as an element slice
///
/// # Safety
/// `handle` must point to at least `len` valid elements for the duration of
/// the borrow, with no aliasing mutable access.
unsafe fn as_slice<'a, T>(handle: u64, len: usize) -> &'a [T] {
    if len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(handle as *const T, len) }
}

/// Mutable counterpart of [`as_slice`]
///
/// # Safety
/// Same as `as_slice`, plus exclusivity of the mutable borrow.
unsafe fn as_mut_slice<'a, T>(handle: u64, len: usize) -> &'a mut [T] {
    if len == 0 {
        return &mut [];
    }
    unsafe { std::slice::from_raw_parts_mut(handle as *mut T, len) }
}

impl AssemblyOps<CpuRuntime> for CpuClient {
    fn expand_row_keys(&self, layout: &RowLayout<CpuRuntime>, ws: Workspace) -> Result<()> {
        let n = layout.total_contributions();
        unsafe {
            let row_indices: &[GlobalOrdinal] =
                as_slice(layout.row_indices().handle(), layout.num_segments());
            let row_start: &[GlobalOrdinal] =
                as_slice(layout.row_start().handle(), layout.num_segments() + 1);
            kernels::expand_row_keys(row_indices, row_start, ws.region(0, n) as *mut GlobalOrdinal);
        }
        Ok(())
    }

    fn check_matrix_bounds(
        &self,
        cols: &DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        row_bound: GlobalOrdinal,
        col_bound: GlobalOrdinal,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()> {
        let n = cols.len();
        let violation = unsafe {
            let rows: &[GlobalOrdinal] = as_slice(ws.region(0, n), n);
            let cols: &[GlobalOrdinal] = as_slice(cols.handle(), n);
            kernels::find_matrix_violation(rows, cols, row_bound, col_bound, sentinel_col)
        };
        match violation {
            None => Ok(()),
            Some(v) => Err(Error::IndexOutOfBounds {
                what: match v.kind {
                    kernels::BoundsKind::Row => "row",
                    kernels::BoundsKind::Col => "column",
                },
                index: v.index,
                bound: match v.kind {
                    kernels::BoundsKind::Row => row_bound,
                    kernels::BoundsKind::Col => col_bound,
                },
                pos: v.pos,
            }),
        }
    }

    fn check_rhs_bounds(
        &self,
        n: usize,
        row_bound: GlobalOrdinal,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()> {
        let violation = unsafe {
            let rows: &[GlobalOrdinal] = as_slice(ws.region(0, n), n);
            kernels::find_rhs_violation(rows, row_bound, sentinel_row)
        };
        match violation {
            None => Ok(()),
            Some(v) => Err(Error::IndexOutOfBounds {
                what: "row",
                index: v.index,
                bound: row_bound,
                pos: v.pos,
            }),
        }
    }

    fn sort_matrix_triples(
        &self,
        cols: &mut DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        values: &mut DeviceBuffer<f64, CpuRuntime>,
        by_value: bool,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()> {
        let n = cols.len();
        unsafe {
            let perm: &mut [GlobalOrdinal] = as_mut_slice(ws.region(1, n), n);
            {
                let rows: &[GlobalOrdinal] = as_slice(ws.region(0, n), n);
                let col_keys: &[GlobalOrdinal] = as_slice(cols.handle(), n);
                let vals: &[f64] = as_slice(values.handle(), n);
                kernels::sort_matrix_permutation(
                    rows,
                    col_keys,
                    vals,
                    perm,
                    by_value,
                    sentinel_col,
                );
            }
            let scratch = ws.region(2, n);
            kernels::apply_permutation(
                ws.region(0, n) as *mut GlobalOrdinal,
                perm,
                scratch as *mut GlobalOrdinal,
            );
            kernels::apply_permutation(
                cols.handle() as *mut GlobalOrdinal,
                perm,
                scratch as *mut GlobalOrdinal,
            );
            kernels::apply_permutation(values.handle() as *mut f64, perm, scratch as *mut f64);
        }
        Ok(())
    }

    fn reduce_matrix_triples(
        &self,
        cols: &mut DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        values: &mut DeviceBuffer<f64, CpuRuntime>,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<usize> {
        let n = cols.len();
        let nnz = unsafe {
            let rows: &mut [GlobalOrdinal] = as_mut_slice(ws.region(0, n), n);
            let col_keys: &mut [GlobalOrdinal] = as_mut_slice(cols.handle(), n);
            let vals: &mut [f64] = as_mut_slice(values.handle(), n);
            kernels::reduce_matrix_triples(rows, col_keys, vals, sentinel_col)
        };
        Ok(nnz)
    }

    fn sort_rhs_pairs(
        &self,
        values: &mut DeviceBuffer<f64, CpuRuntime>,
        by_value: bool,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()> {
        let n = values.len();
        unsafe {
            let perm: &mut [GlobalOrdinal] = as_mut_slice(ws.region(1, n), n);
            {
                let rows: &[GlobalOrdinal] = as_slice(ws.region(0, n), n);
                let vals: &[f64] = as_slice(values.handle(), n);
                kernels::sort_rhs_permutation(rows, vals, perm, by_value, sentinel_row);
            }
            let scratch = ws.region(2, n);
            kernels::apply_permutation(
                ws.region(0, n) as *mut GlobalOrdinal,
                perm,
                scratch as *mut GlobalOrdinal,
            );
            kernels::apply_permutation(values.handle() as *mut f64, perm, scratch as *mut f64);
        }
        Ok(())
    }

    fn reduce_rhs_pairs(
        &self,
        values: &mut DeviceBuffer<f64, CpuRuntime>,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<usize> {
        let n = values.len();
        let num_rows = unsafe {
            let rows: &mut [GlobalOrdinal] = as_mut_slice(ws.region(0, n), n);
            let vals: &mut [f64] = as_mut_slice(values.handle(), n);
            kernels::reduce_rhs_pairs(rows, vals, sentinel_row)
        };
        Ok(num_rows)
    }

    fn count_distinct_rows(&self, nnz: usize, ws: Workspace) -> Result<usize> {
        let count = unsafe {
            let rows: &[GlobalOrdinal] = as_slice(ws.region(0, ws.len() / 3), nnz);
            kernels::count_distinct_rows(rows)
        };
        Ok(count)
    }

    fn fill_row_structure(
        &self,
        nnz: usize,
        row_indices: &mut DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        row_counts: &mut DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        ws: Workspace,
    ) -> Result<()> {
        unsafe {
            let rows: &[GlobalOrdinal] = as_slice(ws.region(0, ws.len() / 3), nnz);
            let idx: &mut [GlobalOrdinal] = as_mut_slice(row_indices.handle(), row_indices.len());
            let counts: &mut [GlobalOrdinal] = as_mut_slice(row_counts.handle(), row_counts.len());
            kernels::fill_row_structure(rows, idx, counts);
        }
        Ok(())
    }

    fn owned_row_span(
        &self,
        row_indices: &DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        num_rows: usize,
        range: RowRange,
    ) -> Result<(usize, usize)> {
        let span = unsafe {
            let rows: &[GlobalOrdinal] = as_slice(row_indices.handle(), num_rows);
            kernels::owned_span(rows, range.lower(), range.upper())
        };
        Ok(span)
    }

    fn sum_row_counts(
        &self,
        row_counts: &DeviceBuffer<GlobalOrdinal, CpuRuntime>,
        lo: usize,
        hi: usize,
    ) -> Result<usize> {
        let total = unsafe {
            let counts: &[GlobalOrdinal] = as_slice(row_counts.handle(), row_counts.len());
            kernels::sum_counts(&counts[lo..hi])
        };
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::required_workspace_len;
    use crate::pool::WorkspacePool;
    use crate::runtime::Runtime;

    fn client() -> CpuClient {
        let device = CpuRuntime::default_device();
        CpuRuntime::default_client(&device)
    }

    #[test]
    fn full_matrix_phase_sequence() {
        let client = client();
        let device = client.device.clone();

        // two segments feeding rows 1 and 0, three + two raw contributions
        let layout = RowLayout::<CpuRuntime>::from_host(&[1, 0], &[0, 3, 5], &device).unwrap();
        let n = layout.total_contributions();

        let pool =
            WorkspacePool::<CpuRuntime>::new("test", required_workspace_len(n), 0, &client);
        let ws = pool.workspace();

        let mut cols =
            DeviceBuffer::<GlobalOrdinal, CpuRuntime>::from_slice(&[0, 1, 0, 2, 2], &device);
        let mut values =
            DeviceBuffer::<f64, CpuRuntime>::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0], &device);

        client.expand_row_keys(&layout, ws).unwrap();
        client.check_matrix_bounds(&cols, 2, 3, None, ws).unwrap();
        client
            .sort_matrix_triples(&mut cols, &mut values, false, None, ws)
            .unwrap();
        let nnz = client
            .reduce_matrix_triples(&mut cols, &mut values, None, ws)
            .unwrap();

        // row 0: col 2 summed (4+5); row 1: cols 0 (1+3) and 1
        assert_eq!(nnz, 3);
        assert_eq!(&cols.to_vec()[..nnz], &[2, 0, 1]);
        assert_eq!(&values.to_vec()[..nnz], &[9.0, 4.0, 2.0]);

        assert_eq!(client.count_distinct_rows(nnz, ws).unwrap(), 2);

        let mut row_indices = DeviceBuffer::<GlobalOrdinal, CpuRuntime>::zeroed(2, &device);
        let mut row_counts = DeviceBuffer::<GlobalOrdinal, CpuRuntime>::zeroed(2, &device);
        client
            .fill_row_structure(nnz, &mut row_indices, &mut row_counts, ws)
            .unwrap();
        assert_eq!(row_indices.to_vec(), vec![0, 1]);
        assert_eq!(row_counts.to_vec(), vec![1, 2]);

        let range = RowRange::new(0, 0).unwrap();
        let (lo, hi) = client.owned_row_span(&row_indices, 2, range).unwrap();
        assert_eq!((lo, hi), (0, 1));
        assert_eq!(client.sum_row_counts(&row_counts, lo, hi).unwrap(), 1);
        assert_eq!(client.sum_row_counts(&row_counts, hi, 2).unwrap(), 2);
    }

    #[test]
    fn bounds_check_reports_first_violation() {
        let client = client();
        let device = client.device.clone();

        let layout = RowLayout::<CpuRuntime>::from_host(&[0, 5], &[0, 1, 2], &device).unwrap();
        let n = layout.total_contributions();
        let pool =
            WorkspacePool::<CpuRuntime>::new("test", required_workspace_len(n), 0, &client);
        let ws = pool.workspace();

        let cols = DeviceBuffer::<GlobalOrdinal, CpuRuntime>::from_slice(&[0, 0], &device);
        client.expand_row_keys(&layout, ws).unwrap();

        let err = client
            .check_matrix_bounds(&cols, 4, 4, None, ws)
            .unwrap_err();
        match err {
            Error::IndexOutOfBounds {
                what, index, pos, ..
            } => {
                assert_eq!(what, "row");
                assert_eq!(index, 5);
                assert_eq!(pos, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rhs_phase_sequence_groups_duplicates() {
        let client = client();
        let device = client.device.clone();

        let layout = RowLayout::<CpuRuntime>::from_host(&[3, 1, 3], &[0, 1, 2, 4], &device).unwrap();
        let n = layout.total_contributions();
        let pool =
            WorkspacePool::<CpuRuntime>::new("test", required_workspace_len(n), 0, &client);
        let ws = pool.workspace();

        let mut values =
            DeviceBuffer::<f64, CpuRuntime>::from_slice(&[1.0, 2.0, 3.0, 4.0], &device);

        client.expand_row_keys(&layout, ws).unwrap();
        client.check_rhs_bounds(n, 4, None, ws).unwrap();
        client
            .sort_rhs_pairs(&mut values, false, None, ws)
            .unwrap();
        let num_rows = client.reduce_rhs_pairs(&mut values, None, ws).unwrap();

        assert_eq!(num_rows, 2);
        assert_eq!(&values.to_vec()[..num_rows], &[2.0, 8.0]);
    }
}
