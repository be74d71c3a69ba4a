//! Device kernel interface for the assembly phases
//!
//! `AssemblyOps` is the seam between the backend-agnostic assemblers and a
//! backend's data-parallel kernels: one method per assembly phase, executed
//! to completion before the next phase reads its output. The CPU reference
//! backend implements it with rayon; a GPU backend implements the same
//! phases as kernel launches on its stream.
//!
//! # Workspace contract
//!
//! Every phase shares one borrowed [`Workspace`](crate::pool::Workspace),
//! carved into three equal regions of `n` 8-byte elements (`n` = raw
//! contribution count):
//!
//! ```text
//! region 0: expanded row keys, one per raw contribution; after reduction
//!           its prefix holds the distinct (row, col) run keys
//! region 1: sort permutation
//! region 2: gather scratch for applying the permutation
//! ```

use crate::buffer::DeviceBuffer;
use crate::error::Result;
use crate::layout::{GlobalOrdinal, RowLayout, RowRange};
use crate::pool::Workspace;
use crate::runtime::{Runtime, RuntimeClient};

/// Scratch elements needed to assemble `n` raw contributions
pub fn required_workspace_len(n: usize) -> usize {
    3 * n
}

/// Data-parallel kernels for one backend
pub trait AssemblyOps<R: Runtime>: RuntimeClient<R> {
    /// Expand per-segment row indices into one row key per raw contribution
    ///
    /// Writes `layout.total_contributions()` keys into workspace region 0.
    fn expand_row_keys(&self, layout: &RowLayout<R>, ws: Workspace) -> Result<()>;

    /// Validate expanded row keys and raw columns against global extents
    ///
    /// Entries whose column equals the configured sentinel are exempt.
    /// Out-of-range indices are a configuration error, never clipped.
    fn check_matrix_bounds(
        &self,
        cols: &DeviceBuffer<GlobalOrdinal, R>,
        row_bound: GlobalOrdinal,
        col_bound: GlobalOrdinal,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()>;

    /// Validate `n` expanded row keys against the global row extent
    ///
    /// Entries whose row key equals the configured sentinel are exempt.
    fn check_rhs_bounds(
        &self,
        n: usize,
        row_bound: GlobalOrdinal,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()>;

    /// Stable segmented sort of (row, col, value) triples by (row, col)
    ///
    /// With `by_value`, the value participates as a deterministic tie key so
    /// that duplicate (row, col) runs always sum in the same order
    /// regardless of input order. Without it, ties keep input order.
    /// Sentinel-column entries sort behind every valid key.
    fn sort_matrix_triples(
        &self,
        cols: &mut DeviceBuffer<GlobalOrdinal, R>,
        values: &mut DeviceBuffer<f64, R>,
        by_value: bool,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()>;

    /// Merge adjacent duplicate (row, col) entries by summation
    ///
    /// Compacts columns/values (and the region-0 row keys) in place,
    /// discarding sentinel entries, and returns the surviving nonzero
    /// count. Requires the triples to be sorted.
    fn reduce_matrix_triples(
        &self,
        cols: &mut DeviceBuffer<GlobalOrdinal, R>,
        values: &mut DeviceBuffer<f64, R>,
        sentinel_col: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<usize>;

    /// Stable sort of (row, value) pairs by row; see `sort_matrix_triples`
    fn sort_rhs_pairs(
        &self,
        values: &mut DeviceBuffer<f64, R>,
        by_value: bool,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<()>;

    /// Merge duplicate rows by summation; see `reduce_matrix_triples`
    ///
    /// Returns the number of distinct rows, which is also the compacted
    /// pair count.
    fn reduce_rhs_pairs(
        &self,
        values: &mut DeviceBuffer<f64, R>,
        sentinel_row: Option<GlobalOrdinal>,
        ws: Workspace,
    ) -> Result<usize>;

    /// Count distinct rows among the `nnz` reduced keys in region 0
    fn count_distinct_rows(&self, nnz: usize, ws: Workspace) -> Result<usize>;

    /// Fill distinct row indices and per-row nonzero counts from region 0
    fn fill_row_structure(
        &self,
        nnz: usize,
        row_indices: &mut DeviceBuffer<GlobalOrdinal, R>,
        row_counts: &mut DeviceBuffer<GlobalOrdinal, R>,
        ws: Workspace,
    ) -> Result<()>;

    /// Locate the owned span `[lo, hi)` within sorted distinct rows
    ///
    /// Rows before `lo` and from `hi` on are shared; rows in between fall
    /// inside `range`.
    fn owned_row_span(
        &self,
        row_indices: &DeviceBuffer<GlobalOrdinal, R>,
        num_rows: usize,
        range: RowRange,
    ) -> Result<(usize, usize)>;

    /// Sum per-row nonzero counts over `[lo, hi)`
    fn sum_row_counts(
        &self,
        row_counts: &DeviceBuffer<GlobalOrdinal, R>,
        lo: usize,
        hi: usize,
    ) -> Result<usize>;
}
