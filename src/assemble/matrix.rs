//! Sparse-matrix assembler

use super::block::{CsrBlock, CsrHostBlock, CsrHostView};
use super::AssemblyStats;
use crate::buffer::DeviceBuffer;
use crate::error::{Error, Result};
use crate::layout::{GlobalOrdinal, RowLayout, RowRange};
use crate::ops::{required_workspace_len, AssemblyOps};
use crate::pool::Workspace;
use crate::runtime::{Runtime, RuntimeClient};
use std::time::Instant;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Persistent staging copies of the caller's raw input
///
/// Sort and reduction mutate these in place so the caller's device arrays
/// come back untouched.
struct Staging<R: Runtime> {
    cols: DeviceBuffer<GlobalOrdinal, R>,
    values: DeviceBuffer<f64, R>,
}

impl<R: Runtime> Staging<R> {
    fn new(n: usize, device: &R::Device) -> Self {
        Self {
            cols: DeviceBuffer::zeroed(n, device),
            values: DeviceBuffer::zeroed(n, device),
        }
    }

    fn size_bytes(&self) -> usize {
        self.cols.size_bytes() + self.values.size_bytes()
    }
}

/// Combined/owned/shared blocks plus their pinned mirrors
///
/// Sized once, to the counts observed on the first assembly. The owned and
/// shared blocks get the combined capacity because the split point can move
/// between calls as column sets change.
struct Blocks<R: Runtime> {
    combined: CsrBlock<R>,
    owned: CsrBlock<R>,
    shared: CsrBlock<R>,
    host_combined: CsrHostBlock<R>,
    host_owned: CsrHostBlock<R>,
    host_shared: CsrHostBlock<R>,
    cap_rows: usize,
    cap_nnz: usize,
}

impl<R: Runtime> Blocks<R> {
    fn new(cap_rows: usize, cap_nnz: usize, device: &R::Device) -> Self {
        Self {
            combined: CsrBlock::with_capacity(cap_rows, cap_nnz, device),
            owned: CsrBlock::with_capacity(cap_rows, cap_nnz, device),
            shared: CsrBlock::with_capacity(cap_rows, cap_nnz, device),
            host_combined: CsrHostBlock::with_capacity(cap_rows, cap_nnz, device),
            host_owned: CsrHostBlock::with_capacity(cap_rows, cap_nnz, device),
            host_shared: CsrHostBlock::with_capacity(cap_rows, cap_nnz, device),
            cap_rows,
            cap_nnz,
        }
    }

    fn size_bytes(&self) -> usize {
        self.combined.size_bytes()
            + self.owned.size_bytes()
            + self.shared.size_bytes()
            + self.host_combined.size_bytes()
            + self.host_owned.size_bytes()
            + self.host_shared.size_bytes()
    }

    fn invalidate_host(&mut self) {
        self.host_combined.invalidate();
        self.host_owned.invalidate();
        self.host_shared.invalidate();
    }
}

/// Consolidates raw (row, col, value) triples into per-rank CSR structures
///
/// Constructed once per linear-system definition and driven once per
/// nonlinear iteration: bind a workspace, `assemble()` the current raw
/// contributions, then stage whichever of the combined/owned/shared
/// structures the solver adapter needs.
pub struct MatrixAssembler<R: Runtime>
where
    R::Client: AssemblyOps<R>,
{
    name: String,
    rank: i32,
    sort_by_value: bool,
    row_range: RowRange,
    col_range: RowRange,
    global_num_rows: GlobalOrdinal,
    global_num_cols: GlobalOrdinal,
    sentinel_col: Option<GlobalOrdinal>,
    layout: RowLayout<R>,
    n: usize,
    client: R::Client,
    workspace: Option<Workspace>,
    staging: Option<Staging<R>>,
    blocks: Option<Blocks<R>>,
    assembled: bool,
    stats: AssemblyStats,
}

impl<R: Runtime> MatrixAssembler<R>
where
    R::Client: AssemblyOps<R>,
{
    /// Create an assembler for one matrix definition
    ///
    /// `row_range`/`col_range` must lie inside the global extents and
    /// `num_contributions` must match the layout's total. A configured
    /// bogus-column sentinel must lie outside `[0, global_num_cols)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        sort_by_value: bool,
        row_range: RowRange,
        col_range: RowRange,
        global_num_rows: GlobalOrdinal,
        global_num_cols: GlobalOrdinal,
        num_contributions: usize,
        rank: i32,
        layout: RowLayout<R>,
        bogus_col: Option<GlobalOrdinal>,
        client: R::Client,
    ) -> Result<Self> {
        if row_range.upper() >= global_num_rows {
            return Err(Error::InvalidRange {
                what: "row",
                lower: row_range.lower(),
                upper: row_range.upper(),
            });
        }
        if col_range.upper() >= global_num_cols {
            return Err(Error::InvalidRange {
                what: "column",
                lower: col_range.lower(),
                upper: col_range.upper(),
            });
        }
        if layout.total_contributions() != num_contributions {
            return Err(Error::SizeMismatch {
                what: "raw contributions",
                expected: num_contributions,
                got: layout.total_contributions(),
            });
        }
        if let Some(s) = bogus_col {
            if (0..global_num_cols).contains(&s) {
                return Err(Error::InvalidSentinel {
                    what: "column",
                    index: s,
                    bound: global_num_cols,
                });
            }
        }

        let name = name.into();
        log::debug!(
            "matrix assembler '{}' (rank {}): rows [{}, {}], cols [{}, {}], {} raw contributions",
            name,
            rank,
            row_range.lower(),
            row_range.upper(),
            col_range.lower(),
            col_range.upper(),
            num_contributions,
        );
        Ok(Self {
            name,
            rank,
            sort_by_value,
            row_range,
            col_range,
            global_num_rows,
            global_num_cols,
            sentinel_col: bogus_col,
            n: num_contributions,
            layout,
            client,
            workspace: None,
            staging: None,
            blocks: None,
            assembled: false,
            stats: AssemblyStats::default(),
        })
    }

    /// Scratch elements one assembly of `num_contributions` raw entries needs
    pub fn required_workspace_len(num_contributions: usize) -> usize {
        required_workspace_len(num_contributions)
    }

    /// Borrow pool scratch for subsequent `assemble()` calls
    pub fn bind_workspace(&mut self, ws: Workspace) {
        self.workspace = Some(ws);
    }

    /// Consolidate one batch of raw columns and values
    ///
    /// Both arrays must hold one entry per raw contribution, aligned with
    /// the constructor-supplied layout. The caller's arrays are copied and
    /// never mutated. Overwrites the previous assembly in place and
    /// invalidates all host views.
    pub fn assemble(
        &mut self,
        cols: &DeviceBuffer<GlobalOrdinal, R>,
        values: &DeviceBuffer<f64, R>,
    ) -> Result<()> {
        let ws = self.workspace.ok_or(Error::WorkspaceNotBound)?;
        let needed = required_workspace_len(self.n);
        if ws.len() < needed {
            return Err(Error::WorkspaceTooSmall {
                needed,
                available: ws.len(),
            });
        }
        if cols.len() != self.n {
            return Err(Error::SizeMismatch {
                what: "columns",
                expected: self.n,
                got: cols.len(),
            });
        }
        if values.len() != self.n {
            return Err(Error::SizeMismatch {
                what: "values",
                expected: self.n,
                got: values.len(),
            });
        }

        let start = Instant::now();
        self.assembled = false;
        if let Some(blocks) = self.blocks.as_mut() {
            blocks.invalidate_host();
        }

        let device = self.client.device().clone();
        let staging = self
            .staging
            .get_or_insert_with(|| Staging::new(self.n, &device));
        staging.cols.copy_from(cols, 0, 0, self.n);
        staging.values.copy_from(values, 0, 0, self.n);

        self.client.expand_row_keys(&self.layout, ws)?;
        self.client.check_matrix_bounds(
            &staging.cols,
            self.global_num_rows,
            self.global_num_cols,
            self.sentinel_col,
            ws,
        )?;
        self.client.sort_matrix_triples(
            &mut staging.cols,
            &mut staging.values,
            self.sort_by_value,
            self.sentinel_col,
            ws,
        )?;
        let nnz = self.client.reduce_matrix_triples(
            &mut staging.cols,
            &mut staging.values,
            self.sentinel_col,
            ws,
        )?;
        let num_rows = self.client.count_distinct_rows(nnz, ws)?;

        // sized once, to the first observed counts
        let name = &self.name;
        let blocks = self.blocks.get_or_insert_with(|| {
            log::debug!(
                "matrix assembler '{name}': first assembly reserves {num_rows} rows, {nnz} nonzeros",
            );
            Blocks::new(num_rows, nnz, &device)
        });
        if num_rows > blocks.cap_rows {
            return Err(Error::CapacityExceeded {
                what: "matrix rows",
                needed: num_rows,
                reserved: blocks.cap_rows,
            });
        }
        if nnz > blocks.cap_nnz {
            return Err(Error::CapacityExceeded {
                what: "matrix nonzeros",
                needed: nnz,
                reserved: blocks.cap_nnz,
            });
        }

        blocks.combined.num_rows = num_rows;
        blocks.combined.num_nonzeros = nnz;
        self.client.fill_row_structure(
            nnz,
            &mut blocks.combined.row_indices,
            &mut blocks.combined.row_counts,
            ws,
        )?;
        blocks.combined.cols.copy_from(&staging.cols, 0, 0, nnz);
        blocks.combined.values.copy_from(&staging.values, 0, 0, nnz);

        // rows before `lo` and from `hi` on belong to other ranks
        let (lo, hi) = self
            .client
            .owned_row_span(&blocks.combined.row_indices, num_rows, self.row_range)?;
        let prefix_nnz = self
            .client
            .sum_row_counts(&blocks.combined.row_counts, 0, lo)?;
        let owned_nnz = self
            .client
            .sum_row_counts(&blocks.combined.row_counts, lo, hi)?;

        let owned_rows = hi - lo;
        blocks.owned.num_rows = owned_rows;
        blocks.owned.num_nonzeros = owned_nnz;
        blocks
            .owned
            .row_indices
            .copy_from(&blocks.combined.row_indices, lo, 0, owned_rows);
        blocks
            .owned
            .row_counts
            .copy_from(&blocks.combined.row_counts, lo, 0, owned_rows);
        blocks
            .owned
            .cols
            .copy_from(&blocks.combined.cols, prefix_nnz, 0, owned_nnz);
        blocks
            .owned
            .values
            .copy_from(&blocks.combined.values, prefix_nnz, 0, owned_nnz);

        let tail_rows = num_rows - hi;
        let tail_nnz = nnz - prefix_nnz - owned_nnz;
        blocks.shared.num_rows = lo + tail_rows;
        blocks.shared.num_nonzeros = prefix_nnz + tail_nnz;
        blocks
            .shared
            .row_indices
            .copy_from(&blocks.combined.row_indices, 0, 0, lo);
        blocks
            .shared
            .row_indices
            .copy_from(&blocks.combined.row_indices, hi, lo, tail_rows);
        blocks
            .shared
            .row_counts
            .copy_from(&blocks.combined.row_counts, 0, 0, lo);
        blocks
            .shared
            .row_counts
            .copy_from(&blocks.combined.row_counts, hi, lo, tail_rows);
        blocks
            .shared
            .cols
            .copy_from(&blocks.combined.cols, 0, 0, prefix_nnz);
        blocks.shared.cols.copy_from(
            &blocks.combined.cols,
            prefix_nnz + owned_nnz,
            prefix_nnz,
            tail_nnz,
        );
        blocks
            .shared
            .values
            .copy_from(&blocks.combined.values, 0, 0, prefix_nnz);
        blocks.shared.values.copy_from(
            &blocks.combined.values,
            prefix_nnz + owned_nnz,
            prefix_nnz,
            tail_nnz,
        );

        self.client.synchronize();
        self.assembled = true;
        let elapsed = start.elapsed().as_secs_f64();
        self.stats.num_assembles += 1;
        self.stats.assemble_seconds += elapsed;
        log::trace!(
            "matrix assembler '{}' (rank {}): {} rows ({} owned), {} nonzeros, {:.3} ms",
            self.name,
            self.rank,
            num_rows,
            owned_rows,
            nnz,
            elapsed * 1e3,
        );
        Ok(())
    }

    fn stage(&mut self, which: StageTarget) -> Result<()> {
        if !self.assembled {
            return Err(Error::NotAssembled);
        }
        let blocks = self.blocks.as_mut().ok_or(Error::NotAssembled)?;
        let start = Instant::now();
        match which {
            StageTarget::Combined => blocks.host_combined.stage(&blocks.combined)?,
            StageTarget::Owned => blocks.host_owned.stage(&blocks.owned)?,
            StageTarget::Shared => blocks.host_shared.stage(&blocks.shared)?,
        }
        self.client.synchronize();
        self.stats.staging_seconds += start.elapsed().as_secs_f64();
        Ok(())
    }

    /// Stage the combined CSR structure into pinned host memory
    pub fn copy_csr_matrix_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Combined)
    }

    /// Stage the owned CSR structure into pinned host memory
    pub fn copy_owned_csr_matrix_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Owned)
    }

    /// Stage the shared CSR structure into pinned host memory
    pub fn copy_shared_csr_matrix_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Shared)
    }

    /// Host view of the staged combined structure
    pub fn host_matrix(&self) -> Option<CsrHostView<'_>> {
        self.blocks.as_ref()?.host_combined.view()
    }

    /// Host view of the staged owned structure
    pub fn host_owned_matrix(&self) -> Option<CsrHostView<'_>> {
        self.blocks.as_ref()?.host_owned.view()
    }

    /// Host view of the staged shared structure
    pub fn host_shared_matrix(&self) -> Option<CsrHostView<'_>> {
        self.blocks.as_ref()?.host_shared.view()
    }

    /// Assembler name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank this assembler serves
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Row ownership interval
    pub fn row_range(&self) -> RowRange {
        self.row_range
    }

    /// Column interval of this rank's block
    pub fn col_range(&self) -> RowRange {
        self.col_range
    }

    /// Distinct rows in the combined structure (0 before first assembly)
    pub fn num_rows(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.combined.num_rows)
    }

    /// Rows owned by this rank
    pub fn num_owned_rows(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.owned.num_rows)
    }

    /// Rows touched locally but owned by other ranks
    pub fn num_shared_rows(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.shared.num_rows)
    }

    /// Nonzeros in the combined structure
    pub fn num_nonzeros(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.combined.num_nonzeros)
    }

    /// Nonzeros in owned rows
    pub fn num_owned_nonzeros(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.owned.num_nonzeros)
    }

    /// Nonzeros in shared rows
    pub fn num_shared_nonzeros(&self) -> usize {
        self.blocks.as_ref().map_or(0, |b| b.shared.num_nonzeros)
    }

    /// True when the last assembly touched rows owned by other ranks
    pub fn has_shared(&self) -> bool {
        self.num_shared_rows() > 0
    }

    /// Cumulative timing and call-count statistics
    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    /// Persistent device and pinned memory held by this assembler, in GB
    ///
    /// Excludes the borrowed workspace, which the pool accounts for.
    pub fn memory_in_gb(&self) -> f64 {
        let bytes = self.layout.size_bytes()
            + self.staging.as_ref().map_or(0, |s| s.size_bytes())
            + self.blocks.as_ref().map_or(0, |b| b.size_bytes());
        (bytes as f64) / BYTES_PER_GB
    }

    /// Free and total device memory in GB, for diagnostics
    pub fn device_memory_in_gb(&self) -> (f64, f64) {
        let (free, total) = R::memory_info(self.client.device());
        ((free as f64) / BYTES_PER_GB, (total as f64) / BYTES_PER_GB)
    }
}

#[derive(Clone, Copy)]
enum StageTarget {
    Combined,
    Owned,
    Shared,
}
