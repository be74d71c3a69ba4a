//! Right-hand-side vector assembler

use super::block::{RhsBlock, RhsHostBlock, RhsHostView};
use super::AssemblyStats;
use crate::buffer::DeviceBuffer;
use crate::error::{Error, Result};
use crate::layout::{GlobalOrdinal, RowLayout, RowRange};
use crate::ops::{required_workspace_len, AssemblyOps};
use crate::pool::Workspace;
use crate::runtime::{Runtime, RuntimeClient};
use std::time::Instant;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

struct Blocks<R: Runtime> {
    combined: RhsBlock<R>,
    owned: RhsBlock<R>,
    shared: RhsBlock<R>,
    host_combined: RhsHostBlock<R>,
    host_owned: RhsHostBlock<R>,
    host_shared: RhsHostBlock<R>,
    cap_rows: usize,
}

impl<R: Runtime> Blocks<R> {
    fn new(cap_rows: usize, device: &R::Device) -> Self {
        Self {
            combined: RhsBlock::with_capacity(cap_rows, device),
            owned: RhsBlock::with_capacity(cap_rows, device),
            shared: RhsBlock::with_capacity(cap_rows, device),
            host_combined: RhsHostBlock::with_capacity(cap_rows, device),
            host_owned: RhsHostBlock::with_capacity(cap_rows, device),
            host_shared: RhsHostBlock::with_capacity(cap_rows, device),
            cap_rows,
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

/// Consolidates raw (row, value) pairs into per-rank rhs vectors
///
/// Mirror of [`MatrixAssembler`](super::MatrixAssembler) for the right-hand
/// side. `assemble(&data, index)` selects one vector out of a device array
/// holding `num_vectors` stacked vectors of one entry per raw contribution.
pub struct RhsAssembler<R: Runtime>
where
    R::Client: AssemblyOps<R>,
{
    name: String,
    rank: i32,
    sort_by_value: bool,
    row_range: RowRange,
    global_num_rows: GlobalOrdinal,
    sentinel_row: Option<GlobalOrdinal>,
    layout: RowLayout<R>,
    n: usize,
    client: R::Client,
    workspace: Option<Workspace>,
    staging_values: Option<DeviceBuffer<f64, R>>,
    blocks: Option<Blocks<R>>,
    assembled: bool,
    stats: AssemblyStats,
}

impl<R: Runtime> RhsAssembler<R>
where
    R::Client: AssemblyOps<R>,
{
    /// Create an assembler for one rhs definition
    ///
    /// `row_range` must lie inside the global row extent and
    /// `num_contributions` must match the layout's total. A configured
    /// bogus-row sentinel must lie outside `[0, global_num_rows)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        sort_by_value: bool,
        row_range: RowRange,
        global_num_rows: GlobalOrdinal,
        num_contributions: usize,
        rank: i32,
        layout: RowLayout<R>,
        bogus_row: Option<GlobalOrdinal>,
        client: R::Client,
    ) -> Result<Self> {
        if row_range.upper() >= global_num_rows {
            return Err(Error::InvalidRange {
                what: "row",
                lower: row_range.lower(),
                upper: row_range.upper(),
            });
        }
        if layout.total_contributions() != num_contributions {
            return Err(Error::SizeMismatch {
                what: "raw contributions",
                expected: num_contributions,
                got: layout.total_contributions(),
            });
        }
        if let Some(s) = bogus_row {
            if (0..global_num_rows).contains(&s) {
                return Err(Error::InvalidSentinel {
                    what: "row",
                    index: s,
                    bound: global_num_rows,
                });
            }
        }

        let name = name.into();
        log::debug!(
            "rhs assembler '{}' (rank {}): rows [{}, {}], {} raw contributions",
            name,
            rank,
            row_range.lower(),
            row_range.upper(),
            num_contributions,
        );
        Ok(Self {
            name,
            rank,
            sort_by_value,
            row_range,
            global_num_rows,
            sentinel_row: bogus_row,
            n: num_contributions,
            layout,
            client,
            workspace: None,
            staging_values: None,
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

    /// Consolidate vector `index` out of the stacked raw value array
    ///
    /// `data` holds one or more vectors of one entry per raw contribution,
    /// back to back. The caller's array is copied and never mutated.
    pub fn assemble(&mut self, data: &DeviceBuffer<f64, R>, index: usize) -> Result<()> {
        let ws = self.workspace.ok_or(Error::WorkspaceNotBound)?;
        let needed = required_workspace_len(self.n);
        if ws.len() < needed {
            return Err(Error::WorkspaceTooSmall {
                needed,
                available: ws.len(),
            });
        }
        if self.n == 0 || data.len() % self.n != 0 {
            return Err(Error::SizeMismatch {
                what: "rhs data",
                expected: self.n,
                got: data.len(),
            });
        }
        let num_vectors = data.len() / self.n;
        if index >= num_vectors {
            return Err(Error::IndexOutOfBounds {
                what: "rhs vector",
                index: index as GlobalOrdinal,
                bound: num_vectors as GlobalOrdinal,
                pos: 0,
            });
        }

        let start = Instant::now();
        self.assembled = false;
        if let Some(blocks) = self.blocks.as_mut() {
            blocks.invalidate_host();
        }

        let device = self.client.device().clone();
        let staging = self
            .staging_values
            .get_or_insert_with(|| DeviceBuffer::zeroed(self.n, &device));
        staging.copy_from(data, index * self.n, 0, self.n);

        self.client.expand_row_keys(&self.layout, ws)?;
        self.client
            .check_rhs_bounds(self.n, self.global_num_rows, self.sentinel_row, ws)?;
        self.client
            .sort_rhs_pairs(staging, self.sort_by_value, self.sentinel_row, ws)?;
        let num_rows = self
            .client
            .reduce_rhs_pairs(staging, self.sentinel_row, ws)?;

        // sized once, to the first observed row count
        let name = &self.name;
        let blocks = self.blocks.get_or_insert_with(|| {
            log::debug!("rhs assembler '{name}': first assembly reserves {num_rows} rows");
            Blocks::new(num_rows, &device)
        });
        if num_rows > blocks.cap_rows {
            return Err(Error::CapacityExceeded {
                what: "rhs rows",
                needed: num_rows,
                reserved: blocks.cap_rows,
            });
        }

        // after reduction, workspace region 0 holds the distinct sorted rows
        blocks.combined.num_rows = num_rows;
        R::copy_within_device(
            ws.handle(),
            0,
            blocks.combined.row_indices.handle(),
            0,
            num_rows * std::mem::size_of::<GlobalOrdinal>(),
            &device,
        );
        blocks.combined.values.copy_from(staging, 0, 0, num_rows);

        let (lo, hi) = self
            .client
            .owned_row_span(&blocks.combined.row_indices, num_rows, self.row_range)?;

        let owned_rows = hi - lo;
        blocks.owned.num_rows = owned_rows;
        blocks
            .owned
            .row_indices
            .copy_from(&blocks.combined.row_indices, lo, 0, owned_rows);
        blocks
            .owned
            .values
            .copy_from(&blocks.combined.values, lo, 0, owned_rows);

        let tail_rows = num_rows - hi;
        blocks.shared.num_rows = lo + tail_rows;
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
            .values
            .copy_from(&blocks.combined.values, 0, 0, lo);
        blocks
            .shared
            .values
            .copy_from(&blocks.combined.values, hi, lo, tail_rows);

        self.client.synchronize();
        self.assembled = true;
        let elapsed = start.elapsed().as_secs_f64();
        self.stats.num_assembles += 1;
        self.stats.assemble_seconds += elapsed;
        log::trace!(
            "rhs assembler '{}' (rank {}): {} rows ({} owned), {:.3} ms",
            self.name,
            self.rank,
            num_rows,
            owned_rows,
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

    /// Stage the combined rhs vector into pinned host memory
    pub fn copy_rhs_vector_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Combined)
    }

    /// Stage the owned rhs vector into pinned host memory
    pub fn copy_owned_rhs_vector_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Owned)
    }

    /// Stage the shared rhs vector into pinned host memory
    pub fn copy_shared_rhs_vector_to_host(&mut self) -> Result<()> {
        self.stage(StageTarget::Shared)
    }

    /// Host view of the staged combined vector
    pub fn host_rhs(&self) -> Option<RhsHostView<'_>> {
        self.blocks.as_ref()?.host_combined.view()
    }

    /// Host view of the staged owned vector
    pub fn host_owned_rhs(&self) -> Option<RhsHostView<'_>> {
        self.blocks.as_ref()?.host_owned.view()
    }

    /// Host view of the staged shared vector
    pub fn host_shared_rhs(&self) -> Option<RhsHostView<'_>> {
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

    /// Distinct rows in the combined vector (0 before first assembly)
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
            + self.staging_values.as_ref().map_or(0, |b| b.size_bytes())
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
