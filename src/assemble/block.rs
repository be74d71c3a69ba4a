//! Device-side CSR/rhs blocks and their pinned host mirrors
//!
//! One parametrized block type serves the combined, owned, and shared
//! variants alike. Device blocks are sized once (to the first observed
//! counts) and refilled in place on every assembly; host blocks mirror them
//! in page-locked memory and hand out truncated read-only views.

use crate::buffer::{DeviceBuffer, PinnedBuffer};
use crate::error::Result;
use crate::layout::GlobalOrdinal;
use crate::runtime::Runtime;

/// One CSR structure on the device
pub(crate) struct CsrBlock<R: Runtime> {
    pub(crate) row_indices: DeviceBuffer<GlobalOrdinal, R>,
    pub(crate) row_counts: DeviceBuffer<GlobalOrdinal, R>,
    pub(crate) cols: DeviceBuffer<GlobalOrdinal, R>,
    pub(crate) values: DeviceBuffer<f64, R>,
    pub(crate) num_rows: usize,
    pub(crate) num_nonzeros: usize,
}

impl<R: Runtime> CsrBlock<R> {
    pub(crate) fn with_capacity(cap_rows: usize, cap_nnz: usize, device: &R::Device) -> Self {
        Self {
            row_indices: DeviceBuffer::zeroed(cap_rows, device),
            row_counts: DeviceBuffer::zeroed(cap_rows, device),
            cols: DeviceBuffer::zeroed(cap_nnz, device),
            values: DeviceBuffer::zeroed(cap_nnz, device),
            num_rows: 0,
            num_nonzeros: 0,
        }
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.row_indices.size_bytes()
            + self.row_counts.size_bytes()
            + self.cols.size_bytes()
            + self.values.size_bytes()
    }
}

/// Pinned host mirror of a [`CsrBlock`]
pub(crate) struct CsrHostBlock<R: Runtime> {
    row_indices: PinnedBuffer<GlobalOrdinal, R>,
    row_counts: PinnedBuffer<GlobalOrdinal, R>,
    cols: PinnedBuffer<GlobalOrdinal, R>,
    values: PinnedBuffer<f64, R>,
    num_rows: usize,
    num_nonzeros: usize,
    staged: bool,
}

impl<R: Runtime> CsrHostBlock<R> {
    pub(crate) fn with_capacity(cap_rows: usize, cap_nnz: usize, device: &R::Device) -> Self {
        Self {
            row_indices: PinnedBuffer::zeroed(cap_rows, device),
            row_counts: PinnedBuffer::zeroed(cap_rows, device),
            cols: PinnedBuffer::zeroed(cap_nnz, device),
            values: PinnedBuffer::zeroed(cap_nnz, device),
            num_rows: 0,
            num_nonzeros: 0,
            staged: false,
        }
    }

    /// Stage the block's current contents into pinned memory
    pub(crate) fn stage(&mut self, src: &CsrBlock<R>) -> Result<()> {
        self.row_indices.fill_from_device(&src.row_indices, src.num_rows)?;
        self.row_counts.fill_from_device(&src.row_counts, src.num_rows)?;
        self.cols.fill_from_device(&src.cols, src.num_nonzeros)?;
        self.values.fill_from_device(&src.values, src.num_nonzeros)?;
        self.num_rows = src.num_rows;
        self.num_nonzeros = src.num_nonzeros;
        self.staged = true;
        Ok(())
    }

    /// Invalidate the mirror; the next view requires a fresh staging call
    pub(crate) fn invalidate(&mut self) {
        self.staged = false;
    }

    pub(crate) fn view(&self) -> Option<CsrHostView<'_>> {
        if !self.staged {
            return None;
        }
        Some(CsrHostView {
            row_indices: &self.row_indices.as_slice()[..self.num_rows],
            row_counts: &self.row_counts.as_slice()[..self.num_rows],
            cols: &self.cols.as_slice()[..self.num_nonzeros],
            values: &self.values.as_slice()[..self.num_nonzeros],
        })
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.row_indices.size_bytes()
            + self.row_counts.size_bytes()
            + self.cols.size_bytes()
            + self.values.size_bytes()
    }
}

/// Read-only view of a host-staged CSR structure
///
/// Borrowed from the owning assembler; valid until the next `assemble()`
/// call overwrites the pinned buffers underneath.
#[derive(Clone, Copy, Debug)]
pub struct CsrHostView<'a> {
    /// Distinct global row indices, sorted ascending
    pub row_indices: &'a [GlobalOrdinal],
    /// Nonzeros per row, aligned with `row_indices`
    pub row_counts: &'a [GlobalOrdinal],
    /// Column indices, concatenated row by row
    pub cols: &'a [GlobalOrdinal],
    /// Values, aligned with `cols`
    pub values: &'a [f64],
}

impl CsrHostView<'_> {
    /// Number of distinct rows in the structure
    pub fn num_rows(&self) -> usize {
        self.row_indices.len()
    }

    /// Total nonzeros in the structure
    pub fn num_nonzeros(&self) -> usize {
        self.cols.len()
    }
}

/// One rhs structure on the device
pub(crate) struct RhsBlock<R: Runtime> {
    pub(crate) row_indices: DeviceBuffer<GlobalOrdinal, R>,
    pub(crate) values: DeviceBuffer<f64, R>,
    pub(crate) num_rows: usize,
}

impl<R: Runtime> RhsBlock<R> {
    pub(crate) fn with_capacity(cap_rows: usize, device: &R::Device) -> Self {
        Self {
            row_indices: DeviceBuffer::zeroed(cap_rows, device),
            values: DeviceBuffer::zeroed(cap_rows, device),
            num_rows: 0,
        }
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.row_indices.size_bytes() + self.values.size_bytes()
    }
}

/// Pinned host mirror of an [`RhsBlock`]
pub(crate) struct RhsHostBlock<R: Runtime> {
    row_indices: PinnedBuffer<GlobalOrdinal, R>,
    values: PinnedBuffer<f64, R>,
    num_rows: usize,
    staged: bool,
}

impl<R: Runtime> RhsHostBlock<R> {
    pub(crate) fn with_capacity(cap_rows: usize, device: &R::Device) -> Self {
        Self {
            row_indices: PinnedBuffer::zeroed(cap_rows, device),
            values: PinnedBuffer::zeroed(cap_rows, device),
            num_rows: 0,
            staged: false,
        }
    }

    pub(crate) fn stage(&mut self, src: &RhsBlock<R>) -> Result<()> {
        self.row_indices.fill_from_device(&src.row_indices, src.num_rows)?;
        self.values.fill_from_device(&src.values, src.num_rows)?;
        self.num_rows = src.num_rows;
        self.staged = true;
        Ok(())
    }

    pub(crate) fn invalidate(&mut self) {
        self.staged = false;
    }

    pub(crate) fn view(&self) -> Option<RhsHostView<'_>> {
        if !self.staged {
            return None;
        }
        Some(RhsHostView {
            row_indices: &self.row_indices.as_slice()[..self.num_rows],
            values: &self.values.as_slice()[..self.num_rows],
        })
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.row_indices.size_bytes() + self.values.size_bytes()
    }
}

/// Read-only view of a host-staged rhs structure
#[derive(Clone, Copy, Debug)]
pub struct RhsHostView<'a> {
    /// Distinct global row indices, sorted ascending
    pub row_indices: &'a [GlobalOrdinal],
    /// Summed value per row, aligned with `row_indices`
    pub values: &'a [f64],
}

impl RhsHostView<'_> {
    /// Number of distinct rows in the structure
    pub fn num_rows(&self) -> usize {
        self.row_indices.len()
    }
}
