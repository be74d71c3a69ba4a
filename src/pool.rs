//! Device workspace pool shared by matrix and rhs assembly
//!
//! Assembly needs scratch space proportional to the raw contribution count
//! every call. Allocating it once and lending it out amortizes the cost
//! across every nonlinear iteration of every timestep.

use crate::buffer::DeviceBuffer;
use crate::layout::GlobalOrdinal;
use crate::runtime::{Runtime, RuntimeClient};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Non-owning handle to a pool's scratch buffer
///
/// `Workspace` is a plain value: cheap to copy, bound to an assembler with
/// `bind_workspace`, and valid only for the owning pool's lifetime. Scratch
/// is carved into equal regions of 8-byte elements by the kernels; only one
/// assembler may use a workspace at a time (serialization is the caller's
/// responsibility).
#[derive(Clone, Copy, Debug)]
pub struct Workspace {
    handle: u64,
    len: usize,
}

impl Workspace {
    /// Raw backend handle of the scratch buffer
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Scratch capacity in 8-byte elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the workspace holds no scratch
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of region `index`, with regions `n` elements wide
    pub(crate) fn region(&self, index: usize, n: usize) -> u64 {
        self.handle + (index * n * 8) as u64
    }
}

/// Preallocated device scratch memory
///
/// The pool is the single owner of the buffer; assemblers borrow it by raw
/// handle for the duration of one `assemble()` call. Allocation failure is
/// fatal (the backend panics): without scratch space assembly cannot
/// proceed and there is no degraded mode.
pub struct WorkspacePool<R: Runtime> {
    name: String,
    rank: i32,
    buf: DeviceBuffer<GlobalOrdinal, R>,
}

impl<R: Runtime> WorkspacePool<R> {
    /// Reserve `len` 8-byte elements of device scratch
    pub fn new(name: impl Into<String>, len: usize, rank: i32, client: &R::Client) -> Self {
        let name = name.into();
        let buf = DeviceBuffer::zeroed(len, client.device());
        log::debug!(
            "workspace pool '{}' (rank {}): reserved {} elements ({:.3} GB)",
            name,
            rank,
            len,
            (buf.size_bytes() as f64) / BYTES_PER_GB,
        );
        Self { name, rank, buf }
    }

    /// Pool name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank that owns this pool
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Non-owning handle for lending to an assembler
    pub fn workspace(&self) -> Workspace {
        Workspace {
            handle: self.buf.handle(),
            len: self.buf.len(),
        }
    }

    /// Device memory held by the pool, in GB
    pub fn memory_in_gb(&self) -> f64 {
        (self.buf.size_bytes() as f64) / BYTES_PER_GB
    }

    /// Free and total device memory in GB, for diagnostics
    pub fn device_memory_in_gb(&self) -> (f64, f64) {
        let (free, total) = R::memory_info(self.buf.device());
        (
            (free as f64) / BYTES_PER_GB,
            (total as f64) / BYTES_PER_GB,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::CpuRuntime;
    use crate::runtime::Runtime;

    #[test]
    fn pool_lends_a_stable_handle() {
        let device = CpuRuntime::default_device();
        let client = CpuRuntime::default_client(&device);
        let pool = WorkspacePool::<CpuRuntime>::new("momentum", 128, 0, &client);

        let ws = pool.workspace();
        assert_eq!(ws.len(), 128);
        assert_eq!(ws.handle(), pool.workspace().handle());
        assert!(pool.memory_in_gb() > 0.0);
    }

    #[test]
    fn regions_are_disjoint() {
        let device = CpuRuntime::default_device();
        let client = CpuRuntime::default_client(&device);
        let pool = WorkspacePool::<CpuRuntime>::new("scratch", 96, 0, &client);

        let ws = pool.workspace();
        assert_eq!(ws.region(1, 32) - ws.region(0, 32), 32 * 8);
        assert_eq!(ws.region(2, 32) - ws.region(1, 32), 32 * 8);
    }
}
