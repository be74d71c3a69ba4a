//! # csrasm
//!
//! Per-rank assembly engine for distributed sparse linear systems.
//!
//! Element kernels in a parallel FE/FV solver emit unordered, duplicate-laden
//! (row, col, value) triples on the compute device. This crate consolidates
//! them into canonical CSR matrices and rhs vectors: duplicates summed,
//! columns sorted within each row, rows partitioned into the span owned by
//! this rank versus rows shared with neighbors, and the finished structures
//! staged into page-locked host memory for an external sparse solver.
//!
//! ## Architecture
//!
//! ```text
//! MatrixAssembler / RhsAssembler   orchestration, accounting, host staging
//!         │
//!     AssemblyOps                  per-phase device kernels (trait)
//!         │
//!       Runtime                    backend: memory + kernel dispatch
//! ```
//!
//! The CPU backend is the reference implementation; its kernels run through
//! rayon. GPU backends plug in behind the same [`Runtime`](runtime::Runtime)
//! and [`AssemblyOps`](ops::AssemblyOps) traits.
//!
//! ## Example
//!
//! ```
//! use csrasm::prelude::*;
//!
//! let device = CpuRuntime::default_device();
//! let client = CpuRuntime::default_client(&device);
//!
//! // two segments, both feeding row 0, three raw contributions total
//! let layout = RowLayout::<CpuRuntime>::from_host(&[0, 0], &[0, 2, 3], &device)?;
//!
//! let mut assembler = MatrixAssembler::new(
//!     "pressure",
//!     true,
//!     RowRange::new(0, 0)?,
//!     RowRange::new(0, 1)?,
//!     1,
//!     2,
//!     3,
//!     0,
//!     layout,
//!     None,
//!     client.clone(),
//! )?;
//!
//! let pool = WorkspacePool::<CpuRuntime>::new(
//!     "scratch",
//!     MatrixAssembler::<CpuRuntime>::required_workspace_len(3),
//!     0,
//!     &client,
//! );
//! assembler.bind_workspace(pool.workspace());
//!
//! let cols = DeviceBuffer::from_slice(&[1, 0, 1], &device);
//! let values = DeviceBuffer::from_slice(&[2.0, 1.0, 3.0], &device);
//! assembler.assemble(&cols, &values)?;
//! assembler.copy_csr_matrix_to_host()?;
//!
//! let csr = assembler.host_matrix().unwrap();
//! assert_eq!(csr.cols, &[0, 1]);
//! assert_eq!(csr.values, &[1.0, 5.0]);
//! # Ok::<(), csrasm::Error>(())
//! ```

pub mod assemble;
pub mod buffer;
pub mod error;
pub mod layout;
pub mod ops;
pub mod pool;
pub mod runtime;

pub use error::{Error, Result};

/// Common imports for driver code
pub mod prelude {
    pub use crate::assemble::{
        AssemblyStats, CsrHostView, MatrixAssembler, RhsAssembler, RhsHostView,
    };
    pub use crate::buffer::{DeviceBuffer, PinnedBuffer};
    pub use crate::error::{Error, Result};
    pub use crate::layout::{GlobalOrdinal, RowLayout, RowRange};
    pub use crate::ops::AssemblyOps;
    pub use crate::pool::{Workspace, WorkspacePool};
    pub use crate::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
    pub use crate::runtime::{Device, Runtime, RuntimeClient};
}
