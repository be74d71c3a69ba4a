//! Matrix and rhs assembly orchestration
//!
//! The assemblers tie the per-phase kernels together: persistent staging
//! copies of the raw input, sort and reduction through a borrowed workspace,
//! the owned/shared partition, and pinned-host staging for the solver
//! adapter.

mod block;
mod matrix;
mod rhs;

pub use block::{CsrHostView, RhsHostView};
pub use matrix::MatrixAssembler;
pub use rhs::RhsAssembler;

/// Cumulative timing and call-count statistics for one assembler
#[derive(Clone, Copy, Debug, Default)]
pub struct AssemblyStats {
    /// Completed `assemble()` calls
    pub num_assembles: u64,
    /// Wall time spent inside `assemble()`, in seconds
    pub assemble_seconds: f64,
    /// Wall time spent staging results to pinned host memory, in seconds
    pub staging_seconds: f64,
}
