//! CPU reference backend
//!
//! The CPU backend treats host memory as "device" memory: handles are
//! plain pointers and pinned allocations are ordinary aligned allocations.
//! Kernels are rayon data-parallel loops over the same flattened segment
//! layout a GPU backend would launch over, so the canonical results are
//! identical across backends.

mod client;
mod device;
pub(crate) mod kernels;
mod ops;
mod runtime;

pub use client::CpuClient;
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
