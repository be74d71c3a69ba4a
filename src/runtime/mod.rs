//! Compute backends for the assembly engine
//!
//! This module defines the `Runtime` trait and provides the CPU reference
//! backend. GPU backends plug in behind the same traits.
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity, raw memory model)
//! ├── Device (identifies a specific compute unit)
//! └── Client (dispatches kernels, owns stream/queue, synchronizes)
//! ```
//!
//! Memory is handled through raw `u64` handles (a pointer on CPU/CUDA, a
//! buffer id on WebGPU-style backends) so that buffer types stay backend
//! agnostic. All copy entry points take explicit byte offsets for the same
//! reason.

pub mod cpu;

/// Core trait for compute backends
///
/// `Runtime` abstracts over different compute devices. It uses static
/// dispatch via generics for zero-cost abstraction.
///
/// Allocation failure is fatal by contract: without device memory the
/// assembly cannot proceed and there is no degraded mode, so `allocate`
/// panics rather than returning an error.
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Client for dispatching kernels
    type Client: RuntimeClient<Self>;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Allocate zero-initialized device memory
    ///
    /// Returns a device handle (u64). Panics if the allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> u64;

    /// Deallocate device memory
    fn deallocate(handle: u64, size_bytes: usize, device: &Self::Device);

    /// Allocate zero-initialized page-locked host memory
    ///
    /// Pinned memory is host-addressable on every backend and is the only
    /// legal target for host staging transfers. On CPU this is an ordinary
    /// aligned allocation; a CUDA backend maps it to `cuMemAllocHost`.
    /// Panics if the allocation fails.
    fn allocate_pinned(size_bytes: usize, device: &Self::Device) -> u64;

    /// Deallocate page-locked host memory
    fn deallocate_pinned(handle: u64, size_bytes: usize, device: &Self::Device);

    /// Copy host data into device memory at `dst_byte_offset`
    fn copy_to_device(src: &[u8], dst: u64, dst_byte_offset: usize, device: &Self::Device);

    /// Copy device memory at `src_byte_offset` into a host slice
    fn copy_from_device(src: u64, src_byte_offset: usize, dst: &mut [u8], device: &Self::Device);

    /// Copy within device memory; ranges must not overlap
    fn copy_within_device(
        src: u64,
        src_byte_offset: usize,
        dst: u64,
        dst_byte_offset: usize,
        len_bytes: usize,
        device: &Self::Device,
    );

    /// Free and total device memory in bytes, for diagnostics only
    ///
    /// Backends without a memory query report `(0, 0)`.
    fn memory_info(device: &Self::Device) -> (u64, u64);

    /// Get the default device
    fn default_device() -> Self::Device;

    /// Get the default client for a device
    fn default_client(device: &Self::Device) -> Self::Client;
}

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Trait for runtime clients that dispatch kernels
pub trait RuntimeClient<R: Runtime>: Clone + Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// Wait for all pending kernels and transfers to complete
    fn synchronize(&self);
}
