//! CPU runtime implementation

use super::client::CpuClient;
use super::device::CpuDevice;
use crate::runtime::Runtime;
use std::alloc::{alloc_zeroed, dealloc, Layout as AllocLayout};

/// CPU compute runtime
///
/// The reference runtime that works on any platform. "Device" memory lives
/// on the heap, allocated with the system allocator.
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

// Cache-line friendly alignment for all buffers
const ALIGN: usize = 64;

fn alloc_aligned(size_bytes: usize) -> u64 {
    if size_bytes == 0 {
        return 0;
    }

    let layout =
        AllocLayout::from_size_align(size_bytes, ALIGN).expect("invalid allocation layout");
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        panic!("[csrasm::cpu] failed to allocate {} bytes", size_bytes);
    }
    ptr as u64
}

fn dealloc_aligned(handle: u64, size_bytes: usize) {
    if handle == 0 || size_bytes == 0 {
        return;
    }

    let layout =
        AllocLayout::from_size_align(size_bytes, ALIGN).expect("invalid allocation layout");
    unsafe {
        dealloc(handle as *mut u8, layout);
    }
}

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Client = CpuClient;

    fn name() -> &'static str {
        "cpu"
    }

    fn allocate(size_bytes: usize, _device: &Self::Device) -> u64 {
        alloc_aligned(size_bytes)
    }

    fn deallocate(handle: u64, size_bytes: usize, _device: &Self::Device) {
        dealloc_aligned(handle, size_bytes);
    }

    // Host memory needs no pinning on the CPU backend; pinned allocations
    // share the aligned-heap path.
    fn allocate_pinned(size_bytes: usize, _device: &Self::Device) -> u64 {
        alloc_aligned(size_bytes)
    }

    fn deallocate_pinned(handle: u64, size_bytes: usize, _device: &Self::Device) {
        dealloc_aligned(handle, size_bytes);
    }

    fn copy_to_device(src: &[u8], dst: u64, dst_byte_offset: usize, _device: &Self::Device) {
        if src.is_empty() || dst == 0 {
            return;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                (dst as *mut u8).add(dst_byte_offset),
                src.len(),
            );
        }
    }

    fn copy_from_device(src: u64, src_byte_offset: usize, dst: &mut [u8], _device: &Self::Device) {
        if dst.is_empty() || src == 0 {
            return;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                (src as *const u8).add(src_byte_offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
    }

    fn copy_within_device(
        src: u64,
        src_byte_offset: usize,
        dst: u64,
        dst_byte_offset: usize,
        len_bytes: usize,
        _device: &Self::Device,
    ) {
        if len_bytes == 0 || src == 0 || dst == 0 {
            return;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                (src as *const u8).add(src_byte_offset),
                (dst as *mut u8).add(dst_byte_offset),
                len_bytes,
            );
        }
    }

    fn memory_info(_device: &Self::Device) -> (u64, u64) {
        // The host backend does not track free/total memory.
        (0, 0)
    }

    fn default_device() -> Self::Device {
        CpuDevice::new()
    }

    fn default_client(device: &Self::Device) -> Self::Client {
        CpuClient::new(device.clone())
    }
}
