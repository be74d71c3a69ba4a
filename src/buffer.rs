//! Owned device and page-locked host buffers
//!
//! Both buffer types wrap a raw backend handle with RAII ownership: the
//! memory is released exactly once, on drop. Element types are constrained
//! to `bytemuck::Pod` so host/device transfers can go through byte slices
//! without any per-element conversion.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::marker::PhantomData;

/// Exclusively owned device memory holding `len` elements of `T`
///
/// Allocated zero-initialized; freed on drop. The raw handle may be lent to
/// kernels for the duration of one call but never outlives the buffer.
pub struct DeviceBuffer<T, R: Runtime> {
    handle: u64,
    len: usize,
    device: R::Device,
    _elem: PhantomData<T>,
}

impl<T: bytemuck::Pod, R: Runtime> DeviceBuffer<T, R> {
    /// Allocate a zero-initialized buffer of `len` elements
    pub fn zeroed(len: usize, device: &R::Device) -> Self {
        let handle = R::allocate(len * std::mem::size_of::<T>(), device);
        Self {
            handle,
            len,
            device: device.clone(),
            _elem: PhantomData,
        }
    }

    /// Allocate and upload a host slice
    pub fn from_slice(data: &[T], device: &R::Device) -> Self {
        let mut buf = Self::zeroed(data.len(), device);
        buf.write(0, data);
        buf
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Raw backend handle (pointer on CPU/CUDA)
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Device this buffer lives on
    pub fn device(&self) -> &R::Device {
        &self.device
    }

    /// Upload host elements starting at element `offset`
    pub fn write(&mut self, offset: usize, data: &[T]) {
        assert!(offset + data.len() <= self.len, "device write out of range");
        R::copy_to_device(
            bytemuck::cast_slice(data),
            self.handle,
            offset * std::mem::size_of::<T>(),
            &self.device,
        );
    }

    /// Download elements starting at element `offset` into a host slice
    pub fn read(&self, offset: usize, out: &mut [T]) {
        assert!(offset + out.len() <= self.len, "device read out of range");
        R::copy_from_device(
            self.handle,
            offset * std::mem::size_of::<T>(),
            bytemuck::cast_slice_mut(out),
            &self.device,
        );
    }

    /// Download the whole buffer
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = vec![T::zeroed(); self.len];
        self.read(0, &mut out);
        out
    }

    /// Device-to-device copy of `len` elements from `src`
    pub fn copy_from(
        &mut self,
        src: &DeviceBuffer<T, R>,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) {
        assert!(src_offset + len <= src.len, "device copy source out of range");
        assert!(dst_offset + len <= self.len, "device copy target out of range");
        let elem = std::mem::size_of::<T>();
        R::copy_within_device(
            src.handle,
            src_offset * elem,
            self.handle,
            dst_offset * elem,
            len * elem,
            &self.device,
        );
    }
}

impl<T, R: Runtime> Drop for DeviceBuffer<T, R> {
    fn drop(&mut self) {
        R::deallocate(
            self.handle,
            self.len * std::mem::size_of::<T>(),
            &self.device,
        );
    }
}

/// Page-locked host memory holding `len` elements of `T`
///
/// Pinned memory is host-addressable on every backend, which is what makes
/// the slice accessors sound. The solver adapter reads assembled structures
/// exclusively through these buffers.
pub struct PinnedBuffer<T, R: Runtime> {
    handle: u64,
    len: usize,
    device: R::Device,
    _elem: PhantomData<T>,
}

impl<T: bytemuck::Pod, R: Runtime> PinnedBuffer<T, R> {
    /// Allocate a zero-initialized pinned buffer of `len` elements
    pub fn zeroed(len: usize, device: &R::Device) -> Self {
        let handle = R::allocate_pinned(len * std::mem::size_of::<T>(), device);
        Self {
            handle,
            len,
            device: device.clone(),
            _elem: PhantomData,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes
    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Read-only view of the pinned memory
    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.handle as *const T, self.len) }
    }

    /// Mutable view of the pinned memory
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.handle as *mut T, self.len) }
    }

    /// Fill the first `len` elements from device memory
    pub fn fill_from_device(
        &mut self,
        src: &DeviceBuffer<T, R>,
        len: usize,
    ) -> Result<()> {
        if len > self.len || len > src.len() {
            return Err(Error::SizeMismatch {
                what: "host staging transfer",
                expected: self.len.min(src.len()),
                got: len,
            });
        }
        let bytes = len * std::mem::size_of::<T>();
        let device = self.device.clone();
        let dst = &mut self.as_mut_slice()[..len];
        R::copy_from_device(
            src.handle(),
            0,
            &mut bytemuck::cast_slice_mut(dst)[..bytes],
            &device,
        );
        Ok(())
    }
}

impl<T, R: Runtime> Drop for PinnedBuffer<T, R> {
    fn drop(&mut self) {
        R::deallocate_pinned(
            self.handle,
            self.len * std::mem::size_of::<T>(),
            &self.device,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::CpuRuntime;
    use crate::runtime::Runtime;

    #[test]
    fn device_roundtrip() {
        let device = CpuRuntime::default_device();
        let buf = DeviceBuffer::<i64, CpuRuntime>::from_slice(&[3, 1, 4, 1, 5], &device);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.to_vec(), vec![3, 1, 4, 1, 5]);
    }

    #[test]
    fn device_copy_with_offsets() {
        let device = CpuRuntime::default_device();
        let src = DeviceBuffer::<f64, CpuRuntime>::from_slice(&[1.0, 2.0, 3.0, 4.0], &device);
        let mut dst = DeviceBuffer::<f64, CpuRuntime>::zeroed(4, &device);
        dst.copy_from(&src, 1, 0, 2);
        assert_eq!(dst.to_vec(), vec![2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn pinned_fill_from_device() {
        let device = CpuRuntime::default_device();
        let src = DeviceBuffer::<i64, CpuRuntime>::from_slice(&[7, 8, 9], &device);
        let mut pinned = PinnedBuffer::<i64, CpuRuntime>::zeroed(3, &device);
        pinned.fill_from_device(&src, 3).unwrap();
        assert_eq!(pinned.as_slice(), &[7, 8, 9]);

        // staging more than either side holds is rejected
        assert!(pinned.fill_from_device(&src, 4).is_err());
    }

    #[test]
    fn zero_length_buffers_are_inert() {
        let device = CpuRuntime::default_device();
        let buf = DeviceBuffer::<f64, CpuRuntime>::zeroed(0, &device);
        assert!(buf.is_empty());
        assert_eq!(buf.to_vec(), Vec::<f64>::new());

        let pinned = PinnedBuffer::<f64, CpuRuntime>::zeroed(0, &device);
        assert!(pinned.as_slice().is_empty());
    }
}
