//! Device buffer handles
//!
//! A `BufferHandle` models one device allocation with an explicit,
//! driver-style reference count. Cloning the Rust handle is free and never
//! touches that count; only `retain`/`release` do. This is the property the
//! memory-object interop surface is built on: a borrowed buffer passes
//! through the library with its reference count untouched.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use bytemuck::Pod;

use crate::backend::device::VirtualDevice;
use crate::error::{PrimForgeError, PrimResult};

#[derive(Debug)]
struct BufferInner {
    bytes: RwLock<Vec<u8>>,
    size: usize,
    refcount: AtomicU32,
    device: VirtualDevice,
}

/// Handle to one device buffer
#[derive(Debug, Clone)]
pub struct BufferHandle {
    inner: Arc<BufferInner>,
}

impl BufferHandle {
    /// Called by the device allocator; the new buffer carries refcount 1.
    pub(crate) fn alloc_on(device: VirtualDevice, size: usize) -> Self {
        BufferHandle {
            inner: Arc::new(BufferInner {
                bytes: RwLock::new(vec![0u8; size]),
                size,
                refcount: AtomicU32::new(1),
                device,
            }),
        }
    }

    /// Buffer size in bytes
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Current device-side reference count
    pub fn ref_count(&self) -> u32 {
        self.inner.refcount.load(Ordering::Acquire)
    }

    /// Increment the device-side reference count
    pub fn retain(&self) {
        self.inner.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the device-side reference count, freeing the device bytes
    /// when it reaches zero.
    pub fn release(&self) {
        let prev = self
            .inner
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1));
        match prev {
            Ok(1) => {
                // last reference gone; return the bytes to the device
                if let Ok(mut bytes) = self.inner.bytes.write() {
                    *bytes = Vec::new();
                }
                self.inner.device.on_free(self.inner.size);
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("release on a buffer whose reference count is already zero");
            }
        }
    }

    /// True when both handles name the same device buffer
    pub fn same_buffer(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy data from host to device
    pub fn copy_from_host<T: Pod>(&self, data: &[T]) -> PrimResult<()> {
        let byte_len = std::mem::size_of_val(data);
        if byte_len > self.size() {
            return Err(PrimForgeError::InvalidArguments(format!(
                "source data too large: {} > {}",
                byte_len,
                self.size()
            )));
        }
        let mut bytes = self.inner.bytes.write()?;
        if bytes.len() < byte_len {
            return Err(PrimForgeError::RuntimeError(
                "copy to a freed device buffer".to_string(),
            ));
        }
        bytes[..byte_len].copy_from_slice(bytemuck::cast_slice(data));
        Ok(())
    }

    /// Copy data from device to host
    pub fn copy_to_host<T: Pod>(&self, out: &mut [T]) -> PrimResult<()> {
        let byte_len = std::mem::size_of_val(out);
        if byte_len > self.size() {
            return Err(PrimForgeError::InvalidArguments(format!(
                "destination buffer too small: {} > {}",
                byte_len,
                self.size()
            )));
        }
        let bytes = self.inner.bytes.read()?;
        if bytes.len() < byte_len {
            return Err(PrimForgeError::RuntimeError(
                "copy from a freed device buffer".to_string(),
            ));
        }
        bytemuck::cast_slice_mut(out).copy_from_slice(&bytes[..byte_len]);
        Ok(())
    }

    /// Device-side byte storage, for kernel entry functions.
    pub(crate) fn bytes(&self) -> &RwLock<Vec<u8>> {
        &self.inner.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::device::DeviceConfig;

    fn device() -> VirtualDevice {
        VirtualDevice::new(DeviceConfig::default())
    }

    #[test]
    fn clone_does_not_touch_refcount() {
        let buf = device().alloc(16).unwrap();
        assert_eq!(buf.ref_count(), 1);
        let alias = buf.clone();
        assert_eq!(buf.ref_count(), 1);
        assert!(alias.same_buffer(&buf));
        buf.release();
    }

    #[test]
    fn retain_release_cycle() {
        let dev = device();
        let buf = dev.alloc(16).unwrap();
        buf.retain();
        assert_eq!(buf.ref_count(), 2);
        buf.release();
        assert_eq!(buf.ref_count(), 1);
        assert_eq!(dev.live_buffers(), 1);
        buf.release();
        assert_eq!(buf.ref_count(), 0);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn release_past_zero_is_a_noop() {
        let dev = device();
        let buf = dev.alloc(16).unwrap();
        buf.release();
        buf.release();
        assert_eq!(buf.ref_count(), 0);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn host_round_trip() {
        let buf = device().alloc(16).unwrap();
        let data = vec![1.0f32, 2.0, 3.0, 4.0];
        buf.copy_from_host(&data).unwrap();
        let mut out = vec![0.0f32; 4];
        buf.copy_to_host(&mut out).unwrap();
        assert_eq!(out, data);
        buf.release();
    }

    #[test]
    fn oversized_host_copy_is_rejected() {
        let buf = device().alloc(8).unwrap();
        let data = vec![0.0f32; 4];
        let err = buf.copy_from_host(&data).unwrap_err();
        assert!(matches!(err, PrimForgeError::InvalidArguments(_)));
        buf.release();
    }
}
