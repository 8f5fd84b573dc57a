//! Virtual accelerator device
//!
//! The device is modeled in-process: it owns a configuration (capabilities,
//! memory budget, launch limits) and tracks allocation accounting so tests
//! can assert that no device memory leaks across a scenario.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::buffer::BufferHandle;
use crate::error::{PrimForgeError, PrimResult};

/// Device configuration
///
/// Capability flags and limits that a physical driver would report are
/// supplied here at construction time.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    /// Whether the device supports 16-bit float kernels
    pub supports_f16: bool,
    /// Device memory budget in bytes; allocations beyond it fail
    pub mem_bytes: usize,
    /// Maximum threads per block for kernel launches
    pub max_threads_per_block: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: "primforge-virtual-0".to_string(),
            supports_f16: true,
            mem_bytes: 256 * 1024 * 1024,
            max_threads_per_block: 1024,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DeviceInner {
    config: DeviceConfig,
    allocated: AtomicUsize,
    live_buffers: AtomicUsize,
}

/// Cheap-clone handle to one virtual device
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    inner: Arc<DeviceInner>,
}

impl VirtualDevice {
    pub fn new(config: DeviceConfig) -> Self {
        tracing::debug!(name = %config.name, mem_bytes = config.mem_bytes, "creating virtual device");
        VirtualDevice {
            inner: Arc::new(DeviceInner {
                config,
                allocated: AtomicUsize::new(0),
                live_buffers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn supports_f16(&self) -> bool {
        self.inner.config.supports_f16
    }

    pub fn max_threads_per_block(&self) -> u32 {
        self.inner.config.max_threads_per_block
    }

    /// Allocate a device buffer with reference count 1
    pub fn alloc(&self, size: usize) -> PrimResult<BufferHandle> {
        if size == 0 {
            tracing::warn!("zero-size allocation requested");
        }

        let budget = self.inner.config.mem_bytes;
        let prev = self.inner.allocated.fetch_add(size, Ordering::AcqRel);
        if prev + size > budget {
            self.inner.allocated.fetch_sub(size, Ordering::AcqRel);
            tracing::error!(
                size,
                in_use = prev,
                budget,
                "device allocation exceeds memory budget"
            );
            return Err(PrimForgeError::OutOfMemory(format!(
                "allocation of {} bytes exceeds device budget ({} of {} in use)",
                size, prev, budget
            )));
        }
        self.inner.live_buffers.fetch_add(1, Ordering::AcqRel);

        tracing::trace!(size, "allocated device buffer");
        Ok(BufferHandle::alloc_on(self.clone(), size))
    }

    /// Bytes currently allocated on the device
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Acquire)
    }

    /// Number of live device buffers
    pub fn live_buffers(&self) -> usize {
        self.inner.live_buffers.load(Ordering::Acquire)
    }

    pub(crate) fn on_free(&self, size: usize) {
        self.inner.allocated.fetch_sub(size, Ordering::AcqRel);
        self.inner.live_buffers.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(size, "freed device buffer");
    }
}
