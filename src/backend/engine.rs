//! Engine handle
//!
//! An engine identifies one device. The backend kind is a closed tagged
//! variant chosen at construction; capability checks go through an explicit
//! query instead of narrowing the engine to a backend-specific type.

use std::sync::Arc;

use crate::backend::buffer::BufferHandle;
use crate::backend::device::{DeviceConfig, VirtualDevice};
use crate::error::{PrimForgeError, PrimResult};

/// Backend kind selected at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Software-modeled device executing kernels in-process
    Virtual,
}

/// Device capabilities answerable by [`Engine::mayiuse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// 16-bit float kernel support
    HalfPrecision,
}

#[derive(Debug)]
struct EngineInner {
    kind: EngineKind,
    device: VirtualDevice,
}

/// Cheap-clone handle to one engine
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine over a default-configured device
    pub fn new(kind: EngineKind) -> PrimResult<Self> {
        Self::with_config(kind, DeviceConfig::default())
    }

    /// Create an engine over an explicitly configured device.
    ///
    /// Launch geometry divides by the block limit, so a zero limit is
    /// rejected here rather than at the first launch.
    pub fn with_config(kind: EngineKind, config: DeviceConfig) -> PrimResult<Self> {
        if config.max_threads_per_block == 0 {
            return Err(PrimForgeError::InvalidArguments(format!(
                "device '{}': max_threads_per_block must be non-zero",
                config.name
            )));
        }
        tracing::debug!(?kind, name = %config.name, "creating engine");
        Ok(Engine {
            inner: Arc::new(EngineInner {
                kind,
                device: VirtualDevice::new(config),
            }),
        })
    }

    pub fn kind(&self) -> EngineKind {
        self.inner.kind
    }

    pub fn device(&self) -> &VirtualDevice {
        &self.inner.device
    }

    /// Capability query
    pub fn mayiuse(&self, cap: Capability) -> bool {
        match cap {
            Capability::HalfPrecision => self.inner.device.supports_f16(),
        }
    }

    /// Allocate a device buffer with reference count 1
    pub fn alloc_buffer(&self, size: usize) -> PrimResult<BufferHandle> {
        self.inner.device.alloc(size)
    }
}
