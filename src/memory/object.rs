//! Memory objects
//!
//! A memory object binds a tensor layout to at most one device buffer. The
//! ownership tag decides destruction behavior: a library-owned buffer is
//! released when the object dies; a borrowed buffer (installed through
//! `set_handle`) passes through with its device-side reference count
//! untouched. Ownership violations are unreachable by construction: release
//! is only ever issued on the owned path.

use bytemuck::Pod;

use crate::backend::{BufferHandle, Engine};
use crate::error::{PrimForgeError, PrimResult};
use crate::memory::TensorDesc;

/// Buffer allocation policy at memory-object creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// Allocate a library-owned buffer sized to the layout
    Allocate,
    /// Create the object with no buffer bound
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Library,
    Borrowed,
}

/// Logical tensor bound to at most one device buffer
#[derive(Debug)]
pub struct MemoryObject {
    desc: TensorDesc,
    engine: Engine,
    handle: Option<BufferHandle>,
    ownership: Ownership,
}

impl MemoryObject {
    pub fn new(engine: &Engine, desc: TensorDesc, mode: AllocMode) -> PrimResult<Self> {
        let (handle, ownership) = match mode {
            AllocMode::Allocate => {
                let handle = engine.alloc_buffer(desc.size_bytes())?;
                (Some(handle), Ownership::Library)
            }
            AllocMode::None => (None, Ownership::Borrowed),
        };
        Ok(MemoryObject {
            desc,
            engine: engine.clone(),
            handle,
            ownership,
        })
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Currently bound buffer handle, if any.
    ///
    /// Never alters ownership or the device-side reference count.
    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle.clone()
    }

    /// True when the object owns (and will release) its buffer
    pub fn is_library_owned(&self) -> bool {
        self.ownership == Ownership::Library && self.handle.is_some()
    }

    /// Install an externally supplied buffer handle.
    ///
    /// A previously library-owned buffer is released first. The new handle
    /// is always installed as borrowed; its reference count is left exactly
    /// as the caller provided it.
    pub fn set_handle(&mut self, handle: BufferHandle) {
        if self.ownership == Ownership::Library {
            if let Some(prev) = self.handle.take() {
                prev.release();
            }
        }
        tracing::trace!(size = handle.size(), "adopting external buffer");
        self.handle = Some(handle);
        self.ownership = Ownership::Borrowed;
    }

    /// Copy host data into the bound buffer
    pub fn write<T: Pod>(&self, data: &[T]) -> PrimResult<()> {
        self.bound_handle()?.copy_from_host(data)
    }

    /// Copy the bound buffer out to host memory
    pub fn read<T: Pod>(&self, out: &mut [T]) -> PrimResult<()> {
        self.bound_handle()?.copy_to_host(out)
    }

    fn bound_handle(&self) -> PrimResult<&BufferHandle> {
        self.handle.as_ref().ok_or_else(|| {
            PrimForgeError::InvalidArguments("memory object has no buffer bound".to_string())
        })
    }
}

impl Drop for MemoryObject {
    fn drop(&mut self) {
        if self.ownership == Ownership::Library {
            if let Some(handle) = self.handle.take() {
                handle.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EngineKind;
    use crate::memory::{DataType, FormatTag};

    fn engine() -> Engine {
        Engine::new(EngineKind::Virtual).unwrap()
    }

    fn desc() -> TensorDesc {
        TensorDesc::new(&[2, 3, 4, 5], DataType::F32, FormatTag::Nchw).unwrap()
    }

    #[test]
    fn fresh_object_without_buffer_reports_none() {
        let mem = MemoryObject::new(&engine(), desc(), AllocMode::None).unwrap();
        assert!(mem.handle().is_none());
        assert!(!mem.is_library_owned());
    }

    #[test]
    fn allocate_mode_produces_owned_buffer_released_on_drop() {
        let engine = engine();
        {
            let mem = MemoryObject::new(&engine, desc(), AllocMode::Allocate).unwrap();
            assert!(mem.is_library_owned());
            assert_eq!(engine.device().live_buffers(), 1);
        }
        assert_eq!(engine.device().live_buffers(), 0);
        assert_eq!(engine.device().allocated_bytes(), 0);
    }

    #[test]
    fn set_handle_releases_owned_buffer_and_borrows() {
        let engine = engine();
        let external = engine.alloc_buffer(480).unwrap();
        let mut mem = MemoryObject::new(&engine, desc(), AllocMode::Allocate).unwrap();
        assert_eq!(engine.device().live_buffers(), 2);

        mem.set_handle(external.clone());
        // the owned buffer is gone; only the external one is live
        assert_eq!(engine.device().live_buffers(), 1);
        assert!(!mem.is_library_owned());
        assert_eq!(external.ref_count(), 1);

        drop(mem);
        // borrowed: destruction leaves the external count untouched
        assert_eq!(external.ref_count(), 1);
        external.release();
    }

    #[test]
    fn write_without_buffer_is_invalid() {
        let mem = MemoryObject::new(&engine(), desc(), AllocMode::None).unwrap();
        let err = mem.write(&[0.0f32; 4]).unwrap_err();
        assert!(matches!(err, PrimForgeError::InvalidArguments(_)));
    }
}
