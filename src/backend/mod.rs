//! Virtual accelerator backend
//!
//! Engine, device, buffers, streams, and the kernel compilation pipeline.
//! The backend kind is a closed tagged variant; the single shipped backend
//! models the device in-process so the whole validate/compile/execute
//! pipeline runs and tests without hardware.

mod buffer;
mod builder;
mod device;
mod engine;
mod module;
mod stream;

pub use buffer::BufferHandle;
pub use builder::KernelBuilder;
pub use device::{DeviceConfig, VirtualDevice};
pub use engine::{Capability, Engine, EngineKind};
pub use module::{EntryPoint, Kernel, KernelArg, KernelFn, KernelModule, KernelSpec, KernelTemplate};
pub use stream::Stream;
