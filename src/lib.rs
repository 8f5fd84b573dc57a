//! primforge: a small tensor-operation execution core over a virtual
//! accelerator.
//!
//! The library is organized around a three-stage pipeline:
//!
//! 1. describe an operation ([`ops::EltwiseDesc`]) and validate it against
//!    an [`backend::Engine`] to get a primitive descriptor;
//! 2. `init` the primitive, which specializes the shared kernel template
//!    (a numeric-type selector plus named integer constants) and resolves
//!    the direction's entry point;
//! 3. `execute` repeatedly, binding live [`memory::MemoryObject`]s and a
//!    [`backend::Stream`]; launches are asynchronous and faults surface at
//!    [`backend::Stream::synchronize`].
//!
//! Memory objects carry explicit ownership over their device buffers:
//! library-owned buffers are released when the object dies, while buffers
//! adopted through `set_handle` stay borrowed and their device-side
//! reference count is never perturbed.

pub mod backend;
pub mod error;
pub mod kernels;
pub mod memory;
pub mod ops;

pub use backend::{Capability, Engine, EngineKind, Stream};
pub use error::{PrimForgeError, PrimResult};
pub use memory::{AllocMode, DataType, FormatTag, MemoryObject, TensorDesc};
pub use ops::{
    create_primitive, AlgKind, Attr, EltwiseDesc, ExecContext, Primitive, PropKind,
};
