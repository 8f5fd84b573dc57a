//! Tensor layout descriptors and memory objects
//!
//! `TensorDesc` is the declarative layout half (dims, numeric type, physical
//! strides); `MemoryObject` is the runtime half that binds a layout to at
//! most one device buffer, with explicit ownership semantics for buffers
//! adopted from outside the library.

mod desc;
mod object;

pub use desc::{DataType, FormatTag, TensorDesc};
pub use object::{AllocMode, MemoryObject};
