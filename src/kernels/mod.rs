//! Kernel templates
//!
//! Each template is a parameterized kernel description consumed by the
//! backend's `KernelBuilder`. Templates declare the numeric types they can
//! be specialized for, the named constants a build must bind, and their
//! entry points.

pub mod eltwise;
