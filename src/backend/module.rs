//! Kernel modules and kernels
//!
//! A `KernelModule` is the engine-bound artifact produced by compiling a
//! kernel template against a parameter record (numeric-type selector plus
//! named integer constants). Named entry points resolve to `Kernel`s, which
//! validate and enqueue launches over a flat index range.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::buffer::BufferHandle;
use crate::backend::engine::Engine;
use crate::backend::stream::Stream;
use crate::error::{PrimForgeError, PrimResult};
use crate::memory::DataType;

/// Entry function of a compiled kernel: runs on the stream worker over the
/// flat range `0..global`, reading its parameters from the frozen spec and
/// its operands from the positional argument list.
pub type KernelFn = fn(&KernelSpec, &[KernelArg], usize) -> Result<(), String>;

/// One named entry point of a kernel template
#[derive(Debug)]
pub struct EntryPoint {
    pub name: &'static str,
    pub func: KernelFn,
}

/// A parameterized kernel template.
///
/// The same template is shared by every direction of an operation; build-time
/// constants and the requested entry point select the behavior.
#[derive(Debug)]
pub struct KernelTemplate {
    pub name: &'static str,
    pub supported_types: &'static [DataType],
    /// Named integer constants that must be defined for a build to succeed
    pub required_defines: &'static [&'static str],
    pub entry_points: &'static [EntryPoint],
    /// Template-specific consistency check run at build time
    pub validate: fn(&KernelSpec) -> Result<(), String>,
}

/// Frozen parameter record of one compiled kernel
#[derive(Debug, Clone)]
pub struct KernelSpec {
    data_type: DataType,
    defines: BTreeMap<String, i64>,
}

impl KernelSpec {
    pub(crate) fn new(data_type: DataType, defines: BTreeMap<String, i64>) -> Self {
        KernelSpec { data_type, defines }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Value of a named integer constant, if defined
    pub fn int(&self, name: &str) -> Option<i64> {
        self.defines.get(name).copied()
    }
}

/// Positional kernel argument
#[derive(Debug, Clone)]
pub enum KernelArg {
    Buffer(BufferHandle),
    F32(f32),
}

/// Compiled, engine-bound kernel module
#[derive(Debug)]
pub struct KernelModule {
    template: &'static KernelTemplate,
    spec: Arc<KernelSpec>,
    engine: Engine,
}

impl KernelModule {
    pub(crate) fn new(
        template: &'static KernelTemplate,
        spec: KernelSpec,
        engine: Engine,
    ) -> Self {
        KernelModule {
            template,
            spec: Arc::new(spec),
            engine,
        }
    }

    /// Resolve a named entry point.
    ///
    /// A missing entry point after a successful compile is a runtime error,
    /// uniformly for every direction.
    pub fn get_kernel(&self, name: &str) -> PrimResult<Kernel> {
        let entry = self
            .template
            .entry_points
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                PrimForgeError::RuntimeError(format!(
                    "entry point '{}' not found in compiled template '{}'",
                    name, self.template.name
                ))
            })?;
        tracing::trace!(template = self.template.name, entry = name, "resolved kernel");
        Ok(Kernel {
            name: entry.name,
            func: entry.func,
            spec: Arc::clone(&self.spec),
            engine: self.engine.clone(),
        })
    }
}

/// Executable kernel bound to one entry point of a compiled module
#[derive(Debug)]
pub struct Kernel {
    name: &'static str,
    func: KernelFn,
    spec: Arc<KernelSpec>,
    engine: Engine,
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spec(&self) -> &KernelSpec {
        &self.spec
    }

    /// Enqueue a launch over the flat range `0..global`.
    ///
    /// Malformed launches (empty range, undersized buffer arguments) fail
    /// synchronously here; execution itself happens on the stream.
    pub fn launch(&self, stream: &Stream, global: usize, args: Vec<KernelArg>) -> PrimResult<()> {
        if global == 0 {
            return Err(PrimForgeError::RuntimeError(
                "kernel launch with an empty global range".to_string(),
            ));
        }

        let elem_size = self.spec.data_type().size();
        let needed = global * elem_size;
        for (idx, arg) in args.iter().enumerate() {
            if let KernelArg::Buffer(buf) = arg {
                if buf.size() < needed {
                    return Err(PrimForgeError::RuntimeError(format!(
                        "launch of '{}': buffer argument {} holds {} bytes, range needs {}",
                        self.name,
                        idx,
                        buf.size(),
                        needed
                    )));
                }
            }
        }

        let block = self.engine.device().max_threads_per_block().min(256);
        let grid = grid_for(global as u64, block)?;
        tracing::trace!(
            kernel = self.name,
            global,
            grid,
            block,
            "enqueueing kernel launch"
        );

        let func = self.func;
        let spec = Arc::clone(&self.spec);
        stream.enqueue(Box::new(move || func(&spec, &args, global)))
    }
}

#[inline]
fn ceil_div_u64(numerator: u64, denominator: u64) -> u64 {
    assert!(denominator > 0, "division by zero in ceil_div_u64");
    (numerator + denominator - 1) / denominator
}

/// Number of blocks covering `global` at the given block size
fn grid_for(global: u64, block: u32) -> PrimResult<u32> {
    let tiles = ceil_div_u64(global, block as u64);
    if tiles > u32::MAX as u64 {
        return Err(PrimForgeError::RuntimeError(format!(
            "grid dimension {} exceeds u32::MAX for global range {}",
            tiles, global
        )));
    }
    Ok(tiles as u32)
}
