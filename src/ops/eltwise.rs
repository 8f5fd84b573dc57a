//! Reference elementwise activation primitives
//!
//! Forward and backward share the pipeline: the primitive descriptor
//! validates the configuration against the engine once; `init` specializes
//! the shared kernel template for the descriptor's numeric type and
//! algorithm kind and resolves the direction's entry point; `execute` binds
//! live tensors and a stream and launches over the flat element count of the
//! primary tensor (dense execution only).

use crate::backend::{Capability, Engine, Kernel, KernelArg, KernelBuilder};
use crate::error::{PrimForgeError, PrimResult};
use crate::kernels::eltwise as kernel;
use crate::memory::{DataType, MemoryObject};
use crate::ops::{EltwiseDesc, ExecContext, Primitive, PropKind};

fn build_eltwise_kernel(engine: &Engine, desc: &EltwiseDesc, entry: &str) -> PrimResult<Kernel> {
    let mut jit = KernelBuilder::new(kernel::template());
    jit.set_data_type(desc.data_desc.data_type());
    jit.define_int("RELU", kernel::RELU);
    jit.define_int("LINEAR", kernel::LINEAR);
    jit.define_int("BOUNDED_RELU", kernel::BOUNDED_RELU);
    jit.define_int("SOFT_RELU", kernel::SOFT_RELU);
    jit.define_int("LOGISTIC", kernel::LOGISTIC);
    jit.define_int("ALG_KIND", desc.alg_kind.as_int());

    let module = jit.build(engine)?;
    module.get_kernel(entry)
}

fn supported_data_type(dt: DataType) -> bool {
    matches!(dt, DataType::F32 | DataType::F16)
}

fn half_precision_ok(engine: &Engine, dt: DataType) -> bool {
    dt != DataType::F16 || engine.mayiuse(Capability::HalfPrecision)
}

fn bound_handle(
    mem: Option<&MemoryObject>,
    role: &str,
) -> PrimResult<crate::backend::BufferHandle> {
    let mem = mem.ok_or_else(|| {
        PrimForgeError::InvalidArguments(format!("execution context is missing the {} tensor", role))
    })?;
    mem.handle().ok_or_else(|| {
        PrimForgeError::InvalidArguments(format!("{} memory object has no buffer bound", role))
    })
}

/// Validated forward descriptor
#[derive(Debug, Clone)]
pub struct EltwiseFwdPd {
    desc: EltwiseDesc,
    engine: Engine,
}

impl EltwiseFwdPd {
    /// Validate a forward description against an engine.
    ///
    /// Pure: no device resources are touched beyond the capability query,
    /// and validity is computed exactly once here.
    pub fn new(engine: &Engine, desc: &EltwiseDesc) -> PrimResult<Self> {
        let ok = desc.prop_kind.is_forward()
            && supported_data_type(desc.data_desc.data_type())
            && desc.data_desc.is_dense()
            && desc.attr.has_default_values()
            && half_precision_ok(engine, desc.data_desc.data_type());
        if !ok {
            return Err(PrimForgeError::Unimplemented(
                "eltwise forward configuration not supported by the reference implementation"
                    .to_string(),
            ));
        }
        Ok(EltwiseFwdPd {
            desc: desc.clone(),
            engine: engine.clone(),
        })
    }

    pub fn desc(&self) -> &EltwiseDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Forward elementwise primitive
#[derive(Debug)]
pub struct EltwiseFwd {
    pd: EltwiseFwdPd,
    kernel: Option<Kernel>,
}

impl EltwiseFwd {
    /// Construct in the uninitialized state; `init` compiles the kernel.
    pub fn new(pd: EltwiseFwdPd) -> Self {
        EltwiseFwd { pd, kernel: None }
    }

    pub fn pd(&self) -> &EltwiseFwdPd {
        &self.pd
    }
}

impl Primitive for EltwiseFwd {
    fn init(&mut self) -> PrimResult<()> {
        let kernel = build_eltwise_kernel(&self.pd.engine, &self.pd.desc, "eltwise_fwd")?;
        self.kernel = Some(kernel);
        Ok(())
    }

    fn execute(&self, ctx: &ExecContext<'_>) -> PrimResult<()> {
        let kernel = self.kernel.as_ref().ok_or_else(|| {
            PrimForgeError::RuntimeError(
                "eltwise forward executed before a successful init".to_string(),
            )
        })?;
        let src = bound_handle(ctx.src, "source")?;
        let dst = bound_handle(ctx.dst, "destination")?;

        let nelems = self.pd.desc.data_desc.nelems();
        kernel.launch(
            ctx.stream,
            nelems,
            vec![
                KernelArg::Buffer(src),
                KernelArg::Buffer(dst),
                KernelArg::F32(ctx.alpha),
                KernelArg::F32(ctx.beta),
            ],
        )
    }
}

/// Validated backward descriptor
#[derive(Debug, Clone)]
pub struct EltwiseBwdPd {
    desc: EltwiseDesc,
    engine: Engine,
}

impl EltwiseBwdPd {
    /// Validate a backward description against an engine.
    ///
    /// Beyond the forward requirements, backward demands the exact
    /// backward-data propagation kind and a gradient layout structurally
    /// identical to the primary layout.
    pub fn new(engine: &Engine, desc: &EltwiseDesc) -> PrimResult<Self> {
        let diff = desc.diff_data_desc.as_ref().ok_or_else(|| {
            PrimForgeError::InvalidArguments(
                "backward descriptor requires a gradient layout".to_string(),
            )
        })?;

        let ok = desc.prop_kind == PropKind::BackwardData
            && supported_data_type(desc.data_desc.data_type())
            && desc.data_desc.is_dense()
            && desc.data_desc == *diff
            && desc.attr.has_default_values()
            && half_precision_ok(engine, desc.data_desc.data_type());
        if !ok {
            return Err(PrimForgeError::Unimplemented(
                "eltwise backward configuration not supported by the reference implementation"
                    .to_string(),
            ));
        }
        Ok(EltwiseBwdPd {
            desc: desc.clone(),
            engine: engine.clone(),
        })
    }

    pub fn desc(&self) -> &EltwiseDesc {
        &self.desc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Backward elementwise primitive
#[derive(Debug)]
pub struct EltwiseBwd {
    pd: EltwiseBwdPd,
    kernel: Option<Kernel>,
}

impl EltwiseBwd {
    pub fn new(pd: EltwiseBwdPd) -> Self {
        EltwiseBwd { pd, kernel: None }
    }

    pub fn pd(&self) -> &EltwiseBwdPd {
        &self.pd
    }
}

impl Primitive for EltwiseBwd {
    fn init(&mut self) -> PrimResult<()> {
        let kernel = build_eltwise_kernel(&self.pd.engine, &self.pd.desc, "eltwise_bwd")?;
        self.kernel = Some(kernel);
        Ok(())
    }

    fn execute(&self, ctx: &ExecContext<'_>) -> PrimResult<()> {
        let kernel = self.kernel.as_ref().ok_or_else(|| {
            PrimForgeError::RuntimeError(
                "eltwise backward executed before a successful init".to_string(),
            )
        })?;
        let src = bound_handle(ctx.src, "source")?;
        let diff_dst = bound_handle(ctx.diff_dst, "output-gradient")?;
        let diff_src = bound_handle(ctx.diff_src, "input-gradient")?;

        // the validator guaranteed the gradient layout matches the primary,
        // so the primary element count sizes the launch for all three
        let nelems = self.pd.desc.data_desc.nelems();
        kernel.launch(
            ctx.stream,
            nelems,
            vec![
                KernelArg::Buffer(src),
                KernelArg::Buffer(diff_dst),
                KernelArg::Buffer(diff_src),
                KernelArg::F32(ctx.alpha),
                KernelArg::F32(ctx.beta),
            ],
        )
    }
}
