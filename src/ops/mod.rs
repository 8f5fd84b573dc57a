//! Operation descriptors and primitives
//!
//! A descriptor is the declarative specification of one operation; a
//! primitive descriptor is that specification validated against an engine;
//! a primitive is the executable unit built from it. Every primitive kind
//! shares the same two-phase lifecycle: `init` compiles and binds the
//! kernel once, `execute` binds runtime tensors and a stream and launches.

pub mod eltwise;

use crate::backend::{Engine, Stream};
use crate::error::PrimResult;
use crate::kernels::eltwise as eltwise_kernel;
use crate::memory::{MemoryObject, TensorDesc};

pub use eltwise::{EltwiseBwd, EltwiseBwdPd, EltwiseFwd, EltwiseFwdPd};

/// Propagation kind of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    ForwardTraining,
    ForwardInference,
    BackwardData,
}

impl PropKind {
    pub fn is_forward(self) -> bool {
        matches!(self, PropKind::ForwardTraining | PropKind::ForwardInference)
    }
}

/// Elementwise algorithm kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgKind {
    Relu,
    Linear,
    BoundedRelu,
    SoftRelu,
    Logistic,
}

impl AlgKind {
    /// Stable integer value used as the kernel-build constant
    pub fn as_int(self) -> i64 {
        match self {
            AlgKind::Relu => eltwise_kernel::RELU,
            AlgKind::Linear => eltwise_kernel::LINEAR,
            AlgKind::BoundedRelu => eltwise_kernel::BOUNDED_RELU,
            AlgKind::SoftRelu => eltwise_kernel::SOFT_RELU,
            AlgKind::Logistic => eltwise_kernel::LOGISTIC,
        }
    }
}

/// Operation attributes.
///
/// The reference implementation only applies to the default attribute set;
/// anything else must be rejected as unimplemented.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    output_scale: f32,
}

impl Default for Attr {
    fn default() -> Self {
        Attr { output_scale: 1.0 }
    }
}

impl Attr {
    pub fn with_output_scale(scale: f32) -> Self {
        Attr {
            output_scale: scale,
        }
    }

    pub fn has_default_values(&self) -> bool {
        *self == Attr::default()
    }
}

/// Declarative description of one elementwise operation
#[derive(Debug, Clone)]
pub struct EltwiseDesc {
    pub prop_kind: PropKind,
    pub alg_kind: AlgKind,
    pub data_desc: TensorDesc,
    /// Gradient-with-respect-to-output layout; backward only
    pub diff_data_desc: Option<TensorDesc>,
    pub attr: Attr,
}

impl EltwiseDesc {
    pub fn forward(prop_kind: PropKind, alg_kind: AlgKind, data_desc: TensorDesc) -> Self {
        EltwiseDesc {
            prop_kind,
            alg_kind,
            data_desc,
            diff_data_desc: None,
            attr: Attr::default(),
        }
    }

    pub fn backward(alg_kind: AlgKind, data_desc: TensorDesc, diff_data_desc: TensorDesc) -> Self {
        EltwiseDesc {
            prop_kind: PropKind::BackwardData,
            alg_kind,
            data_desc,
            diff_data_desc: Some(diff_data_desc),
            attr: Attr::default(),
        }
    }

    pub fn with_attr(mut self, attr: Attr) -> Self {
        self.attr = attr;
        self
    }
}

/// Runtime bindings for one `execute` call: live tensors, a stream, and the
/// scalar parameters the selected algorithm requires.
pub struct ExecContext<'a> {
    pub(crate) stream: &'a Stream,
    pub(crate) src: Option<&'a MemoryObject>,
    pub(crate) dst: Option<&'a MemoryObject>,
    pub(crate) diff_dst: Option<&'a MemoryObject>,
    pub(crate) diff_src: Option<&'a MemoryObject>,
    pub(crate) alpha: f32,
    pub(crate) beta: f32,
}

impl<'a> ExecContext<'a> {
    /// Forward bindings: input and output tensors
    pub fn forward(stream: &'a Stream, src: &'a MemoryObject, dst: &'a MemoryObject) -> Self {
        ExecContext {
            stream,
            src: Some(src),
            dst: Some(dst),
            diff_dst: None,
            diff_src: None,
            alpha: 0.0,
            beta: 0.0,
        }
    }

    /// Backward bindings: input, gradient w.r.t. output, gradient w.r.t. input
    pub fn backward(
        stream: &'a Stream,
        src: &'a MemoryObject,
        diff_dst: &'a MemoryObject,
        diff_src: &'a MemoryObject,
    ) -> Self {
        ExecContext {
            stream,
            src: Some(src),
            dst: None,
            diff_dst: Some(diff_dst),
            diff_src: Some(diff_src),
            alpha: 0.0,
            beta: 0.0,
        }
    }

    /// Bind the algorithm's scalar parameters (e.g. the bound for
    /// bounded-relu, slope/offset for linear)
    pub fn with_scalars(mut self, alpha: f32, beta: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }
}

/// Common lifecycle of every primitive kind
pub trait Primitive: std::fmt::Debug {
    /// Compile and bind the kernel; transitions the primitive to ready.
    fn init(&mut self) -> PrimResult<()>;

    /// Bind runtime tensors and a stream, then launch. Only valid after a
    /// successful `init`; each call is independent and repeatable.
    fn execute(&self, ctx: &ExecContext<'_>) -> PrimResult<()>;
}

/// Map an operation description to the matching primitive constructor.
///
/// Validation happens here; a rejected configuration surfaces as
/// `Unimplemented` so the caller's dispatch layer can try another
/// implementation candidate.
pub fn create_primitive(
    engine: &Engine,
    desc: &EltwiseDesc,
) -> PrimResult<Box<dyn Primitive>> {
    match desc.prop_kind {
        PropKind::ForwardTraining | PropKind::ForwardInference => {
            let pd = EltwiseFwdPd::new(engine, desc)?;
            Ok(Box::new(EltwiseFwd::new(pd)))
        }
        PropKind::BackwardData => {
            let pd = EltwiseBwdPd::new(engine, desc)?;
            Ok(Box::new(EltwiseBwd::new(pd)))
        }
    }
}
