//! Elementwise activation kernel template
//!
//! One shared template serves both directions; the active algorithm is a
//! build-time constant (`ALG_KIND`) matched against the five named algorithm
//! constants, and the direction is selected by the requested entry point
//! (`eltwise_fwd` / `eltwise_bwd`). Alpha and beta are runtime scalars bound
//! per launch.
//!
//! Forward argument order:  [src, dst, alpha, beta]
//! Backward argument order: [src, diff_dst, diff_src, alpha, beta]

use bytemuck::Pod;
use half::f16;

use crate::backend::{EntryPoint, KernelArg, KernelSpec, KernelTemplate};
use crate::memory::DataType;

/// Stable algorithm-kind constants shared with descriptor code
pub const RELU: i64 = 0x1f;
pub const LINEAR: i64 = 0x6f;
pub const BOUNDED_RELU: i64 = 0x8f;
pub const SOFT_RELU: i64 = 0x9f;
pub const LOGISTIC: i64 = 0xaf;

const ALG_NAMES: [&str; 5] = ["RELU", "LINEAR", "BOUNDED_RELU", "SOFT_RELU", "LOGISTIC"];

static TEMPLATE: KernelTemplate = KernelTemplate {
    name: "ref_eltwise",
    supported_types: &[DataType::F32, DataType::F16],
    required_defines: &[
        "RELU",
        "LINEAR",
        "BOUNDED_RELU",
        "SOFT_RELU",
        "LOGISTIC",
        "ALG_KIND",
    ],
    entry_points: &[
        EntryPoint {
            name: "eltwise_fwd",
            func: eltwise_fwd,
        },
        EntryPoint {
            name: "eltwise_bwd",
            func: eltwise_bwd,
        },
    ],
    validate: validate_spec,
};

/// The shared eltwise template
pub fn template() -> &'static KernelTemplate {
    &TEMPLATE
}

/// Algorithm resolved from the frozen spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alg {
    Relu,
    Linear,
    BoundedRelu,
    SoftRelu,
    Logistic,
}

fn validate_spec(spec: &KernelSpec) -> Result<(), String> {
    resolve_alg(spec).map(|_| ())
}

fn resolve_alg(spec: &KernelSpec) -> Result<Alg, String> {
    let selector = spec
        .int("ALG_KIND")
        .ok_or_else(|| "ALG_KIND selector is not defined".to_string())?;
    let name = ALG_NAMES
        .iter()
        .find(|name| spec.int(name) == Some(selector))
        .ok_or_else(|| {
            format!(
                "ALG_KIND {:#x} does not match any defined algorithm constant",
                selector
            )
        })?;
    Ok(match *name {
        "RELU" => Alg::Relu,
        "LINEAR" => Alg::Linear,
        "BOUNDED_RELU" => Alg::BoundedRelu,
        "SOFT_RELU" => Alg::SoftRelu,
        _ => Alg::Logistic,
    })
}

fn fwd_scalar(alg: Alg, x: f32, alpha: f32, beta: f32) -> f32 {
    match alg {
        Alg::Relu => {
            if x > 0.0 {
                x
            } else {
                alpha * x
            }
        }
        Alg::Linear => alpha * x + beta,
        Alg::BoundedRelu => {
            if x > 0.0 {
                x.min(alpha)
            } else {
                0.0
            }
        }
        Alg::SoftRelu => soft_relu(x),
        Alg::Logistic => logistic(x),
    }
}

fn bwd_scalar(alg: Alg, dd: f32, x: f32, alpha: f32, _beta: f32) -> f32 {
    match alg {
        Alg::Relu => dd * if x > 0.0 { 1.0 } else { alpha },
        Alg::Linear => dd * alpha,
        Alg::BoundedRelu => {
            if x > 0.0 && x < alpha {
                dd
            } else {
                0.0
            }
        }
        Alg::SoftRelu => dd * logistic(x),
        Alg::Logistic => {
            let v = logistic(x);
            dd * v * (1.0 - v)
        }
    }
}

/// ln(1 + e^x), stable for large |x|
fn soft_relu(x: f32) -> f32 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn eltwise_fwd(spec: &KernelSpec, args: &[KernelArg], global: usize) -> Result<(), String> {
    let alg = resolve_alg(spec)?;
    let [KernelArg::Buffer(src), KernelArg::Buffer(dst), KernelArg::F32(alpha), KernelArg::F32(beta)] =
        args
    else {
        return Err("eltwise_fwd expects [src, dst, alpha, beta]".to_string());
    };

    let apply = |x: f32| fwd_scalar(alg, x, *alpha, *beta);
    match spec.data_type() {
        DataType::F32 => map_unary::<f32>(src, dst, global, &apply),
        DataType::F16 => map_unary::<f16>(src, dst, global, &apply),
        other => Err(format!("eltwise template compiled for unsupported {:?}", other)),
    }
}

fn eltwise_bwd(spec: &KernelSpec, args: &[KernelArg], global: usize) -> Result<(), String> {
    let alg = resolve_alg(spec)?;
    let [KernelArg::Buffer(src), KernelArg::Buffer(diff_dst), KernelArg::Buffer(diff_src), KernelArg::F32(alpha), KernelArg::F32(beta)] =
        args
    else {
        return Err("eltwise_bwd expects [src, diff_dst, diff_src, alpha, beta]".to_string());
    };

    let apply = |dd: f32, x: f32| bwd_scalar(alg, dd, x, *alpha, *beta);
    match spec.data_type() {
        DataType::F32 => map_binary::<f32>(src, diff_dst, diff_src, global, &apply),
        DataType::F16 => map_binary::<f16>(src, diff_dst, diff_src, global, &apply),
        other => Err(format!("eltwise template compiled for unsupported {:?}", other)),
    }
}

/// Element with a lossless round-trip through f32 compute
trait Element: Pod {
    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl Element for f32 {
    fn to_f32(self) -> f32 {
        self
    }
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Element for f16 {
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

fn load<T: Element>(bytes: &[u8], idx: usize) -> T {
    let size = std::mem::size_of::<T>();
    bytemuck::pod_read_unaligned(&bytes[idx * size..][..size])
}

fn store<T: Element>(bytes: &mut [u8], idx: usize, value: T) {
    let size = std::mem::size_of::<T>();
    bytes[idx * size..][..size].copy_from_slice(bytemuck::bytes_of(&value));
}

// The map helpers hold at most one buffer lock at a time: operands are
// staged out under their own read lock before the output write lock is
// taken. Nested locks would let launches over shared buffers on different
// streams deadlock the modeled device; single-lock staging also makes
// aliased operands (in-place execution) work without special cases.

fn stage_f32<T: Element>(
    buf: &crate::backend::BufferHandle,
    global: usize,
) -> Result<Vec<f32>, String> {
    let data = buf
        .bytes()
        .read()
        .map_err(|_| "device buffer lock poisoned".to_string())?;
    check_len(data.len(), global * std::mem::size_of::<T>())?;
    Ok((0..global).map(|i| load::<T>(&data, i).to_f32()).collect())
}

fn store_f32<T: Element>(
    buf: &crate::backend::BufferHandle,
    values: Vec<f32>,
) -> Result<(), String> {
    let mut data = buf
        .bytes()
        .write()
        .map_err(|_| "device buffer lock poisoned".to_string())?;
    check_len(data.len(), values.len() * std::mem::size_of::<T>())?;
    for (i, v) in values.into_iter().enumerate() {
        store(&mut data, i, T::from_f32(v));
    }
    Ok(())
}

fn map_unary<T: Element>(
    src: &crate::backend::BufferHandle,
    dst: &crate::backend::BufferHandle,
    global: usize,
    apply: &dyn Fn(f32) -> f32,
) -> Result<(), String> {
    let staged: Vec<f32> = stage_f32::<T>(src, global)?
        .into_iter()
        .map(apply)
        .collect();
    store_f32::<T>(dst, staged)
}

fn map_binary<T: Element>(
    src: &crate::backend::BufferHandle,
    diff_dst: &crate::backend::BufferHandle,
    diff_src: &crate::backend::BufferHandle,
    global: usize,
    apply: &dyn Fn(f32, f32) -> f32,
) -> Result<(), String> {
    let xs = stage_f32::<T>(src, global)?;
    let staged: Vec<f32> = if diff_dst.same_buffer(src) {
        xs.iter().map(|&x| apply(x, x)).collect()
    } else {
        let dds = stage_f32::<T>(diff_dst, global)?;
        dds.into_iter().zip(xs).map(|(dd, x)| apply(dd, x)).collect()
    };
    store_f32::<T>(diff_src, staged)
}

fn check_len(have: usize, needed: usize) -> Result<(), String> {
    if have < needed {
        Err(format!(
            "device buffer holds {} bytes, launch range needs {} (freed or undersized)",
            have, needed
        ))
    } else {
        Ok(())
    }
}
