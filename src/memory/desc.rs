//! Tensor layout descriptors

use crate::error::{PrimForgeError, PrimResult};

/// Numeric element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    F16,
    Bf16,
}

impl DataType {
    /// Element size in bytes
    pub fn size(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F16 | DataType::Bf16 => 2,
        }
    }
}

/// Well-known physical layouts.
///
/// Tags are a convenience for constructing stride vectors; layouts with
/// explicit padding are built through [`TensorDesc::with_strides`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    /// Contiguous in the declared dimension order (row-major). For rank-4
    /// tensors this is the classic NCHW layout.
    Nchw,
    /// Channels-last layout for rank-4 tensors
    Nhwc,
}

/// Tensor layout descriptor: dimensions, numeric type, physical strides.
///
/// Dimensions are logical; strides are in elements, one per dimension in
/// declaration order. Two descriptors compare equal when dims, type, and
/// strides all match, which is exactly the structural-identity rule the
/// backward validator relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    dims: Vec<usize>,
    data_type: DataType,
    strides: Vec<usize>,
}

impl TensorDesc {
    /// Build a descriptor from a format tag
    pub fn new(dims: &[usize], data_type: DataType, tag: FormatTag) -> PrimResult<Self> {
        validate_dims(dims)?;
        let strides = match tag {
            FormatTag::Nchw => contiguous_strides(dims),
            FormatTag::Nhwc => {
                if dims.len() != 4 {
                    return Err(PrimForgeError::InvalidArguments(format!(
                        "nhwc requires rank 4, got rank {}",
                        dims.len()
                    )));
                }
                let (c, h, w) = (dims[1], dims[2], dims[3]);
                vec![c * h * w, 1, w * c, c]
            }
        };
        Ok(TensorDesc {
            dims: dims.to_vec(),
            data_type,
            strides,
        })
    }

    /// Build a descriptor from explicit strides (in elements).
    ///
    /// This is the route to padded layouts: strides larger than the packed
    /// ones leave gaps between logically adjacent elements.
    pub fn with_strides(
        dims: &[usize],
        data_type: DataType,
        strides: &[usize],
    ) -> PrimResult<Self> {
        validate_dims(dims)?;
        if strides.len() != dims.len() {
            return Err(PrimForgeError::InvalidArguments(format!(
                "rank mismatch: {} dims vs {} strides",
                dims.len(),
                strides.len()
            )));
        }
        Ok(TensorDesc {
            dims: dims.to_vec(),
            data_type,
            strides: strides.to_vec(),
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// Total logical element count
    pub fn nelems(&self) -> usize {
        self.dims.iter().product()
    }

    /// Bytes spanned by the layout, padding included
    pub fn size_bytes(&self) -> usize {
        let last = self
            .dims
            .iter()
            .zip(&self.strides)
            .map(|(d, s)| (d - 1) * s)
            .sum::<usize>();
        (last + 1) * self.data_type.size()
    }

    /// True when the layout has no gaps between logically adjacent elements,
    /// under any permutation of the dimensions. Size-1 dimensions carry no
    /// addressing information (their stride is never multiplied in) and are
    /// ignored, so e.g. contiguous `[2,1,4,5]` with tied strides stays dense.
    pub fn is_dense(&self) -> bool {
        let mut order: Vec<(usize, usize)> = self
            .strides
            .iter()
            .copied()
            .zip(self.dims.iter().copied())
            .filter(|&(_, dim)| dim != 1)
            .collect();
        order.sort_by_key(|&(stride, _)| stride);

        let mut expected = 1usize;
        for (stride, dim) in order {
            if stride != expected {
                return false;
            }
            expected *= dim;
        }
        true
    }
}

fn validate_dims(dims: &[usize]) -> PrimResult<()> {
    if dims.is_empty() {
        return Err(PrimForgeError::InvalidArguments(
            "tensor descriptor requires at least one dimension".to_string(),
        ));
    }
    if dims.iter().any(|&d| d == 0) {
        return Err(PrimForgeError::InvalidArguments(format!(
            "zero-sized dimension in {:?}",
            dims
        )));
    }
    Ok(())
}

fn contiguous_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nchw_is_dense() {
        let desc = TensorDesc::new(&[2, 3, 4, 5], DataType::F32, FormatTag::Nchw).unwrap();
        assert!(desc.is_dense());
        assert_eq!(desc.nelems(), 120);
        assert_eq!(desc.size_bytes(), 480);
        assert_eq!(desc.strides(), &[60, 20, 5, 1]);
    }

    #[test]
    fn nhwc_is_dense_but_not_equal_to_nchw() {
        let nhwc = TensorDesc::new(&[2, 3, 4, 5], DataType::F32, FormatTag::Nhwc).unwrap();
        let nchw = TensorDesc::new(&[2, 3, 4, 5], DataType::F32, FormatTag::Nchw).unwrap();
        assert!(nhwc.is_dense());
        assert_ne!(nhwc, nchw);
    }

    #[test]
    fn singleton_dims_do_not_break_density() {
        // contiguous with C=1: strides tie at 20 and must not confuse the scan
        let desc = TensorDesc::new(&[2, 1, 4, 5], DataType::F32, FormatTag::Nchw).unwrap();
        assert_eq!(desc.strides(), &[20, 20, 5, 1]);
        assert!(desc.is_dense());

        let desc = TensorDesc::new(&[1, 3, 1, 5], DataType::F32, FormatTag::Nchw).unwrap();
        assert!(desc.is_dense());

        // all-singleton tensor is trivially dense
        let desc = TensorDesc::new(&[1, 1, 1, 1], DataType::F32, FormatTag::Nchw).unwrap();
        assert!(desc.is_dense());
    }

    #[test]
    fn singleton_dim_with_padded_stride_is_still_padded() {
        // the size-1 dim is ignored, but the gap after each row remains
        let desc = TensorDesc::with_strides(&[2, 1, 4], DataType::F32, &[6, 6, 1]).unwrap();
        assert!(!desc.is_dense());
    }

    #[test]
    fn padded_strides_are_not_dense() {
        // innermost stride 2 leaves a gap after every element
        let desc = TensorDesc::with_strides(&[2, 4], DataType::F32, &[8, 2]).unwrap();
        assert!(!desc.is_dense());
        assert_eq!(desc.size_bytes(), (1 * 8 + 3 * 2 + 1) * 4);
    }

    #[test]
    fn padded_outer_dim_is_not_dense() {
        // row stride 6 pads each row of 4 elements by 2
        let desc = TensorDesc::with_strides(&[3, 4], DataType::F16, &[6, 1]).unwrap();
        assert!(!desc.is_dense());
    }

    #[test]
    fn rank_stride_mismatch_is_invalid() {
        let err = TensorDesc::with_strides(&[2, 3], DataType::F32, &[3]).unwrap_err();
        assert!(matches!(err, PrimForgeError::InvalidArguments(_)));
    }

    #[test]
    fn zero_dim_is_invalid() {
        let err = TensorDesc::new(&[2, 0, 4], DataType::F32, FormatTag::Nchw).unwrap_err();
        assert!(matches!(err, PrimForgeError::InvalidArguments(_)));
    }

    #[test]
    fn nhwc_requires_rank_four() {
        let err = TensorDesc::new(&[2, 3, 4], DataType::F32, FormatTag::Nhwc).unwrap_err();
        assert!(matches!(err, PrimForgeError::InvalidArguments(_)));
    }

    #[test]
    fn f16_element_size() {
        let desc = TensorDesc::new(&[4, 4], DataType::F16, FormatTag::Nchw).unwrap();
        assert_eq!(desc.size_bytes(), 32);
    }
}
