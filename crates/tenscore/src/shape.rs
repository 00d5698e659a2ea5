//! Tensor shapes.
//!
//! A [`TensorShape`] is an immutable description of a tensor's memory
//! layout: element type plus per-dimension sizes and strides. The descriptor
//! itself lives in the runtime; cloning a shape shares it.
//!
//! ```text
//! TensorShape ── Rc<Handle<ShapeKind>> ── tc_shape (runtime)
//! ```

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ffi::{self, RuntimeApi};
use crate::handle::{Handle, ShapeKind};
use crate::strides::{Dims, compute_strides, is_row_major};
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;
use tenscore_sys as sys;

/// Element type and strided layout of a tensor.
#[derive(Clone)]
pub struct TensorShape {
    handle: Rc<Handle<ShapeKind>>,
}

impl TensorShape {
    /// Create the empty shape: invalid dtype, no dimensions.
    pub fn empty() -> Result<Self> {
        Self::alloc(DType::Invalid, &[], &[])
    }

    /// Create a dense row-major shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenscore::{DType, TensorShape};
    ///
    /// tenscore::init().unwrap();
    /// let shape = TensorShape::new(DType::Float32, &[2, 3]).unwrap();
    /// assert_eq!(shape.strides().unwrap().as_slice(), &[3, 1]);
    /// assert_eq!(shape.nbytes().unwrap(), 24);
    /// ```
    pub fn new(dtype: DType, sizes: &[i64]) -> Result<Self> {
        let strides = compute_strides(sizes);
        Self::alloc(dtype, sizes, &strides)
    }

    /// Create a shape with explicit strides (in elements).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `sizes` and `strides` differ in
    /// length. Nothing is allocated in that case.
    pub fn with_strides(dtype: DType, sizes: &[i64], strides: &[i64]) -> Result<Self> {
        if sizes.len() != strides.len() {
            return Err(Error::invalid_argument(format!(
                "sizes and strides must have the same rank (got {} sizes, {} strides)",
                sizes.len(),
                strides.len()
            )));
        }
        Self::alloc(dtype, sizes, strides)
    }

    /// Take ownership of a shape descriptor produced by the runtime.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live `tc_shape` from the installed runtime that no one
    /// else will free.
    pub unsafe fn from_raw(ptr: *mut sys::tc_shape) -> Result<Self> {
        let api = ffi::runtime()?;
        Ok(Self {
            handle: Rc::new(unsafe { Handle::from_raw(api, ptr) }),
        })
    }

    fn alloc(dtype: DType, sizes: &[i64], strides: &[i64]) -> Result<Self> {
        let api = ffi::runtime()?;
        let ptr = api.call(|err| unsafe {
            (api.shape_alloc)(
                err,
                dtype.code(),
                sizes.len(),
                sizes.as_ptr(),
                strides.as_ptr(),
            )
        })?;
        Ok(Self {
            handle: Rc::new(unsafe { Handle::from_raw(api, ptr) }),
        })
    }

    #[inline]
    fn api(&self) -> &'static RuntimeApi {
        self.handle.api()
    }

    /// Element type.
    pub fn dtype(&self) -> Result<DType> {
        let api = self.api();
        let code = api.call(|err| unsafe { (api.shape_get_dtype)(err, self.as_ptr()) })?;
        DType::from_code(code)
            .ok_or_else(|| Error::runtime(format!("runtime returned unknown data type code {code}")))
    }

    /// Number of dimensions.
    pub fn ndims(&self) -> Result<usize> {
        let api = self.api();
        api.call(|err| unsafe { (api.shape_get_ndims)(err, self.as_ptr()) })
    }

    /// Bytes spanned by the layout.
    pub fn nbytes(&self) -> Result<u64> {
        let api = self.api();
        api.call(|err| unsafe { (api.shape_get_nbytes)(err, self.as_ptr()) })
    }

    /// Size of each dimension.
    pub fn sizes(&self) -> Result<Dims> {
        let api = self.api();
        let mut sizes: Dims = SmallVec::from_elem(0, self.ndims()?);
        api.call(|err| unsafe {
            (api.shape_get_sizes)(err, self.as_ptr(), sizes.as_mut_ptr())
        })?;
        Ok(sizes)
    }

    /// Stride of each dimension, in elements.
    pub fn strides(&self) -> Result<Dims> {
        let api = self.api();
        let mut strides: Dims = SmallVec::from_elem(0, self.ndims()?);
        api.call(|err| unsafe {
            (api.shape_get_strides)(err, self.as_ptr(), strides.as_mut_ptr())
        })?;
        Ok(strides)
    }

    /// True if the layout is dense row-major.
    pub fn is_contiguous(&self) -> Result<bool> {
        Ok(is_row_major(&self.sizes()?, &self.strides()?))
    }

    /// Canonical string representation, e.g. `float32(2:3, 3:1)`.
    pub fn repr(&self) -> Result<String> {
        let api = self.api();
        let ptr = api.call(|err| unsafe { (api.shape_repr)(err, self.as_ptr()) })?;
        Ok(unsafe { api.take_string(ptr) })
    }

    /// The raw descriptor. Remains owned by this shape.
    #[inline]
    pub fn as_ptr(&self) -> *mut sys::tc_shape {
        self.handle.as_ptr()
    }
}

/// Shapes are equal when their canonical representations match. A shape
/// whose representation cannot be read compares unequal to everything.
impl PartialEq for TensorShape {
    fn eq(&self, other: &Self) -> bool {
        match (self.repr(), other.repr()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(repr) => f.write_str(&repr),
            Err(err) => write!(f, "<unavailable: {err}>"),
        }
    }
}

impl fmt::Debug for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TensorShape")
            .field(&format_args!("{self}"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        crate::init().unwrap();
    }

    #[test]
    fn test_float32_2x3() {
        setup();
        let shape = TensorShape::new(DType::Float32, &[2, 3]).unwrap();
        assert_eq!(shape.dtype().unwrap(), DType::Float32);
        assert_eq!(shape.ndims().unwrap(), 2);
        assert_eq!(shape.sizes().unwrap().as_slice(), &[2, 3]);
        assert_eq!(shape.strides().unwrap().as_slice(), &[3, 1]);
        assert_eq!(shape.nbytes().unwrap(), 24);
        assert!(shape.is_contiguous().unwrap());
    }

    #[test]
    fn test_empty_shape() {
        setup();
        let shape = TensorShape::empty().unwrap();
        assert_eq!(shape.dtype().unwrap(), DType::Invalid);
        assert_eq!(shape.ndims().unwrap(), 0);
        assert_eq!(shape.nbytes().unwrap(), 0);
        assert!(shape.sizes().unwrap().is_empty());
    }

    #[test]
    fn test_rank_mismatch() {
        setup();
        let err = TensorShape::with_strides(DType::Float32, &[2, 3], &[1]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_padded_strides() {
        setup();
        let shape = TensorShape::with_strides(DType::UInt8, &[2, 3], &[4, 1]).unwrap();
        assert_eq!(shape.strides().unwrap().as_slice(), &[4, 1]);
        assert!(!shape.is_contiguous().unwrap());
        assert_eq!(shape.nbytes().unwrap(), 7);
    }

    #[test]
    fn test_repr_and_display() {
        setup();
        let shape = TensorShape::new(DType::Int64, &[4]).unwrap();
        assert_eq!(shape.repr().unwrap(), "int64(4:1)");
        assert_eq!(shape.to_string(), "int64(4:1)");
        assert!(format!("{shape:?}").contains("int64(4:1)"));
    }

    #[test]
    fn test_clone_shares_descriptor() {
        setup();
        let shape = TensorShape::new(DType::Int8, &[3]).unwrap();
        let copy = shape.clone();
        assert_eq!(shape.as_ptr(), copy.as_ptr());
        assert_eq!(shape, copy);
    }

    #[test]
    fn test_negative_size_is_runtime_failure() {
        setup();
        let err = TensorShape::new(DType::Int8, &[-2]).unwrap_err();
        assert!(err.is_runtime());
        assert_eq!(err.code(), Some(sys::TC_STATUS_INVALID_ARGUMENT));
    }
}
