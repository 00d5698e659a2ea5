//! Shape descriptors.

use super::{Failure, HostResult, ResourceKind, guarded, new_string, opaque_handle};
use crate::*;
use libc::size_t;
use std::ptr;

/// Host representation of a `tc_shape`.
#[derive(Debug, Clone)]
pub(crate) struct ShapeDesc {
    dtype: tc_datatype,
    sizes: Vec<i64>,
    strides: Vec<i64>,
}

opaque_handle!(tc_shape, ShapeDesc, ResourceKind::Shape);

/// Canonical name and element width in bytes of a data type code.
fn dtype_info(dtype: tc_datatype) -> Option<(&'static str, u64)> {
    let info = match dtype {
        TC_DATA_INVALID => ("<invalid>", 0),
        TC_DATA_BOOLEAN => ("bool", 1),
        TC_DATA_INT8 => ("int8", 1),
        TC_DATA_UINT8 => ("uint8", 1),
        TC_DATA_INT16 => ("int16", 2),
        TC_DATA_UINT16 => ("uint16", 2),
        TC_DATA_INT32 => ("int32", 4),
        TC_DATA_UINT32 => ("uint32", 4),
        TC_DATA_INT64 => ("int64", 8),
        TC_DATA_UINT64 => ("uint64", 8),
        TC_DATA_BFLOAT16 => ("bfloat16", 2),
        TC_DATA_FLOAT16 => ("float16", 2),
        TC_DATA_FLOAT32 => ("float32", 4),
        TC_DATA_FLOAT64 => ("float64", 8),
        _ => return None,
    };
    Some(info)
}

impl ShapeDesc {
    fn new(dtype: tc_datatype, sizes: Vec<i64>, strides: Vec<i64>) -> HostResult<Self> {
        if dtype_info(dtype).is_none() {
            return Err(Failure::invalid(format!("unknown data type code {dtype}")));
        }
        if let Some(size) = sizes.iter().find(|&&s| s < 0) {
            return Err(Failure::invalid(format!("negative dimension size {size}")));
        }
        if let Some(stride) = strides.iter().find(|&&s| s < 0) {
            return Err(Failure::invalid(format!("negative stride {stride}")));
        }
        Ok(Self {
            dtype,
            sizes,
            strides,
        })
    }

    fn width(&self) -> u64 {
        dtype_info(self.dtype).map_or(0, |(_, width)| width)
    }

    /// Bytes spanned by the strided layout: one past the furthest element.
    fn nbytes(&self) -> HostResult<u64> {
        if self.sizes.contains(&0) {
            return Ok(0);
        }
        let mut extent: u64 = 1;
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            let reach = (size as u64 - 1)
                .checked_mul(stride as u64)
                .ok_or_else(|| Failure::invalid("shape footprint overflows u64"))?;
            extent = extent
                .checked_add(reach)
                .ok_or_else(|| Failure::invalid("shape footprint overflows u64"))?;
        }
        extent
            .checked_mul(self.width())
            .ok_or_else(|| Failure::invalid("shape footprint overflows u64"))
    }

    fn repr(&self) -> String {
        let name = dtype_info(self.dtype).map_or("<invalid>", |(name, _)| name);
        let dims: Vec<String> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .map(|(size, stride)| format!("{size}:{stride}"))
            .collect();
        format!("{name}({})", dims.join(", "))
    }
}

unsafe fn read_dims(ptr: *const i64, ndims: size_t, what: &str) -> HostResult<Vec<i64>> {
    if ndims == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(Failure::invalid(format!("{what} must not be null")));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, ndims) }.to_vec())
}

unsafe fn write_dims(out: *mut i64, values: &[i64]) -> HostResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    if out.is_null() {
        return Err(Failure::invalid("output array must not be null"));
    }
    unsafe { ptr::copy_nonoverlapping(values.as_ptr(), out, values.len()) };
    Ok(())
}

/// Allocate a shape descriptor.
///
/// # Arguments
/// * `dtype` - Element data type code
/// * `ndims` - Number of dimensions
/// * `sizes` - Pointer to `ndims` dimension sizes
/// * `strides` - Pointer to `ndims` strides, in elements
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_alloc(
    err: *mut tc_error,
    dtype: tc_datatype,
    ndims: size_t,
    sizes: *const i64,
    strides: *const i64,
) -> *mut tc_shape {
    guarded(err, ptr::null_mut(), || {
        let sizes = unsafe { read_dims(sizes, ndims, "sizes")? };
        let strides = unsafe { read_dims(strides, ndims, "strides")? };
        let desc = ShapeDesc::new(dtype, sizes, strides)?;
        Ok(tc_shape::into_raw(desc))
    })
}

/// Release a shape descriptor.
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_free(err: *mut tc_error, shape: *mut tc_shape) {
    guarded(err, (), || unsafe { tc_shape::destroy(shape) })
}

/// Get the data type code.
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_get_dtype(err: *mut tc_error, shape: *mut tc_shape) -> tc_datatype {
    guarded(err, TC_DATA_INVALID, || {
        Ok(unsafe { tc_shape::get(shape)? }.dtype)
    })
}

/// Get the number of dimensions.
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_get_ndims(err: *mut tc_error, shape: *mut tc_shape) -> size_t {
    guarded(err, 0, || Ok(unsafe { tc_shape::get(shape)? }.sizes.len()))
}

/// Get the number of bytes spanned by the layout.
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_get_nbytes(err: *mut tc_error, shape: *mut tc_shape) -> u64 {
    guarded(err, 0, || unsafe { tc_shape::get(shape)? }.nbytes())
}

/// Copy the dimension sizes into `out` (must have space for ndims elements).
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_get_sizes(err: *mut tc_error, shape: *mut tc_shape, out: *mut i64) {
    guarded(err, (), || unsafe {
        let desc = tc_shape::get(shape)?;
        write_dims(out, &desc.sizes)
    })
}

/// Copy the strides into `out` (must have space for ndims elements).
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_get_strides(err: *mut tc_error, shape: *mut tc_shape, out: *mut i64) {
    guarded(err, (), || unsafe {
        let desc = tc_shape::get(shape)?;
        write_dims(out, &desc.strides)
    })
}

/// Render the canonical representation, e.g. `float32(2:3, 3:1)`.
#[unsafe(no_mangle)]
pub extern "C" fn tc_shape_repr(err: *mut tc_error, shape: *mut tc_shape) -> *mut tc_string {
    guarded(err, ptr::null_mut(), || {
        Ok(new_string(unsafe { tc_shape::get(shape)? }.repr()))
    })
}
