//! C ABI boundary for the tenscore runtime.
//!
//! This crate describes the binary interface every tenscore runtime exposes:
//! the status record written by each call, the opaque handle types, the data
//! type codes and the signature of every exported function. It also ships a
//! reference runtime in [`host`] that implements the whole interface on host
//! memory and is built as a `cdylib` so it can be loaded like any other
//! runtime library.
//!
//! Every function except [`tc_string_ptr_fn`] takes a `*mut tc_error` as its
//! first argument. On success the runtime writes `code == 0` and a null
//! message; on failure it writes a non-zero code and an owned message that
//! the caller must release with `tc_string_free`.

#![allow(non_camel_case_types)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use libc::{c_char, c_int, size_t};
use std::ffi::c_void;

pub mod host;

// Status codes
pub type StatusCode = c_int;

pub const TC_STATUS_OK: StatusCode = 0;
pub const TC_STATUS_INVALID_ARGUMENT: StatusCode = -1;
pub const TC_STATUS_NOT_FOUND: StatusCode = -2;
pub const TC_STATUS_UNKNOWN_DEVICE: StatusCode = -3;
pub const TC_STATUS_OUT_OF_MEMORY: StatusCode = -4;
pub const TC_STATUS_INTERNAL: StatusCode = -5;

// Data type codes
pub type tc_datatype = c_int;

pub const TC_DATA_INVALID: tc_datatype = 0;
pub const TC_DATA_BOOLEAN: tc_datatype = 1;
pub const TC_DATA_INT8: tc_datatype = 2;
pub const TC_DATA_UINT8: tc_datatype = 3;
pub const TC_DATA_INT16: tc_datatype = 4;
pub const TC_DATA_UINT16: tc_datatype = 5;
pub const TC_DATA_INT32: tc_datatype = 6;
pub const TC_DATA_UINT32: tc_datatype = 7;
pub const TC_DATA_INT64: tc_datatype = 8;
pub const TC_DATA_UINT64: tc_datatype = 9;
pub const TC_DATA_BFLOAT16: tc_datatype = 10;
pub const TC_DATA_FLOAT16: tc_datatype = 11;
pub const TC_DATA_FLOAT32: tc_datatype = 12;
pub const TC_DATA_FLOAT64: tc_datatype = 13;

/// Status record written by every boundary call.
#[repr(C)]
#[derive(Debug)]
pub struct tc_error {
    pub code: StatusCode,
    pub msg: *mut tc_string,
}

impl tc_error {
    /// A status slot in the success state, ready to be passed to a call.
    pub const fn new() -> Self {
        Self {
            code: TC_STATUS_OK,
            msg: std::ptr::null_mut(),
        }
    }
}

impl Default for tc_error {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque owned string returned by the runtime.
#[repr(C)]
pub struct tc_string {
    _private: *mut c_void,
}

/// Opaque tensor shape descriptor.
#[repr(C)]
pub struct tc_shape {
    _private: *mut c_void,
}

/// Opaque device buffer.
#[repr(C)]
pub struct tc_buffer {
    _private: *mut c_void,
}

/// Opaque mapping of a device buffer into host memory.
#[repr(C)]
pub struct tc_view {
    _private: *mut c_void,
}

// ============================================================================
// Function signatures
// ============================================================================

pub type tc_init_fn = unsafe extern "C" fn(err: *mut tc_error);

pub type tc_string_ptr_fn = unsafe extern "C" fn(ptr: *mut tc_string) -> *const c_char;
pub type tc_string_free_fn = unsafe extern "C" fn(ptr: *mut tc_string);

pub type tc_shape_alloc_fn = unsafe extern "C" fn(
    err: *mut tc_error,
    dtype: tc_datatype,
    ndims: size_t,
    sizes: *const i64,
    strides: *const i64,
) -> *mut tc_shape;
pub type tc_shape_free_fn = unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape);
pub type tc_shape_get_dtype_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape) -> tc_datatype;
pub type tc_shape_get_ndims_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape) -> size_t;
pub type tc_shape_get_nbytes_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape) -> u64;
pub type tc_shape_get_sizes_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape, out: *mut i64);
pub type tc_shape_get_strides_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape, out: *mut i64);
pub type tc_shape_repr_fn =
    unsafe extern "C" fn(err: *mut tc_error, shape: *mut tc_shape) -> *mut tc_string;

pub type tc_buffer_alloc_fn = unsafe extern "C" fn(
    err: *mut tc_error,
    device: *const c_char,
    nbytes: size_t,
) -> *mut tc_buffer;
pub type tc_buffer_free_fn = unsafe extern "C" fn(err: *mut tc_error, buffer: *mut tc_buffer);
pub type tc_buffer_size_fn =
    unsafe extern "C" fn(err: *mut tc_error, buffer: *mut tc_buffer) -> size_t;
pub type tc_buffer_mmap_fn =
    unsafe extern "C" fn(err: *mut tc_error, buffer: *mut tc_buffer) -> *mut tc_view;

pub type tc_view_free_fn = unsafe extern "C" fn(err: *mut tc_error, view: *mut tc_view);
pub type tc_view_data_fn =
    unsafe extern "C" fn(err: *mut tc_error, view: *mut tc_view) -> *mut c_char;
pub type tc_view_size_fn = unsafe extern "C" fn(err: *mut tc_error, view: *mut tc_view) -> size_t;
pub type tc_view_writeback_fn = unsafe extern "C" fn(err: *mut tc_error, view: *mut tc_view);

pub type tc_settings_get_fn =
    unsafe extern "C" fn(err: *mut tc_error, key: *const c_char) -> *mut tc_string;
pub type tc_settings_set_fn =
    unsafe extern "C" fn(err: *mut tc_error, key: *const c_char, value: *const c_char);

/// Names of the exported symbols, in the order a loader resolves them.
pub mod symbols {
    pub const INIT: &[u8] = b"tc_init\0";
    pub const STRING_PTR: &[u8] = b"tc_string_ptr\0";
    pub const STRING_FREE: &[u8] = b"tc_string_free\0";
    pub const SHAPE_ALLOC: &[u8] = b"tc_shape_alloc\0";
    pub const SHAPE_FREE: &[u8] = b"tc_shape_free\0";
    pub const SHAPE_GET_DTYPE: &[u8] = b"tc_shape_get_dtype\0";
    pub const SHAPE_GET_NDIMS: &[u8] = b"tc_shape_get_ndims\0";
    pub const SHAPE_GET_NBYTES: &[u8] = b"tc_shape_get_nbytes\0";
    pub const SHAPE_GET_SIZES: &[u8] = b"tc_shape_get_sizes\0";
    pub const SHAPE_GET_STRIDES: &[u8] = b"tc_shape_get_strides\0";
    pub const SHAPE_REPR: &[u8] = b"tc_shape_repr\0";
    pub const BUFFER_ALLOC: &[u8] = b"tc_buffer_alloc\0";
    pub const BUFFER_FREE: &[u8] = b"tc_buffer_free\0";
    pub const BUFFER_SIZE: &[u8] = b"tc_buffer_size\0";
    pub const BUFFER_MMAP_CURRENT: &[u8] = b"tc_buffer_mmap_current\0";
    pub const BUFFER_MMAP_DISCARD: &[u8] = b"tc_buffer_mmap_discard\0";
    pub const VIEW_FREE: &[u8] = b"tc_view_free\0";
    pub const VIEW_DATA: &[u8] = b"tc_view_data\0";
    pub const VIEW_SIZE: &[u8] = b"tc_view_size\0";
    pub const VIEW_WRITEBACK: &[u8] = b"tc_view_writeback\0";
    pub const SETTINGS_GET: &[u8] = b"tc_settings_get\0";
    pub const SETTINGS_SET: &[u8] = b"tc_settings_set\0";
}
