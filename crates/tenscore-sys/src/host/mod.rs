//! Reference runtime backed by host memory.
//!
//! Every function here is exported with its C name so the crate can be loaded
//! as a shared library, and is also callable directly from Rust. The runtime
//! is single-threaded per handle: callers serialize access to a handle and
//! free it on the thread that created it.
//!
//! Two devices are available:
//!
//! - `host.0`: views alias the buffer memory and writeback is a no-op.
//! - `staged.0`: views are staging copies; writeback copies them back.

mod buffer;
mod settings;
mod shape;

pub use buffer::{
    tc_buffer_alloc, tc_buffer_free, tc_buffer_mmap_current, tc_buffer_mmap_discard,
    tc_buffer_size, tc_view_data, tc_view_free, tc_view_size, tc_view_writeback, DEVICE_NAMES,
};
pub use settings::{ENV_PREFIX, tc_init, tc_settings_get, tc_settings_set};
pub use shape::{
    tc_shape_alloc, tc_shape_free, tc_shape_get_dtype, tc_shape_get_nbytes, tc_shape_get_ndims,
    tc_shape_get_sizes, tc_shape_get_strides, tc_shape_repr,
};

use crate::{StatusCode, TC_STATUS_INTERNAL, TC_STATUS_INVALID_ARGUMENT, tc_error, tc_string};
use libc::c_char;
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

/// Resource kinds tracked by the live-handle counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Shape = 0,
    Buffer = 1,
    View = 2,
    String = 3,
}

thread_local! {
    static LIVE: [Cell<usize>; 4] = const { [Cell::new(0), Cell::new(0), Cell::new(0), Cell::new(0)] };
}

/// Number of handles of `kind` created and not yet freed on the calling thread.
pub fn live_handles(kind: ResourceKind) -> usize {
    LIVE.with(|live| live[kind as usize].get())
}

fn retain(kind: ResourceKind) {
    LIVE.with(|live| {
        let cell = &live[kind as usize];
        cell.set(cell.get() + 1);
    });
}

fn release(kind: ResourceKind) {
    LIVE.with(|live| {
        let cell = &live[kind as usize];
        cell.set(cell.get().saturating_sub(1));
    });
}

/// A failed runtime call, reported through the status slot.
#[derive(Debug)]
pub(crate) struct Failure {
    code: StatusCode,
    message: String,
}

impl Failure {
    pub(crate) fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::new(TC_STATUS_INVALID_ARGUMENT, message)
    }
}

pub(crate) type HostResult<T> = Result<T, Failure>;

/// Runs `f` and writes its outcome into `err`.
///
/// Returns `fallback` when `f` fails or panics, and when `err` is null (the
/// caller then has no way to observe the status, so nothing is done).
pub(crate) fn guarded<T>(
    err: *mut tc_error,
    fallback: T,
    f: impl FnOnce() -> HostResult<T>,
) -> T {
    if err.is_null() {
        return fallback;
    }

    let outcome = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(Failure::new(
            TC_STATUS_INTERNAL,
            "internal error: runtime call panicked",
        ))
    });

    match outcome {
        Ok(value) => {
            unsafe {
                *err = tc_error::new();
            }
            value
        }
        Err(failure) => {
            unsafe {
                *err = tc_error {
                    code: failure.code,
                    msg: new_string(failure.message),
                };
            }
            fallback
        }
    }
}

/// Reads a NUL-terminated UTF-8 argument.
pub(crate) unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> HostResult<&'a str> {
    if ptr.is_null() {
        return Err(Failure::invalid(format!("{what} must not be null")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| Failure::invalid(format!("{what} is not valid UTF-8")))
}

/// Implements boxing, borrowing and destruction for an opaque handle type.
macro_rules! opaque_handle {
    ($handle:ty, $inner:ty, $kind:expr) => {
        impl $handle {
            pub(crate) fn into_raw(inner: $inner) -> *mut Self {
                $crate::host::retain($kind);
                let boxed = Box::new(inner);
                Box::into_raw(Box::new(Self {
                    _private: Box::into_raw(boxed) as *mut std::ffi::c_void,
                }))
            }

            pub(crate) unsafe fn get<'a>(ptr: *mut Self) -> $crate::host::HostResult<&'a $inner> {
                if ptr.is_null() {
                    return Err($crate::host::Failure::invalid(concat!(
                        stringify!($handle),
                        " must not be null"
                    )));
                }
                unsafe { Ok(&*((*ptr)._private as *const $inner)) }
            }

            pub(crate) unsafe fn destroy(ptr: *mut Self) -> $crate::host::HostResult<()> {
                if ptr.is_null() {
                    return Err($crate::host::Failure::invalid(concat!(
                        stringify!($handle),
                        " must not be null"
                    )));
                }
                unsafe {
                    let outer = Box::from_raw(ptr);
                    drop(Box::from_raw(outer._private as *mut $inner));
                }
                $crate::host::release($kind);
                Ok(())
            }
        }
    };
}

pub(crate) use opaque_handle;

opaque_handle!(tc_string, CString, ResourceKind::String);

/// Allocates an owned runtime string. Interior NUL bytes are dropped.
pub(crate) fn new_string(text: impl Into<String>) -> *mut tc_string {
    let mut bytes = text.into().into_bytes();
    bytes.retain(|&b| b != 0);
    tc_string::into_raw(CString::new(bytes).unwrap_or_default())
}

/// Borrow the contents of an owned string. Valid until the string is freed.
#[unsafe(no_mangle)]
pub extern "C" fn tc_string_ptr(ptr: *mut tc_string) -> *const c_char {
    match unsafe { tc_string::get(ptr) } {
        Ok(text) => text.as_ptr(),
        Err(_) => ptr::null(),
    }
}

/// Release an owned string. Null is ignored.
#[unsafe(no_mangle)]
pub extern "C" fn tc_string_free(ptr: *mut tc_string) {
    if !ptr.is_null() {
        let _ = unsafe { tc_string::destroy(ptr) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: &tc_error) -> String {
        let text = unsafe { CStr::from_ptr(tc_string_ptr(err.msg)) }
            .to_string_lossy()
            .into_owned();
        tc_string_free(err.msg);
        text
    }

    #[test]
    fn test_guarded_success_clears_status() {
        let mut err = tc_error {
            code: -42,
            msg: ptr::null_mut(),
        };
        let value = guarded(&mut err, 0, || Ok(7));
        assert_eq!(value, 7);
        assert_eq!(err.code, 0);
        assert!(err.msg.is_null());
    }

    #[test]
    fn test_guarded_failure_writes_message() {
        let mut err = tc_error::new();
        let value = guarded(&mut err, -1, || Err(Failure::invalid("bad input")));
        assert_eq!(value, -1);
        assert_eq!(err.code, TC_STATUS_INVALID_ARGUMENT);
        assert_eq!(message(&err), "bad input");
    }

    #[test]
    fn test_guarded_panic_is_internal() {
        let mut err = tc_error::new();
        let value: i32 = guarded(&mut err, 0, || panic!("boom"));
        assert_eq!(value, 0);
        assert_eq!(err.code, TC_STATUS_INTERNAL);
        assert!(message(&err).contains("panicked"));
    }

    #[test]
    fn test_guarded_null_status() {
        let value = guarded(ptr::null_mut(), 5, || Ok(9));
        assert_eq!(value, 5);
    }

    #[test]
    fn test_string_lifecycle() {
        let before = live_handles(ResourceKind::String);
        let s = new_string("hello\0world");
        assert_eq!(live_handles(ResourceKind::String), before + 1);
        let text = unsafe { CStr::from_ptr(tc_string_ptr(s)) };
        assert_eq!(text.to_str().unwrap(), "helloworld");
        tc_string_free(s);
        assert_eq!(live_handles(ResourceKind::String), before);
    }

    #[test]
    fn test_string_ptr_null() {
        assert!(tc_string_ptr(ptr::null_mut()).is_null());
        tc_string_free(ptr::null_mut());
    }
}
