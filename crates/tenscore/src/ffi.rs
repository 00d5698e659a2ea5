//! Boundary function table and the error-translation adapter.
//!
//! All traffic to the runtime goes through a [`RuntimeApi`]: a table of C
//! function pointers resolved either from the in-tree host runtime or from a
//! shared library. [`RuntimeApi::call`] is the only place that understands
//! the status-slot convention; everything else hands it a closure that
//! performs the raw call.

use crate::error::{Error, Result};
use libloading::Library;
use std::ffi::{CStr, OsStr};
use std::fmt;
use std::sync::OnceLock;
use tenscore_sys::{self as sys, host, symbols};

/// Function table for one runtime implementation.
pub struct RuntimeApi {
    pub init: sys::tc_init_fn,
    pub string_ptr: sys::tc_string_ptr_fn,
    pub string_free: sys::tc_string_free_fn,
    pub shape_alloc: sys::tc_shape_alloc_fn,
    pub shape_free: sys::tc_shape_free_fn,
    pub shape_get_dtype: sys::tc_shape_get_dtype_fn,
    pub shape_get_ndims: sys::tc_shape_get_ndims_fn,
    pub shape_get_nbytes: sys::tc_shape_get_nbytes_fn,
    pub shape_get_sizes: sys::tc_shape_get_sizes_fn,
    pub shape_get_strides: sys::tc_shape_get_strides_fn,
    pub shape_repr: sys::tc_shape_repr_fn,
    pub buffer_alloc: sys::tc_buffer_alloc_fn,
    pub buffer_free: sys::tc_buffer_free_fn,
    pub buffer_size: sys::tc_buffer_size_fn,
    pub buffer_mmap_current: sys::tc_buffer_mmap_fn,
    pub buffer_mmap_discard: sys::tc_buffer_mmap_fn,
    pub view_free: sys::tc_view_free_fn,
    pub view_data: sys::tc_view_data_fn,
    pub view_size: sys::tc_view_size_fn,
    pub view_writeback: sys::tc_view_writeback_fn,
    pub settings_get: sys::tc_settings_get_fn,
    pub settings_set: sys::tc_settings_set_fn,
    library: Option<Library>,
}

/// Resolve one symbol and copy the function pointer out of it.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    let sym = unsafe { library.get::<T>(name)? };
    Ok(*sym)
}

impl RuntimeApi {
    /// Table for the reference host runtime linked into this crate.
    pub fn host() -> Self {
        Self {
            init: host::tc_init,
            string_ptr: host::tc_string_ptr,
            string_free: host::tc_string_free,
            shape_alloc: host::tc_shape_alloc,
            shape_free: host::tc_shape_free,
            shape_get_dtype: host::tc_shape_get_dtype,
            shape_get_ndims: host::tc_shape_get_ndims,
            shape_get_nbytes: host::tc_shape_get_nbytes,
            shape_get_sizes: host::tc_shape_get_sizes,
            shape_get_strides: host::tc_shape_get_strides,
            shape_repr: host::tc_shape_repr,
            buffer_alloc: host::tc_buffer_alloc,
            buffer_free: host::tc_buffer_free,
            buffer_size: host::tc_buffer_size,
            buffer_mmap_current: host::tc_buffer_mmap_current,
            buffer_mmap_discard: host::tc_buffer_mmap_discard,
            view_free: host::tc_view_free,
            view_data: host::tc_view_data,
            view_size: host::tc_view_size,
            view_writeback: host::tc_view_writeback,
            settings_get: host::tc_settings_get,
            settings_set: host::tc_settings_set,
            library: None,
        }
    }

    /// Load a runtime from a shared library exporting the `tc_*` symbols.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initialisers, and every resolved symbol is
    /// trusted to have the signature declared in `tenscore-sys`.
    pub unsafe fn load(path: impl AsRef<OsStr>) -> Result<Self> {
        let library = unsafe { Library::new(path.as_ref())? };
        let api = unsafe {
            Self {
                init: symbol(&library, symbols::INIT)?,
                string_ptr: symbol(&library, symbols::STRING_PTR)?,
                string_free: symbol(&library, symbols::STRING_FREE)?,
                shape_alloc: symbol(&library, symbols::SHAPE_ALLOC)?,
                shape_free: symbol(&library, symbols::SHAPE_FREE)?,
                shape_get_dtype: symbol(&library, symbols::SHAPE_GET_DTYPE)?,
                shape_get_ndims: symbol(&library, symbols::SHAPE_GET_NDIMS)?,
                shape_get_nbytes: symbol(&library, symbols::SHAPE_GET_NBYTES)?,
                shape_get_sizes: symbol(&library, symbols::SHAPE_GET_SIZES)?,
                shape_get_strides: symbol(&library, symbols::SHAPE_GET_STRIDES)?,
                shape_repr: symbol(&library, symbols::SHAPE_REPR)?,
                buffer_alloc: symbol(&library, symbols::BUFFER_ALLOC)?,
                buffer_free: symbol(&library, symbols::BUFFER_FREE)?,
                buffer_size: symbol(&library, symbols::BUFFER_SIZE)?,
                buffer_mmap_current: symbol(&library, symbols::BUFFER_MMAP_CURRENT)?,
                buffer_mmap_discard: symbol(&library, symbols::BUFFER_MMAP_DISCARD)?,
                view_free: symbol(&library, symbols::VIEW_FREE)?,
                view_data: symbol(&library, symbols::VIEW_DATA)?,
                view_size: symbol(&library, symbols::VIEW_SIZE)?,
                view_writeback: symbol(&library, symbols::VIEW_WRITEBACK)?,
                settings_get: symbol(&library, symbols::SETTINGS_GET)?,
                settings_set: symbol(&library, symbols::SETTINGS_SET)?,
                library: None,
            }
        };
        tracing::debug!(path = ?path.as_ref(), "loaded runtime library");
        Ok(Self {
            library: Some(library),
            ..api
        })
    }

    /// Invoke a boundary function, translating its status into a `Result`.
    ///
    /// `f` receives the status slot and must pass it as the first argument
    /// of exactly one runtime call. The runtime's message string is released
    /// here on every path.
    pub fn call<T>(&self, f: impl FnOnce(*mut sys::tc_error) -> T) -> Result<T> {
        let mut status = sys::tc_error::new();
        let ret = f(&raw mut status);

        if status.code == sys::TC_STATUS_OK {
            if !status.msg.is_null() {
                unsafe { (self.string_free)(status.msg) };
            }
            return Ok(ret);
        }

        let mut message = unsafe { self.take_string(status.msg) };
        if message.is_empty() {
            message = format!("runtime call failed with status {}", status.code);
        }
        tracing::trace!(code = status.code, %message, "runtime call failed");
        Err(Error::Runtime {
            code: status.code,
            message,
        })
    }

    /// Copy an owned runtime string into a `String` and release it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a string returned by this runtime that is not
    /// used again afterwards.
    pub(crate) unsafe fn take_string(&self, ptr: *mut sys::tc_string) -> String {
        if ptr.is_null() {
            return String::new();
        }
        let text = unsafe {
            let raw = (self.string_ptr)(ptr);
            if raw.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        };
        unsafe { (self.string_free)(ptr) };
        text
    }

    /// True when this table was resolved from a shared library.
    pub fn is_loaded_library(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for RuntimeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeApi")
            .field("loaded_library", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

static RUNTIME: OnceLock<RuntimeApi> = OnceLock::new();

/// Install `api` as the process-wide runtime and initialise it.
///
/// Only the first successful installation takes effect; later calls return
/// `Ok(())` without touching the installed runtime.
pub(crate) fn install(api: RuntimeApi) -> Result<()> {
    if RUNTIME.get().is_some() {
        tracing::debug!("runtime already initialized");
        return Ok(());
    }
    api.call(|err| unsafe { (api.init)(err) })?;
    if RUNTIME.set(api).is_err() {
        tracing::debug!("runtime initialized concurrently, keeping the first one");
    }
    Ok(())
}

/// The installed runtime.
pub(crate) fn runtime() -> Result<&'static RuntimeApi> {
    RUNTIME
        .get()
        .ok_or_else(|| Error::runtime("runtime is not initialized; call tenscore::init() first"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use tenscore_sys::host::{ResourceKind, live_handles};

    #[test]
    fn test_call_success_returns_value() {
        let api = RuntimeApi::host();
        let key = CString::new("TENSCORE_DEVICE").unwrap();
        let ptr = api
            .call(|err| unsafe { (api.settings_get)(err, key.as_ptr()) })
            .unwrap();
        let value = unsafe { api.take_string(ptr) };
        assert!(!value.is_empty());
    }

    #[test]
    fn test_call_failure_carries_message() {
        let api = RuntimeApi::host();
        let key = CString::new("TENSCORE_TEST_FFI_MISSING").unwrap();
        let err = api
            .call(|err| unsafe { (api.settings_get)(err, key.as_ptr()) })
            .unwrap_err();
        assert_eq!(err.code(), Some(sys::TC_STATUS_NOT_FOUND));
        assert!(err.to_string().contains("TENSCORE_TEST_FFI_MISSING"));
    }

    #[test]
    fn test_call_releases_message_exactly_once() {
        let api = RuntimeApi::host();
        let before = live_handles(ResourceKind::String);
        let device = CString::new("nowhere.0").unwrap();
        let result = api.call(|err| unsafe { (api.buffer_alloc)(err, device.as_ptr(), 8) });
        assert!(result.is_err());
        assert_eq!(live_handles(ResourceKind::String), before);
    }

    #[test]
    fn test_take_string_null() {
        let api = RuntimeApi::host();
        assert_eq!(unsafe { api.take_string(std::ptr::null_mut()) }, "");
    }

    #[test]
    fn test_load_missing_library() {
        let err = unsafe { RuntimeApi::load("/nonexistent/libtenscore_runtime.so") }.unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_host_table_is_not_a_library() {
        assert!(!RuntimeApi::host().is_loaded_library());
        assert!(format!("{:?}", RuntimeApi::host()).contains("RuntimeApi"));
    }
}
