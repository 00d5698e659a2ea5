//! Owned native handles.
//!
//! A [`Handle`] owns exactly one runtime pointer and releases it when dropped,
//! through the release function its [`HandleKind`] names. Sharing is done by
//! wrapping a handle in `Rc`; the pointer is then released when the last
//! reference goes away.
//!
//! Release failures cannot be returned from `Drop`. They are reported as
//! `tracing` errors and the pointer is considered gone either way.

use crate::ffi::RuntimeApi;
use std::fmt;
use std::ptr::NonNull;
use tenscore_sys as sys;

/// A category of runtime resource and the function that releases it.
pub trait HandleKind {
    /// Opaque runtime type the handle points to.
    type Raw;

    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Release function for this kind in `api`.
    fn release_fn(api: &RuntimeApi) -> unsafe extern "C" fn(*mut sys::tc_error, *mut Self::Raw);
}

/// Shape descriptor handles.
#[derive(Debug)]
pub enum ShapeKind {}

/// Device buffer handles.
#[derive(Debug)]
pub enum BufferKind {}

/// Mapped view handles.
#[derive(Debug)]
pub enum ViewKind {}

impl HandleKind for ShapeKind {
    type Raw = sys::tc_shape;
    const NAME: &'static str = "shape";

    fn release_fn(api: &RuntimeApi) -> unsafe extern "C" fn(*mut sys::tc_error, *mut Self::Raw) {
        api.shape_free
    }
}

impl HandleKind for BufferKind {
    type Raw = sys::tc_buffer;
    const NAME: &'static str = "buffer";

    fn release_fn(api: &RuntimeApi) -> unsafe extern "C" fn(*mut sys::tc_error, *mut Self::Raw) {
        api.buffer_free
    }
}

impl HandleKind for ViewKind {
    type Raw = sys::tc_view;
    const NAME: &'static str = "view";

    fn release_fn(api: &RuntimeApi) -> unsafe extern "C" fn(*mut sys::tc_error, *mut Self::Raw) {
        api.view_free
    }
}

/// Exclusive owner of one runtime pointer of kind `K`.
pub struct Handle<K: HandleKind> {
    ptr: NonNull<K::Raw>,
    api: &'static RuntimeApi,
}

impl<K: HandleKind> Handle<K> {
    /// Take ownership of `ptr`.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null. Runtime calls never return null on success,
    /// so a null here is a bug in the caller.
    ///
    /// # Safety
    ///
    /// `ptr` must have been produced by `api` for resource kind `K` and must
    /// not be owned by anything else.
    pub unsafe fn from_raw(api: &'static RuntimeApi, ptr: *mut K::Raw) -> Self {
        let Some(ptr) = NonNull::new(ptr) else {
            panic!("attempted to wrap a null {} handle", K::NAME);
        };
        Self { ptr, api }
    }

    /// The raw pointer. Remains owned by this handle.
    #[inline]
    pub fn as_ptr(&self) -> *mut K::Raw {
        self.ptr.as_ptr()
    }

    /// The runtime this handle belongs to.
    #[inline]
    pub fn api(&self) -> &'static RuntimeApi {
        self.api
    }
}

impl<K: HandleKind> Drop for Handle<K> {
    fn drop(&mut self) {
        let release = K::release_fn(self.api);
        let ptr = self.ptr.as_ptr();
        match self.api.call(|err| unsafe { release(err, ptr) }) {
            Ok(()) => tracing::trace!(kind = K::NAME, "released handle"),
            Err(err) => tracing::error!(kind = K::NAME, error = %err, "failed to release handle"),
        }
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle")
            .field(&K::NAME)
            .field(&self.ptr)
            .finish()
    }
}
