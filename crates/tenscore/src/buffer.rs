//! Device buffers.
//!
//! A [`Buffer`] owns a region of device memory sized by a [`TensorShape`].
//! Its contents are reached through a [`View`], a temporary mapping created
//! by [`Buffer::mmap_current`] or [`Buffer::mmap_discard`].
//!
//! Cloning a buffer shares the device memory; it never copies it. All clones
//! see the same contents and the memory is released with the last clone (or
//! the last view, whichever goes later).
//!
//! At most one view of a buffer may be alive at a time, across all clones.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ffi;
use crate::handle::{BufferKind, Handle};
use crate::settings::Settings;
use crate::shape::TensorShape;
use crate::view::{MapMode, View};
use std::cell::Cell;
use std::ffi::CString;
use std::fmt;
use std::rc::Rc;
use tenscore_sys as sys;

/// Setting naming the device used by [`Buffer::on_default_device`].
pub const DEVICE_SETTING: &str = "TENSCORE_DEVICE";

/// State shared by a buffer, its clones and its live view.
pub(crate) struct BufferInner {
    pub(crate) handle: Handle<BufferKind>,
    pub(crate) shape: TensorShape,
    pub(crate) mapped: Cell<bool>,
}

/// Device-resident memory laid out by a [`TensorShape`].
///
/// The default buffer has no backing storage and cannot be mapped.
#[derive(Clone, Default)]
pub struct Buffer {
    inner: Option<Rc<BufferInner>>,
}

impl Buffer {
    /// Allocate `shape.nbytes()` bytes on `device`.
    ///
    /// # Errors
    ///
    /// Returns a runtime failure if the device is unknown or the allocation
    /// fails, and `InvalidArgument` if `device` contains a NUL byte.
    pub fn new(device: &str, shape: &TensorShape) -> Result<Self> {
        let nbytes = host_len(shape.nbytes()?)?;
        let name = CString::new(device)
            .map_err(|_| Error::invalid_argument("device name must not contain NUL bytes"))?;

        let api = ffi::runtime()?;
        let ptr = api.call(|err| unsafe { (api.buffer_alloc)(err, name.as_ptr(), nbytes) })?;
        tracing::debug!(device, nbytes, "allocated buffer");
        Ok(Self::wrap(unsafe { Handle::from_raw(api, ptr) }, shape.clone()))
    }

    /// Allocate on the device named by the `TENSCORE_DEVICE` setting.
    pub fn on_default_device(shape: &TensorShape) -> Result<Self> {
        let device = Settings::get(DEVICE_SETTING)?;
        Self::new(&device, shape)
    }

    /// Take ownership of a buffer produced by the runtime.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live `tc_buffer` from the installed runtime that no one
    /// else will free.
    ///
    /// # Errors
    ///
    /// Returns a runtime failure if the buffer is smaller than
    /// `shape.nbytes()`. Once a runtime is installed, ownership of `ptr` is
    /// taken even on failure.
    pub unsafe fn from_raw(ptr: *mut sys::tc_buffer, shape: TensorShape) -> Result<Self> {
        let api = ffi::runtime()?;
        let handle = unsafe { Handle::<BufferKind>::from_raw(api, ptr) };
        let capacity = api.call(|err| unsafe { (api.buffer_size)(err, handle.as_ptr()) })?;
        let nbytes = host_len(shape.nbytes()?)?;
        if capacity < nbytes {
            return Err(Error::runtime(format!(
                "buffer holds {capacity} bytes, shape needs {nbytes}"
            )));
        }
        Ok(Self::wrap(handle, shape))
    }

    fn wrap(handle: Handle<BufferKind>, shape: TensorShape) -> Self {
        Self {
            inner: Some(Rc::new(BufferInner {
                handle,
                shape,
                mapped: Cell::new(false),
            })),
        }
    }

    fn backing(&self) -> Result<&Rc<BufferInner>> {
        self.inner
            .as_ref()
            .ok_or_else(|| Error::runtime("buffer has no backing storage"))
    }

    /// True if the buffer owns device memory.
    pub fn is_allocated(&self) -> bool {
        self.inner.is_some()
    }

    /// The layout this buffer was created with.
    pub fn shape(&self) -> Option<&TensorShape> {
        self.inner.as_ref().map(|inner| &inner.shape)
    }

    /// Size in bytes; zero without backing storage.
    pub fn nbytes(&self) -> Result<u64> {
        match &self.inner {
            Some(inner) => inner.shape.nbytes(),
            None => Ok(0),
        }
    }

    /// The raw buffer, or null without backing storage.
    pub fn as_ptr(&self) -> *mut sys::tc_buffer {
        self.inner
            .as_ref()
            .map_or(std::ptr::null_mut(), |inner| inner.handle.as_ptr())
    }

    /// Map the buffer with its current contents.
    pub fn mmap_current(&self) -> Result<View> {
        self.map(MapMode::Current)
    }

    /// Map the buffer for overwriting. The initial contents of the view are
    /// unspecified, and writes only reach the buffer after
    /// [`View::writeback`].
    pub fn mmap_discard(&self) -> Result<View> {
        self.map(MapMode::Discard)
    }

    fn map(&self, mode: MapMode) -> Result<View> {
        let inner = self.backing()?;
        if inner.mapped.get() {
            return Err(Error::AlreadyMapped);
        }

        let api = inner.handle.api();
        let buffer = inner.handle.as_ptr();
        let ptr = match mode {
            MapMode::Current => {
                api.call(|err| unsafe { (api.buffer_mmap_current)(err, buffer) })?
            }
            MapMode::Discard => {
                api.call(|err| unsafe { (api.buffer_mmap_discard)(err, buffer) })?
            }
        };
        tracing::trace!(?mode, "mapped buffer");
        Ok(View::new(
            unsafe { Handle::from_raw(api, ptr) },
            Rc::clone(inner),
            mode,
        ))
    }

    /// Copy the whole buffer into `dst`.
    ///
    /// Exactly `nbytes()` bytes are written to the front of `dst`.
    pub fn copy_into(&self, dst: &mut [u8]) -> Result<()> {
        let len = self.transfer_len(dst.len(), "destination")?;
        let view = self.mmap_current()?;
        let src = mapped_prefix(view.data()?, len)?;
        dst[..len].copy_from_slice(src);
        Ok(())
    }

    /// Overwrite the whole buffer from `src` and commit it.
    ///
    /// Exactly `nbytes()` bytes are read from the front of `src`.
    pub fn copy_from(&self, src: &[u8]) -> Result<()> {
        let len = self.transfer_len(src.len(), "source")?;
        let mut view = self.mmap_discard()?;
        let dst = view.data_mut()?;
        let available = dst.len();
        dst.get_mut(..len)
            .ok_or_else(|| short_mapping(available, len))?
            .copy_from_slice(&src[..len]);
        view.writeback()
    }

    /// Bytes moved by a copy, checked against the caller's slice length.
    fn transfer_len(&self, slice_len: usize, what: &str) -> Result<usize> {
        let len = host_len(self.backing()?.shape.nbytes()?)?;
        if slice_len < len {
            return Err(Error::invalid_argument(format!(
                "{what} holds {slice_len} bytes, buffer needs {len}"
            )));
        }
        Ok(len)
    }

    /// Read the buffer as elements of `T`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `T` does not match the shape's dtype.
    pub fn read<T: Element>(&self) -> Result<Vec<T>> {
        let count = self.element_count::<T>()?;
        let mut values = vec![T::zeroed(); count];
        self.copy_into(bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    /// Overwrite the buffer with `values` and commit it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `T` does not match the shape's dtype or
    /// `values` does not cover the buffer exactly.
    pub fn write<T: Element>(&self, values: &[T]) -> Result<()> {
        let count = self.element_count::<T>()?;
        if values.len() != count {
            return Err(Error::invalid_argument(format!(
                "expected {count} elements, got {}",
                values.len()
            )));
        }
        self.copy_from(bytemuck::cast_slice(values))
    }

    fn element_count<T: Element>(&self) -> Result<usize> {
        let shape = &self.backing()?.shape;
        let dtype = shape.dtype()?;
        if dtype != T::DTYPE {
            return Err(Error::invalid_argument(format!(
                "buffer holds {dtype} elements, not {}",
                T::DTYPE
            )));
        }
        let nbytes = shape.nbytes()?;
        Ok((nbytes / T::DTYPE.byte_size()) as usize)
    }
}

fn host_len(nbytes: u64) -> Result<usize> {
    usize::try_from(nbytes)
        .map_err(|_| Error::invalid_argument("shape footprint does not fit in host address space"))
}

fn mapped_prefix(data: &[u8], len: usize) -> Result<&[u8]> {
    data.get(..len).ok_or_else(|| short_mapping(data.len(), len))
}

fn short_mapping(available: usize, len: usize) -> Error {
    Error::runtime(format!("mapping spans {available} bytes, shape needs {len}"))
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Buffer")
                .field("shape", &inner.shape)
                .field("mapped", &inner.mapped.get())
                .finish(),
            None => f.write_str("Buffer(<unallocated>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;
    use sys::host::{ResourceKind, live_handles};

    fn shape(sizes: &[i64]) -> TensorShape {
        crate::init().unwrap();
        TensorShape::new(DType::UInt8, sizes).unwrap()
    }

    #[test]
    fn test_default_buffer_has_no_backing() {
        let buffer = Buffer::default();
        assert!(!buffer.is_allocated());
        assert!(buffer.shape().is_none());
        assert_eq!(buffer.nbytes().unwrap(), 0);
        assert!(buffer.as_ptr().is_null());
        assert!(buffer.mmap_current().unwrap_err().is_runtime());
        assert!(buffer.mmap_discard().unwrap_err().is_runtime());
    }

    #[test]
    fn test_second_view_rejected_while_first_alive() {
        let buffer = Buffer::new("host.0", &shape(&[4])).unwrap();
        let view = buffer.mmap_current().unwrap();
        assert!(matches!(buffer.mmap_discard(), Err(Error::AlreadyMapped)));
        let clone = buffer.clone();
        assert!(matches!(clone.mmap_current(), Err(Error::AlreadyMapped)));
        drop(view);
        assert!(buffer.mmap_current().is_ok());
    }

    #[test]
    fn test_short_destination_rejected() {
        let buffer = Buffer::new("host.0", &shape(&[8])).unwrap();
        let mut dst = [0u8; 4];
        assert!(buffer.copy_into(&mut dst).unwrap_err().is_invalid_argument());
        assert!(buffer.copy_from(&[1, 2, 3]).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_from_raw_rejects_undersized_buffer() {
        let shape = shape(&[8]);
        let api = ffi::runtime().unwrap();
        let before = live_handles(ResourceKind::Buffer);
        let ptr = api
            .call(|err| unsafe { (api.buffer_alloc)(err, c"host.0".as_ptr(), 4) })
            .unwrap();
        let err = unsafe { Buffer::from_raw(ptr, shape) }.unwrap_err();
        assert!(err.is_runtime());
        assert!(err.to_string().contains("needs 8"));
        assert_eq!(live_handles(ResourceKind::Buffer), before);
    }

    #[test]
    fn test_nul_in_device_name() {
        let err = Buffer::new("host\0.0", &shape(&[1])).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_debug_output() {
        let buffer = Buffer::new("host.0", &shape(&[2])).unwrap();
        assert!(format!("{buffer:?}").contains("uint8(2:1)"));
        assert_eq!(format!("{:?}", Buffer::default()), "Buffer(<unallocated>)");
    }
}
