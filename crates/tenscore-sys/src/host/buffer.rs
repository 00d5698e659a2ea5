//! Device buffers and their host mappings.

use super::{Failure, HostResult, ResourceKind, guarded, opaque_handle, read_str};
use crate::*;
use libc::{c_char, size_t};
use std::ptr;
use std::rc::Rc;

/// Names of the devices this runtime accepts.
pub const DEVICE_NAMES: &[&str] = &["host.0", "staged.0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coherence {
    /// Views alias device memory directly.
    Coherent,
    /// Views are staging copies committed by writeback.
    Staged,
}

fn lookup_device(name: &str) -> Option<Coherence> {
    match name {
        "host.0" => Some(Coherence::Coherent),
        "staged.0" => Some(Coherence::Staged),
        _ => None,
    }
}

/// Zeroed heap bytes reached only through raw pointers. Spans handed out by
/// `tc_view_data` must never overlap a live Rust reference.
struct RawBytes(*mut [u8]);

impl RawBytes {
    fn zeroed(nbytes: usize) -> HostResult<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(nbytes).map_err(|_| {
            Failure::new(
                TC_STATUS_OUT_OF_MEMORY,
                format!("failed to allocate {nbytes} bytes"),
            )
        })?;
        bytes.resize(nbytes, 0);
        Ok(Self(Box::into_raw(bytes.into_boxed_slice())))
    }

    fn base(&self) -> *mut u8 {
        self.0.cast::<u8>()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    /// Copy all of `self` over the front of `dst`.
    fn copy_to(&self, dst: &RawBytes) {
        debug_assert!(dst.len() >= self.len());
        unsafe { ptr::copy_nonoverlapping(self.base(), dst.base(), self.len()) }
    }
}

impl Drop for RawBytes {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.0) });
    }
}

/// Device memory. Shared between a buffer and its live views so a view never
/// dangles even if the buffer is freed first.
struct DeviceMemory {
    coherence: Coherence,
    bytes: RawBytes,
}

pub(crate) struct BufferDesc {
    memory: Rc<DeviceMemory>,
}

pub(crate) struct ViewDesc {
    memory: Rc<DeviceMemory>,
    staging: Option<RawBytes>,
}

opaque_handle!(tc_buffer, BufferDesc, ResourceKind::Buffer);
opaque_handle!(tc_view, ViewDesc, ResourceKind::View);

impl ViewDesc {
    fn map(memory: &Rc<DeviceMemory>, keep_contents: bool) -> HostResult<Self> {
        let staging = match memory.coherence {
            Coherence::Coherent => None,
            Coherence::Staged => {
                let bytes = RawBytes::zeroed(memory.bytes.len())?;
                if keep_contents {
                    memory.bytes.copy_to(&bytes);
                }
                Some(bytes)
            }
        };
        Ok(Self {
            memory: Rc::clone(memory),
            staging,
        })
    }

    fn data(&self) -> *mut u8 {
        self.staging.as_ref().unwrap_or(&self.memory.bytes).base()
    }

    fn writeback(&self) {
        if let Some(bytes) = &self.staging {
            bytes.copy_to(&self.memory.bytes);
        }
    }
}

/// Allocate `nbytes` of zeroed memory on `device`.
#[unsafe(no_mangle)]
pub extern "C" fn tc_buffer_alloc(
    err: *mut tc_error,
    device: *const c_char,
    nbytes: size_t,
) -> *mut tc_buffer {
    guarded(err, ptr::null_mut(), || {
        let name = unsafe { read_str(device, "device")? };
        let coherence = lookup_device(name).ok_or_else(|| {
            Failure::new(
                TC_STATUS_UNKNOWN_DEVICE,
                format!(
                    "unknown device '{name}' (available: {})",
                    DEVICE_NAMES.join(", ")
                ),
            )
        })?;
        let memory = DeviceMemory {
            coherence,
            bytes: RawBytes::zeroed(nbytes)?,
        };
        Ok(tc_buffer::into_raw(BufferDesc {
            memory: Rc::new(memory),
        }))
    })
}

/// Release a buffer. Views created from it remain valid until freed.
#[unsafe(no_mangle)]
pub extern "C" fn tc_buffer_free(err: *mut tc_error, buffer: *mut tc_buffer) {
    guarded(err, (), || unsafe { tc_buffer::destroy(buffer) })
}

/// Get the capacity of a buffer in bytes.
#[unsafe(no_mangle)]
pub extern "C" fn tc_buffer_size(err: *mut tc_error, buffer: *mut tc_buffer) -> size_t {
    guarded(err, 0, || Ok(unsafe { tc_buffer::get(buffer)? }.memory.bytes.len()))
}

/// Map a buffer with its current contents.
#[unsafe(no_mangle)]
pub extern "C" fn tc_buffer_mmap_current(err: *mut tc_error, buffer: *mut tc_buffer) -> *mut tc_view {
    guarded(err, ptr::null_mut(), || {
        let desc = unsafe { tc_buffer::get(buffer)? };
        Ok(tc_view::into_raw(ViewDesc::map(&desc.memory, true)?))
    })
}

/// Map a buffer for overwriting. Initial contents of the view are unspecified.
#[unsafe(no_mangle)]
pub extern "C" fn tc_buffer_mmap_discard(err: *mut tc_error, buffer: *mut tc_buffer) -> *mut tc_view {
    guarded(err, ptr::null_mut(), || {
        let desc = unsafe { tc_buffer::get(buffer)? };
        Ok(tc_view::into_raw(ViewDesc::map(&desc.memory, false)?))
    })
}

/// Release a view, ending the mapping. Unsaved staging writes are lost.
#[unsafe(no_mangle)]
pub extern "C" fn tc_view_free(err: *mut tc_error, view: *mut tc_view) {
    guarded(err, (), || unsafe { tc_view::destroy(view) })
}

/// Get the base address of the mapped span.
///
/// # Safety
/// The returned pointer is only valid while the view exists.
#[unsafe(no_mangle)]
pub extern "C" fn tc_view_data(err: *mut tc_error, view: *mut tc_view) -> *mut c_char {
    guarded(err, ptr::null_mut(), || {
        Ok(unsafe { tc_view::get(view)? }.data() as *mut c_char)
    })
}

/// Get the length of the mapped span in bytes.
#[unsafe(no_mangle)]
pub extern "C" fn tc_view_size(err: *mut tc_error, view: *mut tc_view) -> size_t {
    guarded(err, 0, || Ok(unsafe { tc_view::get(view)? }.memory.bytes.len()))
}

/// Commit the mapped span to the device buffer.
#[unsafe(no_mangle)]
pub extern "C" fn tc_view_writeback(err: *mut tc_error, view: *mut tc_view) {
    guarded(err, (), || {
        unsafe { tc_view::get(view)? }.writeback();
        Ok(())
    })
}
