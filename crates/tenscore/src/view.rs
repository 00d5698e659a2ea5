//! Mapped windows onto buffer memory.

use crate::buffer::BufferInner;
use crate::error::{Error, Result};
use crate::handle::{Handle, ViewKind};
use std::fmt;
use std::rc::Rc;
use tenscore_sys as sys;

/// How a view was mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// The view starts with the buffer's contents.
    Current,
    /// The view's initial contents are unspecified; it is meant to be fully
    /// overwritten and committed with [`View::writeback`].
    Discard,
}

/// A live mapping of a [`Buffer`](crate::Buffer).
///
/// The mapping ends when the view is dropped. Writes to a discard-mode view
/// are only guaranteed to reach the buffer once [`View::writeback`] has been
/// called. A view keeps its buffer's memory alive.
pub struct View {
    // Declared first: the mapping is released before the buffer reference.
    handle: Handle<ViewKind>,
    buffer: Rc<BufferInner>,
    mode: MapMode,
    dirty: bool,
}

impl View {
    pub(crate) fn new(handle: Handle<ViewKind>, buffer: Rc<BufferInner>, mode: MapMode) -> Self {
        buffer.mapped.set(true);
        Self {
            handle,
            buffer,
            mode,
            dirty: false,
        }
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// Length of the mapped span in bytes.
    pub fn size(&self) -> Result<usize> {
        let api = self.handle.api();
        api.call(|err| unsafe { (api.view_size)(err, self.as_ptr()) })
    }

    fn span(&self) -> Result<(*mut u8, usize)> {
        let api = self.handle.api();
        let data = api.call(|err| unsafe { (api.view_data)(err, self.as_ptr()) })?;
        let len = self.size()?;
        if data.is_null() && len > 0 {
            return Err(Error::runtime("runtime returned a null mapping"));
        }
        Ok((data as *mut u8, len))
    }

    /// The mapped bytes.
    pub fn data(&self) -> Result<&[u8]> {
        let (data, len) = self.span()?;
        if len == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(data, len) })
    }

    /// The mapped bytes, writable.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let (data, len) = self.span()?;
        self.dirty = true;
        if len == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }

    /// Commit the mapped span to the buffer.
    ///
    /// Always safe to call. Required for discard-mode writes to take effect;
    /// not needed for read-only use.
    pub fn writeback(&mut self) -> Result<()> {
        let api = self.handle.api();
        api.call(|err| unsafe { (api.view_writeback)(err, self.as_ptr()) })?;
        self.dirty = false;
        Ok(())
    }

    /// True if `data_mut` was called since the last writeback.
    pub fn has_pending_writes(&self) -> bool {
        self.dirty
    }

    /// The raw view. Remains owned by this view.
    #[inline]
    pub fn as_ptr(&self) -> *mut sys::tc_view {
        self.handle.as_ptr()
    }
}

impl Drop for View {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(mode = ?self.mode, "view dropped without writeback; writes may be lost");
        }
        self.buffer.mapped.set(false);
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("mode", &self.mode)
            .field("shape", &self.buffer.shape)
            .field("pending_writes", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Buffer, DType, TensorShape};

    use super::*;

    fn buffer(device: &str, len: i64) -> Buffer {
        crate::init().unwrap();
        let shape = TensorShape::new(DType::UInt8, &[len]).unwrap();
        Buffer::new(device, &shape).unwrap()
    }

    #[test]
    fn test_view_size_matches_buffer() {
        let buffer = buffer("host.0", 24);
        let view = buffer.mmap_current().unwrap();
        assert_eq!(view.size().unwrap(), 24);
        assert_eq!(view.data().unwrap().len(), 24);
        assert_eq!(view.mode(), MapMode::Current);
    }

    #[test]
    fn test_pending_writes_tracking() {
        let buffer = buffer("staged.0", 4);
        let mut view = buffer.mmap_discard().unwrap();
        assert!(!view.has_pending_writes());
        view.data_mut().unwrap().fill(3);
        assert!(view.has_pending_writes());
        view.writeback().unwrap();
        assert!(!view.has_pending_writes());
    }

    #[test]
    fn test_unsaved_writes_warn_in_either_mode() {
        let maps: [fn(&Buffer) -> Result<View>; 2] = [Buffer::mmap_current, Buffer::mmap_discard];
        for map in maps {
            let buffer = buffer("staged.0", 2);
            let mut view = map(&buffer).unwrap();
            view.data_mut().unwrap().fill(1);
            let logs = crate::telemetry::capture_logs(|| drop(view));
            assert!(logs.contains("WARN"), "{logs}");
            assert!(logs.contains("writes may be lost"));
        }
    }

    #[test]
    fn test_committed_or_read_only_views_do_not_warn() {
        let buffer = buffer("staged.0", 2);
        let mut view = buffer.mmap_current().unwrap();
        view.data_mut().unwrap().fill(1);
        view.writeback().unwrap();
        assert!(!crate::telemetry::capture_logs(|| drop(view)).contains("WARN"));

        let view = buffer.mmap_discard().unwrap();
        assert!(!crate::telemetry::capture_logs(|| drop(view)).contains("WARN"));
    }

    #[test]
    fn test_repeated_data_reads_agree() {
        let buffer = buffer("host.0", 3);
        buffer.copy_from(&[4, 5, 6]).unwrap();
        let view = buffer.mmap_current().unwrap();
        let first = view.data().unwrap();
        let second = view.data().unwrap();
        assert_eq!(first.as_ptr(), second.as_ptr());
        assert_eq!(first, &[4, 5, 6]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_writeback_on_current_view_is_safe() {
        let buffer = buffer("host.0", 2);
        let mut view = buffer.mmap_current().unwrap();
        view.writeback().unwrap();
        view.writeback().unwrap();
    }

    #[test]
    fn test_view_keeps_buffer_alive() {
        let buffer = buffer("host.0", 3);
        let mut view = buffer.mmap_discard().unwrap();
        drop(buffer);
        view.data_mut().unwrap().copy_from_slice(&[1, 2, 3]);
        view.writeback().unwrap();
        assert_eq!(view.data().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_zero_length_view() {
        let buffer = buffer("host.0", 0);
        let mut view = buffer.mmap_discard().unwrap();
        assert!(view.data().unwrap().is_empty());
        assert!(view.data_mut().unwrap().is_empty());
    }
}
