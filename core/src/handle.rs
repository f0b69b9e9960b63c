//! Open file handles and the per-handle buffer.
//!
//! A [`FileHandle`] is a cheap-clone reference to one open stream. Data
//! operations (read, write, seek, tell, eof, length, flush, set_buffer)
//! take only the handle's own lock; the instance's state lock is involved
//! only when a handle is opened, duplicated or closed, which is what keeps
//! the mount table consistent while leaving concurrent I/O on different
//! handles unserialized.
//!
//! The optional buffer sits between the caller and the underlying stream.
//! For reads it is a look-ahead window that `seek` can move within without
//! touching the stream; for writes it batches small payloads until a flush
//! boundary (explicit flush, seek, close or overflow).

use crate::alloc::Allocator;
use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::io::IoStream;
use crate::mount::MountEntry;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

pub struct FileHandle {
    pub(crate) inner: Arc<HandleInner>,
}

impl Clone for FileHandle {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("for_reading", &self.inner.for_reading)
            .field("source", &self.inner.mount.dir_name)
            .finish()
    }
}

pub(crate) struct HandleInner {
    pub(crate) vfs: Weak<crate::vfs::VfsInner>,
    pub(crate) mount: Arc<MountEntry>,
    pub(crate) for_reading: bool,
    allocator: Arc<dyn Allocator>,
    state: Mutex<HandleState>,
}

struct HandleState {
    /// `None` once the handle has been closed.
    io: Option<Box<dyn IoStream>>,
    /// Buffer storage; its length is the buffer size (empty = unbuffered).
    buffer: Vec<u8>,
    buffill: usize,
    bufpos: usize,
}

impl HandleState {
    fn io_mut(&mut self, context: &'static str) -> VfsResult<&mut Box<dyn IoStream>> {
        self.io
            .as_mut()
            .ok_or_else(|| VfsError::new(ErrorKind::InvalidArgument, context))
    }

    /// Write out any buffered payload. A no-op for read handles and empty
    /// buffers. On failure the buffer is left intact so the caller may
    /// retry.
    fn flush(&mut self, for_reading: bool) -> VfsResult<()> {
        if for_reading || self.bufpos == self.buffill {
            return Ok(());
        }
        let HandleState {
            io,
            buffer,
            buffill,
            bufpos,
        } = self;
        let io = io
            .as_mut()
            .ok_or_else(|| VfsError::new(ErrorKind::InvalidArgument, "handle.flush"))?;
        io.write(&buffer[*bufpos..*buffill])?;
        *bufpos = 0;
        *buffill = 0;
        Ok(())
    }

    /// Logical position: the underlying cursor adjusted for whatever the
    /// buffer has consumed (reads) or not yet written (writes).
    fn tell(&mut self, for_reading: bool) -> VfsResult<u64> {
        let (buffill, bufpos) = (self.buffill as u64, self.bufpos as u64);
        let io = self.io_mut("handle.tell")?;
        let pos = io.tell()?;
        Ok(if for_reading {
            pos - buffill + bufpos
        } else {
            pos + buffill
        })
    }
}

impl FileHandle {
    pub(crate) fn new(
        vfs: Weak<crate::vfs::VfsInner>,
        mount: Arc<MountEntry>,
        for_reading: bool,
        allocator: Arc<dyn Allocator>,
        io: Box<dyn IoStream>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                vfs,
                mount,
                for_reading,
                allocator,
                state: Mutex::new(HandleState {
                    io: Some(io),
                    buffer: Vec::new(),
                    buffill: 0,
                    bufpos: 0,
                }),
            }),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn references_mount(&self, mount: &Arc<MountEntry>) -> bool {
        Arc::ptr_eq(&self.inner.mount, mount)
    }

    pub fn for_reading(&self) -> bool {
        self.inner.for_reading
    }

    /// Read up to `out.len()` bytes, through the buffer when one is set.
    /// Returns the byte count, 0 at end of file.
    pub fn read_bytes(&self, out: &mut [u8]) -> VfsResult<usize> {
        if !self.inner.for_reading {
            return Err(VfsError::new(ErrorKind::OpenForWriting, "handle.read"));
        }
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.inner.state.lock();
        if state.buffer.is_empty() {
            return state.io_mut("handle.read")?.read(out);
        }

        let HandleState {
            io,
            buffer,
            buffill,
            bufpos,
        } = &mut *state;
        let io = io
            .as_mut()
            .ok_or_else(|| VfsError::new(ErrorKind::InvalidArgument, "handle.read"))?;

        let mut total = 0;
        while total < out.len() {
            let avail = *buffill - *bufpos;
            if avail > 0 {
                let cpy = (out.len() - total).min(avail);
                out[total..total + cpy].copy_from_slice(&buffer[*bufpos..*bufpos + cpy]);
                *bufpos += cpy;
                total += cpy;
            } else {
                // Buffer drained; refill from the stream.
                *bufpos = 0;
                match io.read(buffer) {
                    Ok(0) => {
                        *buffill = 0;
                        break;
                    }
                    Ok(n) => *buffill = n,
                    Err(err) => {
                        *buffill = 0;
                        if total == 0 {
                            return Err(err);
                        }
                        break;
                    }
                }
            }
        }
        Ok(total)
    }

    /// Write `data`, through the buffer when one is set. A payload that
    /// does not fit flushes the buffer and goes to the stream directly; the
    /// overflow is never re-buffered.
    pub fn write_bytes(&self, data: &[u8]) -> VfsResult<usize> {
        if self.inner.for_reading {
            return Err(VfsError::new(ErrorKind::OpenForReading, "handle.write"));
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.inner.state.lock();
        if state.buffer.is_empty() {
            return state.io_mut("handle.write")?.write(data);
        }

        if state.buffill + data.len() < state.buffer.len() {
            let fill = state.buffill;
            state.buffer[fill..fill + data.len()].copy_from_slice(data);
            state.buffill += data.len();
            return Ok(data.len());
        }

        state.flush(false)?;
        state.io_mut("handle.write")?.write(data)
    }

    /// Count-based read: fill `out` with up to `count` items of `size`
    /// bytes, returning the number of *whole* items read. Bytes of a
    /// trailing partial item are consumed but not reported.
    pub fn read_items(&self, out: &mut [u8], size: usize, count: usize) -> VfsResult<usize> {
        let len = size
            .checked_mul(count)
            .filter(|len| *len <= out.len())
            .ok_or_else(|| VfsError::new(ErrorKind::InvalidArgument, "handle.read_items"))?;
        if len == 0 {
            return Ok(0);
        }
        let got = self.read_bytes(&mut out[..len])?;
        Ok(got / size)
    }

    /// Count-based write; see [`FileHandle::read_items`].
    pub fn write_items(&self, data: &[u8], size: usize, count: usize) -> VfsResult<usize> {
        let len = size
            .checked_mul(count)
            .filter(|len| *len <= data.len())
            .ok_or_else(|| VfsError::new(ErrorKind::InvalidArgument, "handle.write_items"))?;
        if len == 0 {
            return Ok(0);
        }
        let put = self.write_bytes(&data[..len])?;
        Ok(put / size)
    }

    /// Absolute seek. Pending writes are flushed first; a read seek landing
    /// inside the buffered window only moves the window cursor.
    pub fn seek(&self, pos: u64) -> VfsResult<()> {
        let mut state = self.inner.state.lock();
        state.flush(self.inner.for_reading)?;

        if !state.buffer.is_empty() && self.inner.for_reading {
            let current = state.tell(true)?;
            let offset = pos as i64 - current as i64;
            let ahead = (state.buffill - state.bufpos) as i64;
            let behind = state.bufpos as i64;
            if (0..=ahead).contains(&offset) || (-behind..0).contains(&offset) {
                state.bufpos = (state.bufpos as i64 + offset) as usize;
                return Ok(());
            }
        }

        state.buffill = 0;
        state.bufpos = 0;
        state.io_mut("handle.seek")?.seek(pos)
    }

    /// Logical position of the next read or write.
    pub fn tell(&self) -> VfsResult<u64> {
        self.inner.state.lock().tell(self.inner.for_reading)
    }

    /// True when a read handle has consumed the whole file. Write handles
    /// are never at EOF.
    pub fn eof(&self) -> bool {
        if !self.inner.for_reading {
            return false;
        }
        let mut state = self.inner.state.lock();
        if state.bufpos != state.buffill {
            return false;
        }
        let Ok(io) = state.io_mut("handle.eof") else {
            return false;
        };
        match (io.tell(), io.length()) {
            (Ok(pos), Ok(len)) => pos >= len,
            _ => false,
        }
    }

    /// Total length of the underlying stream.
    pub fn length(&self) -> VfsResult<u64> {
        self.inner.state.lock().io_mut("handle.length")?.length()
    }

    /// Resize the handle's buffer; 0 removes it. Pending writes are
    /// flushed, and a read handle's stream is re-seeked to the logical
    /// position so no buffered bytes are lost.
    pub fn set_buffer(&self, size: usize) -> VfsResult<()> {
        let mut state = self.inner.state.lock();
        state.flush(self.inner.for_reading)?;

        if self.inner.for_reading && state.buffill != state.bufpos {
            // Park the stream at the logical position so the buffered
            // look-ahead isn't silently lost.
            let logical = state.tell(true)?;
            state.io_mut("handle.set_buffer")?.seek(logical)?;
        }
        state.buffill = 0;
        state.bufpos = 0;

        let old = state.buffer.len();
        if size == 0 {
            state.buffer = Vec::new();
        } else {
            // Account the new buffer before dropping the old one; refusal
            // leaves the old buffer in place.
            self.inner.allocator.allocate(size, "handle.set_buffer")?;
            state.buffer = vec![0; size];
        }
        self.inner.allocator.release(old);
        Ok(())
    }

    /// Flush buffered writes to the underlying stream.
    pub fn flush(&self) -> VfsResult<()> {
        self.inner.state.lock().flush(self.inner.for_reading)
    }

    /// Flush the underlying stream itself (close-time discipline).
    pub(crate) fn flush_underlying(&self) -> VfsResult<()> {
        self.inner.state.lock().io_mut("handle.flush")?.flush()
    }

    /// Open an independent handle over the same file, registered with the
    /// owning instance. The duplicate starts unbuffered.
    pub fn duplicate(&self) -> VfsResult<FileHandle> {
        let vfs = self
            .inner
            .vfs
            .upgrade()
            .ok_or_else(|| VfsError::new(ErrorKind::NotInitialized, "handle.duplicate"))?;
        let io = self
            .inner
            .state
            .lock()
            .io_mut("handle.duplicate")?
            .duplicate()?;
        let dup = FileHandle::new(
            Arc::downgrade(&vfs),
            self.inner.mount.clone(),
            self.inner.for_reading,
            self.inner.allocator.clone(),
            io,
        );
        vfs.register_handle(dup.clone());
        Ok(dup)
    }

    /// Close via the owning instance: flush (for writes), unlink from the
    /// open list, destroy the stream. Flush failure leaves the handle open
    /// so the caller may retry.
    pub fn close(&self) -> VfsResult<()> {
        match self.inner.vfs.upgrade() {
            Some(vfs) => vfs.close_handle(self),
            None => Ok(()),
        }
    }

    /// Tear down the stream and buffer. Only called once the handle has
    /// been unlinked from its open list.
    pub(crate) fn destroy(&self) {
        let (io, released) = {
            let mut state = self.inner.state.lock();
            let released = state.buffer.len();
            state.buffer = Vec::new();
            state.buffill = 0;
            state.bufpos = 0;
            (state.io.take(), released)
        };
        // The stream may be arbitrary back-end code; destroy it without
        // holding the handle lock.
        drop(io);
        if released > 0 {
            self.inner.allocator.release(released);
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // Last reference gone without an explicit close: push out whatever
        // the buffer still holds, best-effort.
        let state = self.state.get_mut();
        if !self.for_reading && state.io.is_some() && state.bufpos != state.buffill {
            let _ = state.flush(false);
        }
        if !state.buffer.is_empty() {
            self.allocator.release(state.buffer.len());
        }
    }
}
