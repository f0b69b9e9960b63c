//! Polymorphic I/O streams.
//!
//! Every open file and every mounted archive source is driven through
//! [`IoStream`]. Two implementations live here: [`NativeIo`] over a host
//! file, and [`HandleIo`] over an already-open VFS [`FileHandle`] (the
//! stream used by `mount_handle`). Archive back-ends supply their own.

use crate::error::VfsResult;
use crate::handle::FileHandle;
use crate::platform;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Open mode for a native stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// A seekable byte stream with an independent cursor.
///
/// `duplicate` yields a new stream over the same underlying file whose
/// cursor starts at the beginning and moves independently.
pub trait IoStream: Send + fmt::Debug {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;
    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;
    fn seek(&mut self, pos: u64) -> VfsResult<()>;
    fn tell(&mut self) -> VfsResult<u64>;
    fn length(&mut self) -> VfsResult<u64>;
    fn duplicate(&self) -> VfsResult<Box<dyn IoStream>>;
    fn flush(&mut self) -> VfsResult<()>;
}

/// Stream over a host file.
pub struct NativeIo {
    file: File,
    path: PathBuf,
    mode: OpenMode,
}

impl NativeIo {
    pub fn open(path: &Path, mode: OpenMode) -> VfsResult<Self> {
        let file = match mode {
            OpenMode::Read => platform::open_read(path)?,
            OpenMode::Write => platform::open_write(path)?,
            OpenMode::Append => platform::open_append(path)?,
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }
}

impl fmt::Debug for NativeIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeIo")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

impl IoStream for NativeIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        platform::io_result("io.native.read", self.file.read(buf))
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        platform::io_result("io.native.write", self.file.write_all(buf))?;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: u64) -> VfsResult<()> {
        platform::io_result("io.native.seek", self.file.seek(SeekFrom::Start(pos)))?;
        Ok(())
    }

    fn tell(&mut self) -> VfsResult<u64> {
        platform::io_result("io.native.tell", self.file.stream_position())
    }

    fn length(&mut self) -> VfsResult<u64> {
        let meta = platform::io_result("io.native.length", self.file.metadata())?;
        Ok(meta.len())
    }

    fn duplicate(&self) -> VfsResult<Box<dyn IoStream>> {
        // A fresh descriptor over the same path; sharing the descriptor
        // would share the cursor.
        Ok(Box::new(NativeIo::open(&self.path, self.mode)?))
    }

    fn flush(&mut self) -> VfsResult<()> {
        platform::io_result("io.native.flush", self.file.flush())
    }
}

/// Stream over an open VFS handle, used when a caller mounts an archive
/// that itself lives inside the VFS.
///
/// The stream owns the handle: dropping the stream (normally when the
/// archive mounted on top of it is closed) closes the handle.
#[derive(Debug)]
pub struct HandleIo {
    handle: FileHandle,
}

impl HandleIo {
    pub fn new(handle: FileHandle) -> Self {
        Self { handle }
    }
}

impl IoStream for HandleIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.handle.read_bytes(buf)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        self.handle.write_bytes(buf)
    }

    fn seek(&mut self, pos: u64) -> VfsResult<()> {
        self.handle.seek(pos)
    }

    fn tell(&mut self) -> VfsResult<u64> {
        self.handle.tell()
    }

    fn length(&mut self) -> VfsResult<u64> {
        self.handle.length()
    }

    fn duplicate(&self) -> VfsResult<Box<dyn IoStream>> {
        let dup = self.handle.duplicate()?;
        Ok(Box::new(HandleIo::new(dup)))
    }

    fn flush(&mut self) -> VfsResult<()> {
        self.handle.flush()
    }
}

impl Drop for HandleIo {
    fn drop(&mut self) {
        let _ = self.handle.close();
    }
}
