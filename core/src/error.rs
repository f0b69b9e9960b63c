//! Error surface of the VFS core.
//!
//! [`ErrorKind`] is the stable public code set: callers match on it, the
//! per-thread error registry stores it, and [`ErrorKind::message`] is the
//! readable string for each code. [`VfsError`] pairs a kind with a static
//! context tag naming the operation that failed (`"mount.open"`,
//! `"handle.flush"`, ...) and, for host I/O failures, the originating
//! `std::io::Error`.

use std::fmt;
use thiserror::Error;

/// Stable error codes reported by every public operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("unknown error")]
    OtherError,
    #[error("out of memory")]
    OutOfMemory,
    #[error("not initialized")]
    NotInitialized,
    #[error("already initialized")]
    IsInitialized,
    #[error("argv0 is unavailable")]
    Argv0IsNull,
    #[error("unsupported")]
    Unsupported,
    #[error("past end of file")]
    PastEof,
    #[error("files still open")]
    FilesStillOpen,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not mounted")]
    NotMounted,
    #[error("not found")]
    NotFound,
    #[error("symlinks are forbidden")]
    SymlinkForbidden,
    #[error("write directory is not set")]
    NoWriteDir,
    #[error("file open for reading")]
    OpenForReading,
    #[error("file open for writing")]
    OpenForWriting,
    #[error("not a file")]
    NotAFile,
    #[error("read-only filesystem")]
    ReadOnly,
    #[error("corrupted")]
    Corrupt,
    #[error("infinite symbolic link loop")]
    SymlinkLoop,
    #[error("i/o error")]
    Io,
    #[error("permission denied")]
    Permission,
    #[error("no space available for writing")]
    NoSpace,
    #[error("filename is illegal or insecure")]
    BadFilename,
    #[error("resource busy")]
    Busy,
    #[error("directory isn't empty")]
    DirNotEmpty,
    #[error("OS reported an error")]
    OsError,
    #[error("duplicate resource")]
    Duplicate,
    #[error("bad password")]
    BadPassword,
    #[error("app callback reported error")]
    AppCallback,
}

impl ErrorKind {
    /// Readable English string for a code. The code itself is the stable
    /// contract; the wording is not.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::OtherError => "unknown error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::NotInitialized => "not initialized",
            ErrorKind::IsInitialized => "already initialized",
            ErrorKind::Argv0IsNull => "argv0 is unavailable",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::PastEof => "past end of file",
            ErrorKind::FilesStillOpen => "files still open",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotMounted => "not mounted",
            ErrorKind::NotFound => "not found",
            ErrorKind::SymlinkForbidden => "symlinks are forbidden",
            ErrorKind::NoWriteDir => "write directory is not set",
            ErrorKind::OpenForReading => "file open for reading",
            ErrorKind::OpenForWriting => "file open for writing",
            ErrorKind::NotAFile => "not a file",
            ErrorKind::ReadOnly => "read-only filesystem",
            ErrorKind::Corrupt => "corrupted",
            ErrorKind::SymlinkLoop => "infinite symbolic link loop",
            ErrorKind::Io => "i/o error",
            ErrorKind::Permission => "permission denied",
            ErrorKind::NoSpace => "no space available for writing",
            ErrorKind::BadFilename => "filename is illegal or insecure",
            ErrorKind::Busy => "resource busy",
            ErrorKind::DirNotEmpty => "directory isn't empty",
            ErrorKind::OsError => "OS reported an error",
            ErrorKind::Duplicate => "duplicate resource",
            ErrorKind::BadPassword => "bad password",
            ErrorKind::AppCallback => "app callback reported error",
        }
    }
}

/// Failure of a VFS operation: a stable [`ErrorKind`] plus the static
/// context tag of the operation that produced it.
#[derive(Debug)]
pub struct VfsError {
    kind: ErrorKind,
    context: &'static str,
    source: Option<std::io::Error>,
}

impl VfsError {
    pub fn new(kind: ErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, context: &'static str, source: std::io::Error) -> Self {
        Self {
            kind,
            context,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.kind)?;
        if let Some(src) = &self.source {
            write!(f, " ({src})")?;
        }
        Ok(())
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
