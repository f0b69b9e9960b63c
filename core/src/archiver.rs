//! The archiver contract: what an archive back-end must implement to be
//! mountable, plus the per-instance registry of back-ends.
//!
//! A back-end is two objects. The [`Archiver`] is the format driver: it
//! inspects a candidate stream and either claims it or passes. An
//! [`Archive`] is one opened container; the mount table owns it and routes
//! lookups into it. Closing an archive is `Drop` — an archive releases its
//! resources, including the input stream it claimed, when the mount is
//! destroyed.

use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::io::IoStream;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What a directory entry is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// Metadata for one entry, as reported by a back-end.
///
/// Fields a container format does not record are `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: Option<u64>,
    pub mod_time: Option<i64>,
    pub create_time: Option<i64>,
    pub access_time: Option<i64>,
    pub file_type: FileType,
    pub read_only: bool,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }
}

/// Identity of a back-end.
#[derive(Clone, Debug)]
pub struct ArchiverInfo {
    /// Filename extension this format conventionally uses, without the dot.
    pub extension: &'static str,
    pub description: &'static str,
    /// Whether entries of this format can be symbolic links. When false the
    /// security walk over this archive is skipped entirely.
    pub supports_symlinks: bool,
}

/// Result of each enumeration callback invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerateStatus {
    /// Keep yielding entries.
    Continue,
    /// Halt all iteration; reported to the caller as success.
    Stop,
    /// Halt all iteration; reported to the caller as `AppCallback` failure.
    Abort,
}

/// Enumeration callback: `(origdir, entry_name) -> status`. `origdir` is
/// the directory string the application originally asked about;
/// `entry_name` is one immediate child with no path prefix.
pub type EnumerateCallback<'a> = dyn FnMut(&str, &str) -> EnumerateStatus + 'a;

/// Outcome of offering a stream to an [`Archiver`].
pub enum OpenArchiveOutcome {
    /// The back-end recognized the content and took ownership of the stream.
    Opened(Box<dyn Archive>),
    /// Not this back-end's format. The probe stream is handed back so the
    /// next candidate can inspect it.
    Unclaimed(Option<Box<dyn IoStream>>),
    /// The content is this back-end's format, but unusable (truncated,
    /// corrupt, bad password...). Resolution stops and the error is the
    /// mount's error.
    Failed(VfsError),
}

impl fmt::Debug for OpenArchiveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenArchiveOutcome::Opened(_) => f.write_str("Opened"),
            OpenArchiveOutcome::Unclaimed(_) => f.write_str("Unclaimed"),
            OpenArchiveOutcome::Failed(err) => write!(f, "Failed({err})"),
        }
    }
}

/// A mountable container format.
pub trait Archiver: Send + Sync + fmt::Debug {
    fn info(&self) -> &ArchiverInfo;

    /// Inspect `io` (or `name`, for back-ends that work on directories
    /// rather than streams) and open it as an archive if recognized.
    /// The stream's cursor is at the start when offered.
    fn open_archive(
        &self,
        io: Option<Box<dyn IoStream>>,
        name: &str,
        for_writing: bool,
    ) -> OpenArchiveOutcome;
}

/// One opened container. Paths are archive-relative, in sanitized interior
/// form; back-ends trust them.
pub trait Archive: Send + Sync + fmt::Debug {
    /// Invoke `cb` once per immediate child of `dir`.
    fn enumerate(
        &self,
        dir: &str,
        origdir: &str,
        cb: &mut EnumerateCallback<'_>,
    ) -> VfsResult<EnumerateStatus>;

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn IoStream>>;
    fn open_write(&self, path: &str) -> VfsResult<Box<dyn IoStream>>;
    fn open_append(&self, path: &str) -> VfsResult<Box<dyn IoStream>>;
    fn remove(&self, path: &str) -> VfsResult<()>;
    fn mkdir(&self, path: &str) -> VfsResult<()>;
    fn stat(&self, path: &str) -> VfsResult<FileStat>;
}

/// Registered back-ends, in registration order. Mount resolution offers a
/// stream to each in turn; the first to claim wins.
#[derive(Debug, Default)]
pub(crate) struct ArchiverRegistry {
    archivers: RwLock<Vec<Arc<dyn Archiver>>>,
    count: AtomicUsize,
}

impl ArchiverRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, archiver: Arc<dyn Archiver>) -> VfsResult<()> {
        let mut archivers = self.archivers.write();
        let ext = archiver.info().extension;
        if archivers
            .iter()
            .any(|existing| existing.info().extension.eq_ignore_ascii_case(ext))
        {
            return Err(VfsError::new(ErrorKind::Duplicate, "archiver.register"));
        }
        archivers.push(archiver);
        self.count.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Archiver>> {
        self.archivers.read().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
