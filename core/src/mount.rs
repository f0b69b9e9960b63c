//! One mounted archive, opener resolution, and the symlink-aware path
//! verifier that gates every lookup into a mount.

use crate::archiver::{Archive, Archiver, OpenArchiveOutcome};
use crate::dir::DirArchiver;
use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::io::{IoStream, NativeIo, OpenMode};
use crate::path;
use crate::platform;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// One entry of the search path (or the write mount).
pub(crate) struct MountEntry {
    pub(crate) archive: Box<dyn Archive>,
    /// External path or identifier as passed to mount; de-dup key and
    /// reverse-lookup result.
    pub(crate) dir_name: String,
    /// Sanitized interior path with trailing `/`; `None` is the root.
    pub(crate) mount_point: Option<String>,
    pub(crate) supports_symlinks: bool,
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("dir_name", &self.dir_name)
            .field("mount_point", &self.mount_point)
            .finish()
    }
}

/// Resolve a mount source to an opened archive.
///
/// With no stream supplied the source is a real path: a directory goes to
/// the DIR back-end (which gets first shot and normally claims), anything
/// else is opened as a native stream. The stream is then offered to every
/// registered back-end in registration order, rewound before each offer;
/// the first claim wins, a claimed-but-broken source propagates that
/// back-end's error, and exhaustion is `Unsupported`.
pub(crate) fn open_directory(
    archivers: &[Arc<dyn Archiver>],
    io: Option<Box<dyn IoStream>>,
    name: &str,
    for_writing: bool,
) -> VfsResult<(Box<dyn Archive>, bool)> {
    let mut stream = match io {
        Some(stream) => stream,
        None => {
            let stat = platform::stat(name.as_ref(), true)?;
            if stat.is_dir() {
                match DirArchiver.open_archive(None, name, for_writing) {
                    OpenArchiveOutcome::Opened(archive) => {
                        return Ok((archive, DirArchiver.info().supports_symlinks));
                    }
                    OpenArchiveOutcome::Failed(err) => return Err(err),
                    OpenArchiveOutcome::Unclaimed(_) => {}
                }
            }
            let mode = if for_writing {
                OpenMode::Write
            } else {
                OpenMode::Read
            };
            Box::new(NativeIo::open(name.as_ref(), mode)?)
        }
    };

    for archiver in archivers {
        stream.seek(0)?;
        match archiver.open_archive(Some(stream), name, for_writing) {
            OpenArchiveOutcome::Opened(archive) => {
                tracing::debug!(name, format = archiver.info().extension, "opened archive");
                return Ok((archive, archiver.info().supports_symlinks));
            }
            OpenArchiveOutcome::Failed(err) => return Err(err),
            OpenArchiveOutcome::Unclaimed(Some(returned)) => stream = returned,
            OpenArchiveOutcome::Unclaimed(None) => {
                return Err(VfsError::new(ErrorKind::OtherError, "mount.open"));
            }
        }
    }

    Err(VfsError::new(ErrorKind::Unsupported, "mount.open"))
}

/// Check `fname` against one mount: strip the mount point and, when
/// symlinks are forbidden, walk every path prefix through the back-end's
/// `stat` looking for links.
///
/// Returns the archive-relative suffix on success. A path outside the
/// mount point or with a missing interior segment is `NotFound` (skip this
/// mount, not a security failure); a symlinked segment is
/// `SymlinkForbidden`. A missing *final* segment passes — the target may be
/// about to be created (`allow_missing` extends that to every segment, for
/// mkdir). Back-ends that cannot contain symlinks skip the walk.
pub(crate) fn verify_path<'a>(
    entry: &MountEntry,
    fname: &'a str,
    allow_missing: bool,
    allow_symlinks: bool,
) -> VfsResult<&'a str> {
    if fname.is_empty() {
        return Ok("");
    }
    let suffix = path::archive_relative(entry.mount_point.as_deref(), fname)
        .ok_or_else(|| VfsError::new(ErrorKind::NotFound, "mount.verify"))?;

    if allow_symlinks || !entry.supports_symlinks || suffix.is_empty() {
        return Ok(suffix);
    }

    let ends: SmallVec<[usize; 16]> = path::segment_ends(suffix);
    for (i, &end) in ends.iter().enumerate() {
        let prefix = &suffix[..end];
        match entry.archive.stat(prefix) {
            Ok(stat) if stat.is_symlink() => {
                return Err(VfsError::new(ErrorKind::SymlinkForbidden, "mount.verify"));
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let last = i + 1 == ends.len();
                if last || allow_missing {
                    return Ok(suffix);
                }
                return Err(err);
            }
            // Stat trouble other than absence doesn't decide security.
            Err(_) => {}
        }
    }

    Ok(suffix)
}
