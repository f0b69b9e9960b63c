//! Host platform layer: native file I/O, filesystem metadata, and
//! user/base directory discovery.
//!
//! This is the only module that touches `std::fs` paths directly. Host
//! errors are funnelled through [`io_result`] so the `std::io::ErrorKind`
//! to [`ErrorKind`] mapping lives in one place.

use crate::archiver::{FileStat, FileType};
use crate::error::{ErrorKind, VfsError, VfsResult};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Platform directory separator, appended to every directory string this
/// module hands out.
pub const DIR_SEPARATOR: char = std::path::MAIN_SEPARATOR;

pub(crate) fn io_error_kind(err: &std::io::Error) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::NotADirectory => ErrorKind::NotFound,
        std::io::ErrorKind::IsADirectory => ErrorKind::NotAFile,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        std::io::ErrorKind::AlreadyExists => ErrorKind::Duplicate,
        std::io::ErrorKind::DirectoryNotEmpty => ErrorKind::DirNotEmpty,
        std::io::ErrorKind::StorageFull => ErrorKind::NoSpace,
        std::io::ErrorKind::ReadOnlyFilesystem => ErrorKind::ReadOnly,
        std::io::ErrorKind::ResourceBusy => ErrorKind::Busy,
        std::io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
        std::io::ErrorKind::Unsupported => ErrorKind::Unsupported,
        std::io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
        std::io::ErrorKind::UnexpectedEof => ErrorKind::PastEof,
        _ => ErrorKind::Io,
    }
}

pub(crate) fn io_result<T>(context: &'static str, result: std::io::Result<T>) -> VfsResult<T> {
    result.map_err(|err| VfsError::with_source(io_error_kind(&err), context, err))
}

pub(crate) fn open_read(path: &Path) -> VfsResult<File> {
    io_result("platform.open_read", File::open(path))
}

pub(crate) fn open_write(path: &Path) -> VfsResult<File> {
    io_result("platform.open_write", File::create(path))
}

pub(crate) fn open_append(path: &Path) -> VfsResult<File> {
    io_result(
        "platform.open_append",
        OpenOptions::new().append(true).create(true).open(path),
    )
}

fn epoch_secs(time: std::io::Result<SystemTime>) -> Option<i64> {
    let time = time.ok()?;
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => Some(d.as_secs() as i64),
        Err(e) => Some(-(e.duration().as_secs() as i64)),
    }
}

#[cfg(unix)]
fn create_time(meta: &fs::Metadata) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ctime())
}

#[cfg(not(unix))]
fn create_time(meta: &fs::Metadata) -> Option<i64> {
    epoch_secs(meta.created())
}

/// Stat a host path. `follow` controls whether the final component's
/// symlink is resolved; the rest of the path is always traversed.
pub(crate) fn stat(path: &Path, follow: bool) -> VfsResult<FileStat> {
    let meta = if follow {
        io_result("platform.stat", fs::metadata(path))?
    } else {
        io_result("platform.stat", fs::symlink_metadata(path))?
    };

    let file_type = if meta.file_type().is_symlink() {
        FileType::Symlink
    } else if meta.is_dir() {
        FileType::Directory
    } else if meta.is_file() {
        FileType::Regular
    } else {
        FileType::Other
    };

    Ok(FileStat {
        size: if file_type == FileType::Regular {
            Some(meta.len())
        } else {
            None
        },
        mod_time: epoch_secs(meta.modified()),
        create_time: create_time(&meta),
        access_time: epoch_secs(meta.accessed()),
        file_type,
        read_only: meta.permissions().readonly(),
    })
}

pub(crate) fn mkdir(path: &Path) -> VfsResult<()> {
    io_result("platform.mkdir", fs::create_dir(path))
}

pub(crate) fn mkdir_all(path: &Path) -> VfsResult<()> {
    io_result("platform.mkdir", fs::create_dir_all(path))
}

/// Remove a file or an empty directory.
pub(crate) fn delete(path: &Path) -> VfsResult<()> {
    let meta = io_result("platform.delete", fs::symlink_metadata(path))?;
    if meta.is_dir() {
        io_result("platform.delete", fs::remove_dir(path))
    } else {
        io_result("platform.delete", fs::remove_file(path))
    }
}

/// Immediate children of a host directory. Names that are not valid UTF-8
/// cannot exist in the virtual namespace and are skipped.
pub(crate) fn enumerate(path: &Path) -> VfsResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in io_result("platform.enumerate", fs::read_dir(path))? {
        let entry = io_result("platform.enumerate", entry)?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

fn with_trailing_separator(mut dir: String) -> String {
    if !dir.ends_with(DIR_SEPARATOR) {
        dir.push(DIR_SEPARATOR);
    }
    dir
}

fn parent_of(path: &Path) -> Option<String> {
    let parent = path.parent()?;
    Some(with_trailing_separator(parent.to_str()?.to_owned()))
}

/// Find a bare program name on `$PATH`, returning its directory.
fn find_in_path(bin: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(bin);
        if candidate.is_file() {
            return Some(with_trailing_separator(dir.to_str()?.to_owned()));
        }
    }
    None
}

/// Directory holding the running binary, always ending in the platform
/// separator. The current-exe symlink wins; a caller-supplied argv0 is the
/// fallback, searched on `$PATH` when it carries no separator.
pub(crate) fn calc_base_dir(argv0: Option<&str>) -> VfsResult<String> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = parent_of(&exe) {
            return Ok(dir);
        }
    }

    let argv0 = argv0.ok_or_else(|| VfsError::new(ErrorKind::Argv0IsNull, "platform.base_dir"))?;
    if argv0.contains(DIR_SEPARATOR) {
        if let Some(dir) = parent_of(Path::new(argv0)) {
            return Ok(dir);
        }
    } else if let Some(dir) = find_in_path(argv0) {
        return Ok(dir);
    }

    Err(VfsError::new(
        ErrorKind::InvalidArgument,
        "platform.base_dir",
    ))
}

/// The user's home directory, ending in the platform separator.
pub(crate) fn calc_user_dir() -> VfsResult<String> {
    let home = dirs::home_dir().ok_or_else(|| VfsError::new(ErrorKind::OsError, "platform.user_dir"))?;
    let home = home
        .into_os_string()
        .into_string()
        .map_err(|_| VfsError::new(ErrorKind::OsError, "platform.user_dir"))?;
    Ok(with_trailing_separator(home))
}

/// Per-user writable directory for `app`, following the XDG base-directory
/// chain. `org` is accepted for portability of the signature but does not
/// appear in the path on this platform.
pub(crate) fn calc_pref_dir(_org: &str, app: &str) -> VfsResult<String> {
    let base = dirs::data_dir().ok_or_else(|| VfsError::new(ErrorKind::OsError, "platform.pref_dir"))?;
    let dir = base.join(app);
    let dir = dir
        .into_os_string()
        .into_string()
        .map_err(|_| VfsError::new(ErrorKind::OsError, "platform.pref_dir"))?;
    Ok(with_trailing_separator(dir))
}

/// Mount points of optical media currently mounted on the host.
#[cfg(target_os = "linux")]
pub(crate) fn cd_rom_dirs() -> Vec<String> {
    let Ok(mounts) = fs::read_to_string("/proc/mounts") else {
        return Vec::new();
    };
    let mut dirs = Vec::new();
    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_dev), Some(mountpoint), Some(fstype)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if fstype == "iso9660" || fstype == "udf" {
            dirs.push(mountpoint.to_owned());
        }
    }
    dirs
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn cd_rom_dirs() -> Vec<String> {
    Vec::new()
}
