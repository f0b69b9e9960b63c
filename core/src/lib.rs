//! Mount-ordered virtual filesystem.
//!
//! Applications see one tree rooted at `/`; behind it sits an ordered
//! search path of mounted sources — real directories through the built-in
//! DIR back-end, archive containers through pluggable [`Archiver`]
//! back-ends. Earlier mounts shadow later ones for reads; all writes go to
//! the single designated write directory.
//!
//! ```no_run
//! use strata_core::Vfs;
//!
//! let vfs = Vfs::init(None)?;
//! vfs.set_write_dir(Some("/tmp/saves"))?;
//! vfs.mount("/usr/share/game/assets", None, true)?;
//!
//! let file = vfs.open_read("/textures/brick.png")?;
//! let mut buf = vec![0u8; file.length()? as usize];
//! file.read_bytes(&mut buf)?;
//! # Ok::<(), strata_core::VfsError>(())
//! ```
//!
//! Virtual paths use `/` separators; `.`, `..`, `:` and `\` are rejected
//! by the sanitizer before any back-end sees them. Instances are
//! independent universes — create them directly with [`Vfs::init`] or
//! through the indexed [`drives`] registry.

mod alloc;
mod archiver;
mod dir;
pub mod drives;
mod error;
mod errstate;
mod handle;
mod io;
mod mount;
mod path;
mod platform;
mod tree;
mod vfs;

pub use alloc::{Allocator, CappedAllocator, SystemAllocator};
pub use archiver::{
    Archive, Archiver, ArchiverInfo, EnumerateCallback, EnumerateStatus, FileStat, FileType,
    OpenArchiveOutcome,
};
pub use dir::{DirArchive, DirArchiver};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use handle::FileHandle;
pub use io::{HandleIo, IoStream, NativeIo, OpenMode};
pub use path::sanitize;
pub use platform::DIR_SEPARATOR;
pub use tree::{DirTree, EntryId};
pub use vfs::Vfs;
