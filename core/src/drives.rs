//! Process-level registry of VFS instances ("drives").
//!
//! A small fixed set of independent instances indexed by an integer, for
//! embedders that address the VFS by drive number rather than by passing
//! a [`Vfs`] handle around. Each slot is a whole universe: its own search
//! path, write dir, handles and error state.

use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::vfs::Vfs;
use parking_lot::Mutex;

pub const MAX_DRIVES: usize = 8;

static DRIVES: Mutex<Vec<Option<Vfs>>> = Mutex::new(Vec::new());

fn check_index(drive: usize) -> VfsResult<()> {
    if drive < MAX_DRIVES {
        Ok(())
    } else {
        Err(VfsError::new(ErrorKind::InvalidArgument, "drives.index"))
    }
}

/// Initialize drive `drive`. Fails if the slot is already initialized.
pub fn init(drive: usize, argv0: Option<&str>) -> VfsResult<Vfs> {
    check_index(drive)?;
    let mut drives = DRIVES.lock();
    if drives.len() < MAX_DRIVES {
        drives.resize_with(MAX_DRIVES, || None);
    }
    if drives[drive].is_some() {
        return Err(VfsError::new(ErrorKind::IsInitialized, "drives.init"));
    }
    let vfs = Vfs::init(argv0)?;
    drives[drive] = Some(vfs.clone());
    Ok(vfs)
}

/// The instance in slot `drive`.
pub fn get(drive: usize) -> VfsResult<Vfs> {
    check_index(drive)?;
    let drives = DRIVES.lock();
    drives
        .get(drive)
        .and_then(|slot| slot.clone())
        .ok_or_else(|| VfsError::new(ErrorKind::NotInitialized, "drives.get"))
}

pub fn is_init(drive: usize) -> bool {
    drive < MAX_DRIVES
        && DRIVES
            .lock()
            .get(drive)
            .map(|slot| slot.is_some())
            .unwrap_or(false)
}

/// Tear down and vacate slot `drive`. The teardown failing (a write
/// handle whose flush fails) leaves the slot occupied.
pub fn deinit(drive: usize) -> VfsResult<()> {
    check_index(drive)?;
    let mut drives = DRIVES.lock();
    let slot = drives
        .get_mut(drive)
        .and_then(|slot| slot.as_ref().cloned())
        .ok_or_else(|| VfsError::new(ErrorKind::NotInitialized, "drives.deinit"))?;
    slot.deinit()?;
    drives[drive] = None;
    Ok(())
}
