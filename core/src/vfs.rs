//! The `Vfs` instance object and the public operation set.
//!
//! A `Vfs` is one independent virtual-filesystem universe: its own search
//! path, write mount, open-handle lists, archiver registry, allocator and
//! per-thread error slots. Handles are cheap clones of an `Arc` inner; the
//! process-level index of instances lives in [`crate::drives`].
//!
//! Locking follows one discipline: an operation takes the state lock,
//! reads or updates the mount and handle structures (including any archive
//! calls made while scanning the search path, which are serialized by the
//! search-path ordering semantics), then releases it. Data operations on a
//! single open handle never take the state lock.

use crate::alloc::{Allocator, SystemAllocator};
use crate::archiver::{
    Archiver, ArchiverInfo, ArchiverRegistry, EnumerateCallback, EnumerateStatus, FileStat,
    FileType,
};
use crate::errstate::ErrorRegistry;
use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::handle::FileHandle;
use crate::io::{HandleIo, IoStream};
use crate::mount::{open_directory, verify_path, MountEntry};
use crate::path;
use crate::platform;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Handle to one VFS instance. Clones share the instance.
#[derive(Clone)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs").finish_non_exhaustive()
    }
}

pub(crate) struct VfsInner {
    self_ref: Weak<VfsInner>,
    state: Mutex<VfsState>,
    errors: ErrorRegistry,
    archivers: ArchiverRegistry,
    allocator: Mutex<Arc<dyn Allocator>>,
    allow_symlinks: AtomicBool,
    initialized: AtomicBool,
    base_dir: String,
    user_dir: String,
    pref_dir: Mutex<Option<String>>,
}

#[derive(Default)]
struct VfsState {
    mounts: Vec<Arc<MountEntry>>,
    write_mount: Option<Arc<MountEntry>>,
    open_reads: Vec<FileHandle>,
    open_writes: Vec<FileHandle>,
}

impl Vfs {
    /// Create an instance. Base and user directories are discovered now;
    /// `argv0` is only consulted when the platform cannot identify the
    /// running binary by itself.
    pub fn init(argv0: Option<&str>) -> VfsResult<Vfs> {
        let base_dir = platform::calc_base_dir(argv0)?;
        let user_dir = platform::calc_user_dir()?;
        tracing::debug!(%base_dir, %user_dir, "vfs instance initialized");
        let inner = Arc::new_cyclic(|weak| VfsInner {
            self_ref: weak.clone(),
            state: Mutex::new(VfsState::default()),
            errors: ErrorRegistry::new(),
            archivers: ArchiverRegistry::new(),
            allocator: Mutex::new(Arc::new(SystemAllocator::new())),
            allow_symlinks: AtomicBool::new(false),
            initialized: AtomicBool::new(true),
            base_dir,
            user_dir,
            pref_dir: Mutex::new(None),
        });
        Ok(Vfs { inner })
    }

    /// Tear the instance down: flush and close every open handle, drop
    /// every mount. Fails (and stops) on the first write handle whose
    /// flush fails.
    pub fn deinit(&self) -> VfsResult<()> {
        self.record(self.inner.deinit())
    }

    pub fn is_init(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    fn record<T>(&self, result: VfsResult<T>) -> VfsResult<T> {
        if let Err(err) = &result {
            self.inner.errors.set(err.kind());
        }
        result
    }

    // ----- directories -----------------------------------------------------

    /// Directory of the running binary, with trailing separator.
    pub fn base_dir(&self) -> &str {
        &self.inner.base_dir
    }

    /// The user's home directory, with trailing separator.
    pub fn user_dir(&self) -> &str {
        &self.inner.user_dir
    }

    /// Per-user writable directory for this app, created on first call.
    pub fn pref_dir(&self, org: &str, app: &str) -> VfsResult<String> {
        let result = (|| {
            if !self.is_init() {
                return Err(VfsError::new(ErrorKind::NotInitialized, "vfs.pref_dir"));
            }
            if org.is_empty() || app.is_empty() {
                return Err(VfsError::new(ErrorKind::InvalidArgument, "vfs.pref_dir"));
            }
            let dir = platform::calc_pref_dir(org, app)?;
            let probe: &Path = dir.trim_end_matches(platform::DIR_SEPARATOR).as_ref();
            if platform::stat(probe, true).is_err() {
                platform::mkdir_all(probe)?;
            }
            *self.inner.pref_dir.lock() = Some(dir.clone());
            Ok(dir)
        })();
        self.record(result)
    }

    pub fn write_dir(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state.write_mount.as_ref().map(|m| m.dir_name.clone())
    }

    /// Point all write, mkdir and delete operations at a real directory
    /// (`None` unsets). Refused while files are open for writing. A
    /// directory that fails to open leaves the write dir unset.
    pub fn set_write_dir(&self, new_dir: Option<&str>) -> VfsResult<()> {
        let result = (|| {
            let old = {
                let mut state = self.inner.state.lock();
                if let Some(current) = &state.write_mount {
                    if state
                        .open_writes
                        .iter()
                        .any(|h| h.references_mount(current))
                    {
                        return Err(VfsError::new(
                            ErrorKind::FilesStillOpen,
                            "vfs.set_write_dir",
                        ));
                    }
                }
                state.write_mount.take()
            };
            // Archive teardown can re-enter the instance (a mount sourced
            // from an open handle closes it); never drop one under the
            // state lock.
            drop(old);

            if let Some(dir) = new_dir {
                let (archive, supports_symlinks) =
                    open_directory(&self.inner.archivers.snapshot(), None, dir, true)?;
                let mut state = self.inner.state.lock();
                state.write_mount = Some(Arc::new(MountEntry {
                    archive,
                    dir_name: dir.to_owned(),
                    mount_point: None,
                    supports_symlinks,
                }));
            }
            Ok(())
        })();
        self.record(result)
    }

    // ----- mounting --------------------------------------------------------

    /// Add a real directory or archive file to the search path.
    /// `mount_point` of `None` (or `"/"`) exposes it at the root;
    /// `append` controls which end of the search path it lands on.
    /// Mounting an already-mounted source is a silent success.
    pub fn mount(&self, new_dir: &str, mount_point: Option<&str>, append: bool) -> VfsResult<()> {
        let result = self.inner.do_mount(None, new_dir, mount_point, append);
        self.record(result)
    }

    /// Mount from a caller-supplied stream; `name` stands in for the
    /// source path in the search path and for de-dup.
    pub fn mount_io(
        &self,
        io: Box<dyn IoStream>,
        name: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        let result = self.inner.do_mount(Some(io), name, mount_point, append);
        self.record(result)
    }

    /// Mount an archive that is itself a file inside this VFS. The handle
    /// is consumed; it is closed when the mount is destroyed (or when
    /// mounting fails).
    pub fn mount_handle(
        &self,
        file: FileHandle,
        name: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        self.mount_io(Box::new(HandleIo::new(file)), name, mount_point, append)
    }

    /// Remove a source from the search path. Refused while any open handle
    /// still references it.
    pub fn unmount(&self, old_dir: &str) -> VfsResult<()> {
        let result = (|| {
            let removed = {
                let mut state = self.inner.state.lock();
                let idx = state
                    .mounts
                    .iter()
                    .position(|m| m.dir_name == old_dir)
                    .ok_or_else(|| VfsError::new(ErrorKind::NotMounted, "vfs.unmount"))?;
                let entry = &state.mounts[idx];
                let busy = state
                    .open_reads
                    .iter()
                    .chain(state.open_writes.iter())
                    .any(|h| h.references_mount(entry));
                if busy {
                    return Err(VfsError::new(ErrorKind::FilesStillOpen, "vfs.unmount"));
                }
                state.mounts.remove(idx)
            };
            // Archive teardown happens outside the state lock; see
            // set_write_dir.
            drop(removed);
            tracing::debug!(source = old_dir, "unmounted");
            Ok(())
        })();
        self.record(result)
    }

    /// The search path, in precedence order.
    pub fn search_path(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.mounts.iter().map(|m| m.dir_name.clone()).collect()
    }

    /// Where a mounted source is exposed (`"/"` for root mounts).
    pub fn mount_point(&self, dir: &str) -> VfsResult<String> {
        let result = (|| {
            let state = self.inner.state.lock();
            let entry = state
                .mounts
                .iter()
                .find(|m| m.dir_name == dir)
                .ok_or_else(|| VfsError::new(ErrorKind::NotMounted, "vfs.mount_point"))?;
            Ok(entry
                .mount_point
                .clone()
                .unwrap_or_else(|| "/".to_owned()))
        })();
        self.record(result)
    }

    /// Which mounted source a virtual path resolves through, or `None` if
    /// nothing in the search path has it.
    pub fn real_dir(&self, fname: &str) -> VfsResult<Option<String>> {
        let result = (|| {
            let fname = path::sanitize(fname)?;
            let allow = self.inner.symlinks_allowed();
            let state = self.inner.state.lock();
            for entry in &state.mounts {
                if path::part_of_mount_point(entry.mount_point.as_deref(), &fname) {
                    return Ok(Some(entry.dir_name.clone()));
                }
                if let Ok(suffix) = verify_path(entry, &fname, false, allow) {
                    if entry.archive.stat(suffix).is_ok() {
                        return Ok(Some(entry.dir_name.clone()));
                    }
                }
            }
            Ok(None)
        })();
        self.record(result)
    }

    // ----- options ---------------------------------------------------------

    pub fn permit_symbolic_links(&self, allow: bool) {
        self.inner.allow_symlinks.store(allow, Ordering::Release);
    }

    pub fn symbolic_links_permitted(&self) -> bool {
        self.inner.symlinks_allowed()
    }

    /// One-call convention setup: the pref dir becomes the write dir and
    /// heads the search path, the base dir joins at the end, and archives
    /// with the given extension found at the root are mounted. Errors from
    /// the nested mounts are deliberately ignored.
    pub fn set_sane_config(
        &self,
        org: &str,
        app: &str,
        archive_ext: Option<&str>,
        include_cd_roms: bool,
        archives_first: bool,
    ) -> VfsResult<()> {
        let result = (|| {
            if !self.is_init() {
                return Err(VfsError::new(
                    ErrorKind::NotInitialized,
                    "vfs.set_sane_config",
                ));
            }
            let pref = self.pref_dir(org, app)?;
            let base = self.base_dir().to_owned();

            self.set_write_dir(Some(&pref))
                .map_err(|_| VfsError::new(ErrorKind::NoWriteDir, "vfs.set_sane_config"))?;

            let _ = self.mount(&pref, None, false);
            let _ = self.mount(&base, None, true);
            if include_cd_roms {
                for cd in platform::cd_rom_dirs() {
                    let _ = self.mount(&cd, None, true);
                }
            }

            if let Some(ext) = archive_ext {
                let mut candidates = Vec::new();
                let _ = self.enumerate("/", |_, name| {
                    if name.len() > ext.len() + 1 {
                        let dot = name.len() - ext.len() - 1;
                        if name.as_bytes()[dot] == b'.' && name[dot + 1..].eq_ignore_ascii_case(ext)
                        {
                            candidates.push(name.to_owned());
                        }
                    }
                    EnumerateStatus::Continue
                });
                for name in candidates {
                    if let Ok(Some(dir)) = self.real_dir(&name) {
                        if let Some(full) = Path::new(&dir).join(&name).to_str() {
                            let _ = self.mount(full, None, !archives_first);
                        }
                    }
                }
            }
            Ok(())
        })();
        self.record(result)
    }

    // ----- archivers -------------------------------------------------------

    /// Register an archive back-end. Mount resolution offers unclaimed
    /// sources to back-ends in registration order.
    pub fn register_archiver(&self, archiver: Arc<dyn Archiver>) -> VfsResult<()> {
        let result = self.inner.archivers.register(archiver);
        self.record(result)
    }

    /// Identity of every registered back-end, in registration order.
    pub fn supported_archive_types(&self) -> Vec<ArchiverInfo> {
        let mut out = Vec::with_capacity(self.inner.archivers.len());
        for archiver in self.inner.archivers.snapshot() {
            out.push(archiver.info().clone());
        }
        out
    }

    // ----- files -----------------------------------------------------------

    /// Open for reading via the first mount in the search path that has
    /// the file.
    pub fn open_read(&self, fname: &str) -> VfsResult<FileHandle> {
        let result = self.inner.do_open_read(fname);
        self.record(result)
    }

    /// Open for writing (truncating) in the write directory.
    pub fn open_write(&self, fname: &str) -> VfsResult<FileHandle> {
        let result = self.inner.do_open_write(fname, false);
        self.record(result)
    }

    /// Open for appending in the write directory.
    pub fn open_append(&self, fname: &str) -> VfsResult<FileHandle> {
        let result = self.inner.do_open_write(fname, true);
        self.record(result)
    }

    /// Close a handle: flush (for writes), unlink, destroy the stream.
    /// A failed flush leaves the handle open so the close can be retried.
    pub fn close(&self, handle: &FileHandle) -> VfsResult<()> {
        self.inner.close_handle(handle)
    }

    // ----- namespace -------------------------------------------------------

    pub fn exists(&self, fname: &str) -> bool {
        matches!(self.real_dir(fname), Ok(Some(_)))
    }

    /// Metadata for a virtual path, resolved through the search path. The
    /// root is always a directory, writable exactly when a write dir is
    /// set.
    pub fn stat(&self, fname: &str) -> VfsResult<FileStat> {
        let result = self.inner.do_stat(fname);
        self.record(result)
    }

    pub fn is_directory(&self, fname: &str) -> bool {
        self.stat(fname).map(|st| st.is_dir()).unwrap_or(false)
    }

    pub fn is_symbolic_link(&self, fname: &str) -> bool {
        self.stat(fname).map(|st| st.is_symlink()).unwrap_or(false)
    }

    /// Walk the immediate children of a virtual directory across every
    /// mount, in search-path order. The callback receives the directory
    /// string as given by the caller and one child name per call;
    /// returning [`EnumerateStatus::Stop`] halts with success,
    /// [`EnumerateStatus::Abort`] halts with `AppCallback`.
    pub fn enumerate<F>(&self, path: &str, mut cb: F) -> VfsResult<()>
    where
        F: FnMut(&str, &str) -> EnumerateStatus,
    {
        let result = self.inner.do_enumerate(path, &mut cb);
        self.record(result)
    }

    /// Sorted, de-duplicated listing of a virtual directory.
    pub fn enumerate_files(&self, path: &str) -> VfsResult<Vec<String>> {
        let mut list: Vec<String> = Vec::new();
        let result = self.inner.do_enumerate(path, &mut |_, name| {
            if let Err(pos) = list.binary_search_by(|existing| existing.as_str().cmp(name)) {
                list.insert(pos, name.to_owned());
            }
            EnumerateStatus::Continue
        });
        self.record(result)?;
        Ok(list)
    }

    /// Create a directory (and any missing ancestors) in the write dir.
    pub fn mkdir(&self, dname: &str) -> VfsResult<()> {
        let result = self.inner.do_mkdir(dname);
        self.record(result)
    }

    /// Delete a file or empty directory from the write dir.
    pub fn delete(&self, fname: &str) -> VfsResult<()> {
        let result = self.inner.do_delete(fname);
        self.record(result)
    }

    // ----- error state -----------------------------------------------------

    /// The calling thread's last error on this instance; reading clears it.
    pub fn last_error_code(&self) -> Option<ErrorKind> {
        self.inner.errors.take()
    }

    pub fn set_error_code(&self, kind: ErrorKind) {
        self.inner.errors.set(kind);
    }

    // ----- allocator -------------------------------------------------------

    pub fn set_allocator(&self, allocator: Arc<dyn Allocator>) {
        *self.inner.allocator.lock() = allocator;
    }

    pub fn allocator(&self) -> Arc<dyn Allocator> {
        self.inner.allocator.lock().clone()
    }
}

impl VfsInner {
    fn symlinks_allowed(&self) -> bool {
        self.allow_symlinks.load(Ordering::Acquire)
    }

    fn allocator(&self) -> Arc<dyn Allocator> {
        self.allocator.lock().clone()
    }

    fn deinit(&self) -> VfsResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(VfsError::new(ErrorKind::NotInitialized, "vfs.deinit"));
        }
        let (writes, reads, write_mount, mounts) = {
            let mut state = self.state.lock();
            for handle in &state.open_writes {
                handle.flush()?;
                handle.flush_underlying()?;
            }
            (
                std::mem::take(&mut state.open_writes),
                std::mem::take(&mut state.open_reads),
                state.write_mount.take(),
                std::mem::take(&mut state.mounts),
            )
        };
        for handle in writes.iter().chain(reads.iter()) {
            handle.destroy();
        }
        drop(write_mount);
        drop(mounts);
        self.errors.clear();
        self.initialized.store(false, Ordering::Release);
        tracing::debug!("vfs instance deinitialized");
        Ok(())
    }

    fn do_mount(
        &self,
        io: Option<Box<dyn IoStream>>,
        fname: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> VfsResult<()> {
        let mount_point = match mount_point {
            None => None,
            Some(raw) => {
                let sanitized = path::sanitize(raw)?;
                if sanitized.is_empty() {
                    None
                } else {
                    Some(sanitized + "/")
                }
            }
        };

        {
            let state = self.state.lock();
            if state.mounts.iter().any(|m| m.dir_name == fname) {
                return Ok(()); // already in the search path
            }
        }

        // Opening (and, on failure, dropping) an archive can re-enter the
        // instance when the source stream wraps an open handle, so it
        // happens outside the state lock; the duplicate check is redone
        // before splicing.
        let (archive, supports_symlinks) =
            open_directory(&self.archivers.snapshot(), io, fname, false)?;
        let entry = Arc::new(MountEntry {
            archive,
            dir_name: fname.to_owned(),
            mount_point,
            supports_symlinks,
        });

        let lost_race = {
            let mut state = self.state.lock();
            if state.mounts.iter().any(|m| m.dir_name == fname) {
                true
            } else {
                tracing::debug!(
                    source = fname,
                    mount_point = entry.mount_point.as_deref().unwrap_or("/"),
                    append,
                    "mounted"
                );
                if append {
                    state.mounts.push(entry.clone());
                } else {
                    state.mounts.insert(0, entry.clone());
                }
                false
            }
        };
        if lost_race {
            drop(entry); // outside the lock, as above
        }
        Ok(())
    }

    fn do_open_read(&self, fname: &str) -> VfsResult<FileHandle> {
        let fname = path::sanitize(fname)?;
        let allow = self.symlinks_allowed();
        let mut state = self.state.lock();
        if state.mounts.is_empty() {
            return Err(VfsError::new(ErrorKind::NotFound, "vfs.open_read"));
        }

        let mut last: Option<VfsError> = None;
        let mut opened: Option<(Box<dyn IoStream>, Arc<MountEntry>)> = None;
        for entry in &state.mounts {
            match verify_path(entry, &fname, false, allow) {
                Ok(suffix) => match entry.archive.open_read(suffix) {
                    Ok(io) => {
                        opened = Some((io, entry.clone()));
                        break;
                    }
                    Err(err) => last = Some(err),
                },
                Err(err) => last = Some(err),
            }
        }

        let (io, entry) = match opened {
            Some(found) => found,
            None => {
                return Err(
                    last.unwrap_or_else(|| VfsError::new(ErrorKind::NotFound, "vfs.open_read"))
                )
            }
        };
        let handle = FileHandle::new(self.self_ref.clone(), entry, true, self.allocator(), io);
        state.open_reads.push(handle.clone());
        Ok(handle)
    }

    fn do_open_write(&self, fname: &str, appending: bool) -> VfsResult<FileHandle> {
        let fname = path::sanitize(fname)?;
        let allow = self.symlinks_allowed();
        let mut state = self.state.lock();
        let entry = state
            .write_mount
            .clone()
            .ok_or_else(|| VfsError::new(ErrorKind::NoWriteDir, "vfs.open_write"))?;
        let suffix = verify_path(&entry, &fname, false, allow)?;
        let io = if appending {
            entry.archive.open_append(suffix)?
        } else {
            entry.archive.open_write(suffix)?
        };
        let handle = FileHandle::new(self.self_ref.clone(), entry, false, self.allocator(), io);
        state.open_writes.push(handle.clone());
        Ok(handle)
    }

    pub(crate) fn register_handle(&self, handle: FileHandle) {
        let mut state = self.state.lock();
        if handle.for_reading() {
            state.open_reads.push(handle);
        } else {
            state.open_writes.push(handle);
        }
    }

    pub(crate) fn close_handle(&self, handle: &FileHandle) -> VfsResult<()> {
        let result = (|| {
            let mut state = self.state.lock();
            if let Some(idx) = state.open_reads.iter().position(|h| h.ptr_eq(handle)) {
                let owned = state.open_reads.remove(idx);
                drop(state);
                owned.destroy();
                return Ok(());
            }
            if let Some(idx) = state.open_writes.iter().position(|h| h.ptr_eq(handle)) {
                // Push the user-level buffer out, then the stream's own
                // buffers; either failure aborts the close with the handle
                // still linked.
                handle.flush()?;
                handle.flush_underlying()?;
                let owned = state.open_writes.remove(idx);
                drop(state);
                owned.destroy();
                return Ok(());
            }
            Err(VfsError::new(ErrorKind::InvalidArgument, "vfs.close"))
        })();
        if let Err(err) = &result {
            self.errors.set(err.kind());
        }
        result
    }

    fn do_stat(&self, fname: &str) -> VfsResult<FileStat> {
        let fname = path::sanitize(fname)?;
        let allow = self.symlinks_allowed();
        let state = self.state.lock();

        if fname.is_empty() {
            return Ok(FileStat {
                size: None,
                mod_time: None,
                create_time: None,
                access_time: None,
                file_type: FileType::Directory,
                read_only: state.write_mount.is_none(),
            });
        }

        let mut last: Option<VfsError> = None;
        for entry in &state.mounts {
            if path::part_of_mount_point(entry.mount_point.as_deref(), &fname) {
                // Interior segment of a deeper mount point: a virtual,
                // read-only directory.
                return Ok(FileStat {
                    size: None,
                    mod_time: None,
                    create_time: None,
                    access_time: None,
                    file_type: FileType::Directory,
                    read_only: true,
                });
            }
            match verify_path(entry, &fname, false, allow) {
                Ok(suffix) => match entry.archive.stat(suffix) {
                    Ok(stat) => return Ok(stat),
                    Err(err) if err.kind() == ErrorKind::NotFound => last = Some(err),
                    Err(err) => return Err(err),
                },
                Err(err) => last = Some(err),
            }
        }
        Err(last.unwrap_or_else(|| VfsError::new(ErrorKind::NotFound, "vfs.stat")))
    }

    fn do_enumerate(&self, orig: &str, cb: &mut EnumerateCallback<'_>) -> VfsResult<()> {
        let fname = path::sanitize(orig)?;
        let allow = self.symlinks_allowed();
        let state = self.state.lock();

        for entry in &state.mounts {
            if path::part_of_mount_point(entry.mount_point.as_deref(), &fname) {
                // The requested directory sits above this mount point:
                // synthesize its next segment as a virtual child.
                let mp = entry
                    .mount_point
                    .as_deref()
                    .expect("interior match implies a mount point");
                match cb(orig, path::next_mount_segment(mp, &fname)) {
                    EnumerateStatus::Continue => continue,
                    EnumerateStatus::Stop => return Ok(()),
                    EnumerateStatus::Abort => {
                        return Err(VfsError::new(ErrorKind::AppCallback, "vfs.enumerate"))
                    }
                }
            }

            let Ok(suffix) = verify_path(entry, &fname, false, allow) else {
                continue;
            };
            let Ok(stat) = entry.archive.stat(suffix) else {
                continue; // no such dir in this archive
            };
            if !stat.is_dir() {
                continue;
            }

            let status = if !allow && entry.supports_symlinks {
                // Interpose a per-child stat so symlinked entries never
                // reach the application; stat errors out of the filter
                // override the generic callback error.
                let mut filter_err: Option<VfsError> = None;
                let archive = &entry.archive;
                let mut filter = |origdir: &str, name: &str| -> EnumerateStatus {
                    let full = if suffix.is_empty() {
                        name.to_owned()
                    } else {
                        format!("{suffix}/{name}")
                    };
                    match archive.stat(&full) {
                        Err(err) => {
                            filter_err = Some(err);
                            EnumerateStatus::Abort
                        }
                        Ok(stat) if stat.is_symlink() => EnumerateStatus::Continue,
                        Ok(_) => cb(origdir, name),
                    }
                };
                match entry.archive.enumerate(suffix, orig, &mut filter) {
                    Ok(status) => status,
                    Err(err) => return Err(filter_err.take().unwrap_or(err)),
                }
            } else {
                entry.archive.enumerate(suffix, orig, cb)?
            };

            match status {
                EnumerateStatus::Continue => {}
                EnumerateStatus::Stop => return Ok(()),
                EnumerateStatus::Abort => {
                    return Err(VfsError::new(ErrorKind::AppCallback, "vfs.enumerate"))
                }
            }
        }
        Ok(())
    }

    fn do_mkdir(&self, dname: &str) -> VfsResult<()> {
        let dname = path::sanitize(dname)?;
        let allow = self.symlinks_allowed();
        let state = self.state.lock();
        let entry = state
            .write_mount
            .clone()
            .ok_or_else(|| VfsError::new(ErrorKind::NoWriteDir, "vfs.mkdir"))?;
        let suffix = verify_path(&entry, &dname, true, allow)?;
        if suffix.is_empty() {
            return Ok(());
        }

        // Walk the prefixes, creating whatever is missing. Once one
        // ancestor is missing every deeper one is too, so the existence
        // probe stops paying for itself and is skipped.
        let mut exists = true;
        for end in path::segment_ends(suffix) {
            let prefix = &suffix[..end];
            if exists {
                match entry.archive.stat(prefix) {
                    Ok(stat) => {
                        if !stat.is_dir() {
                            return Err(VfsError::new(ErrorKind::Duplicate, "vfs.mkdir"));
                        }
                        continue;
                    }
                    Err(err) if err.kind() == ErrorKind::NotFound => exists = false,
                    Err(err) => return Err(err),
                }
            }
            entry.archive.mkdir(prefix)?;
        }
        Ok(())
    }

    fn do_delete(&self, fname: &str) -> VfsResult<()> {
        let fname = path::sanitize(fname)?;
        let allow = self.symlinks_allowed();
        let state = self.state.lock();
        let entry = state
            .write_mount
            .clone()
            .ok_or_else(|| VfsError::new(ErrorKind::NoWriteDir, "vfs.delete"))?;
        let suffix = verify_path(&entry, &fname, false, allow)?;
        entry.archive.remove(suffix)
    }
}
