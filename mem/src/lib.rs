//! In-memory archive back-end.
//!
//! A [`MemArchive`] holds its whole listing in a [`DirTree`] and its file
//! bodies in shared byte slices, which makes it the reference consumer of
//! the archiver contract: read-only, symlink-capable, indexed up front the
//! way compressed-container back-ends are. The wire form is a small
//! line-based manifest (see [`manifest`]), so a `MemArchive` can travel
//! through `mount_io` and the normal opener-resolution path.

mod manifest;

use std::fmt;
use std::sync::Arc;

use strata_core::{
    Archive, Archiver, ArchiverInfo, DirTree, EnumerateCallback, EnumerateStatus, ErrorKind,
    FileStat, FileType, IoStream, OpenArchiveOutcome, VfsError, VfsResult,
};

pub use manifest::MAGIC;

/// How many chained symlinks a lookup will follow before giving up.
const MAX_LINK_DEPTH: usize = 16;

static MEM_INFO: ArchiverInfo = ArchiverInfo {
    extension: "mem",
    description: "In-memory manifest archive",
    supports_symlinks: true,
};

/// Per-entry payload: file bodies and symlink targets. Directories carry
/// neither.
#[derive(Debug, Default)]
struct MemPayload {
    data: Option<Arc<[u8]>>,
    link: Option<String>,
}

/// Read-only archive resident in memory.
pub struct MemArchive {
    tree: DirTree<MemPayload>,
    /// The claimed input stream, held until the archive is dropped. The
    /// listing is fully inflated so the stream is never read again, but
    /// the contract makes the archive its owner.
    source: std::sync::Mutex<Option<Box<dyn IoStream>>>,
}

impl fmt::Debug for MemArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemArchive")
            .field("entries", &self.tree.len())
            .finish()
    }
}

impl MemArchive {
    pub fn builder() -> MemArchiveBuilder {
        MemArchiveBuilder {
            tree: DirTree::new(),
        }
    }

    /// Serialize to the manifest wire form accepted by [`MemArchiver`].
    pub fn manifest(&self) -> Vec<u8> {
        manifest::serialize(&self.tree)
    }

    /// Follow `path` through the tree. Symlinked interior components are
    /// always expanded; `follow_links` controls only the final component.
    /// Returns the id of the final entry.
    fn resolve(&self, path: &str, follow_links: bool) -> VfsResult<strata_core::EntryId> {
        let mut current = path.to_owned();
        for _ in 0..MAX_LINK_DEPTH {
            match self.lookup_step(&current, follow_links)? {
                Step::Done(id) => return Ok(id),
                Step::Rewritten(next) => current = next,
            }
        }
        Err(VfsError::new(ErrorKind::SymlinkLoop, "mem.resolve"))
    }

    /// One resolution step: either the path names an entry (possibly a
    /// final link we are told to follow), or its first symlinked prefix is
    /// substituted.
    fn lookup_step(&self, path: &str, follow_links: bool) -> VfsResult<Step> {
        let not_found = || VfsError::new(ErrorKind::NotFound, "mem.resolve");

        if let Some(id) = self.tree.find(path) {
            return match self.tree.payload(id).link.as_deref() {
                Some(target) if follow_links => {
                    let next = relative_target(path, target).ok_or_else(not_found)?;
                    Ok(Step::Rewritten(next))
                }
                _ => Ok(Step::Done(id)),
            };
        }

        // The full path is absent; expand the first prefix that is a
        // symlink and retry with the rewritten path.
        for (i, byte) in path.bytes().enumerate() {
            if byte != b'/' {
                continue;
            }
            let prefix = &path[..i];
            let Some(id) = self.tree.find(prefix) else {
                break;
            };
            if let Some(target) = self.tree.payload(id).link.as_deref() {
                let resolved = relative_target(prefix, target).ok_or_else(not_found)?;
                let rest = &path[i + 1..];
                let next = if resolved.is_empty() {
                    rest.to_owned()
                } else {
                    format!("{resolved}/{rest}")
                };
                return Ok(Step::Rewritten(next));
            }
        }
        Err(not_found())
    }
}

enum Step {
    Done(strata_core::EntryId),
    Rewritten(String),
}

/// Resolve a symlink target against the link's parent directory. `..`
/// walks up; walking past the archive root is an escape and fails.
fn relative_target(link_path: &str, target: &str) -> Option<String> {
    let mut stack: Vec<&str> = link_path.split('/').collect();
    stack.pop(); // the link itself
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    Some(stack.join("/"))
}

impl Archive for MemArchive {
    fn enumerate(
        &self,
        dir: &str,
        origdir: &str,
        cb: &mut EnumerateCallback<'_>,
    ) -> VfsResult<EnumerateStatus> {
        self.tree.enumerate(dir, origdir, cb)
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn IoStream>> {
        let id = self.resolve(path, true)?;
        if self.tree.is_dir(id) {
            return Err(VfsError::new(ErrorKind::NotAFile, "mem.open_read"));
        }
        let data = self
            .tree
            .payload(id)
            .data
            .clone()
            .ok_or_else(|| VfsError::new(ErrorKind::NotAFile, "mem.open_read"))?;
        Ok(Box::new(MemIo::new(data)))
    }

    fn open_write(&self, _path: &str) -> VfsResult<Box<dyn IoStream>> {
        Err(VfsError::new(ErrorKind::ReadOnly, "mem.open_write"))
    }

    fn open_append(&self, _path: &str) -> VfsResult<Box<dyn IoStream>> {
        Err(VfsError::new(ErrorKind::ReadOnly, "mem.open_append"))
    }

    fn remove(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::new(ErrorKind::ReadOnly, "mem.remove"))
    }

    fn mkdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::new(ErrorKind::ReadOnly, "mem.mkdir"))
    }

    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        // The final component is reported as-is; the security walk needs
        // to see links as links.
        let id = self.resolve(path, false)?;
        let payload = self.tree.payload(id);
        let (file_type, size) = if payload.link.is_some() {
            (FileType::Symlink, None)
        } else if self.tree.is_dir(id) {
            (FileType::Directory, None)
        } else {
            let len = payload.data.as_ref().map(|d| d.len() as u64);
            (FileType::Regular, len)
        };
        Ok(FileStat {
            size,
            mod_time: None,
            create_time: None,
            access_time: None,
            file_type,
            read_only: true,
        })
    }
}

/// Builder for test fixtures and embedded asset packs.
pub struct MemArchiveBuilder {
    tree: DirTree<MemPayload>,
}

impl MemArchiveBuilder {
    pub fn dir(mut self, path: &str) -> Self {
        self.tree.add(path, true).expect("dir entry");
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        let id = self.tree.add(path, false).expect("file entry");
        self.tree.payload_mut(id).data = Some(Arc::from(data));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        let id = self.tree.add(path, false).expect("symlink entry");
        self.tree.payload_mut(id).link = Some(target.to_owned());
        self
    }

    pub fn build(self) -> MemArchive {
        MemArchive {
            tree: self.tree,
            source: std::sync::Mutex::new(None),
        }
    }
}

/// The format driver: recognizes the manifest magic and inflates the
/// archive. Register it with an instance and mount manifests through
/// `mount_io`.
#[derive(Debug)]
pub struct MemArchiver;

impl Archiver for MemArchiver {
    fn info(&self) -> &ArchiverInfo {
        &MEM_INFO
    }

    fn open_archive(
        &self,
        io: Option<Box<dyn IoStream>>,
        _name: &str,
        for_writing: bool,
    ) -> OpenArchiveOutcome {
        let Some(mut io) = io else {
            return OpenArchiveOutcome::Unclaimed(None);
        };

        let mut bytes = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match io.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&chunk[..n]),
                Err(err) => return OpenArchiveOutcome::Failed(err),
            }
        }

        if !manifest::recognizes(&bytes) {
            return OpenArchiveOutcome::Unclaimed(Some(io));
        }
        if for_writing {
            return OpenArchiveOutcome::Failed(VfsError::new(
                ErrorKind::ReadOnly,
                "mem.open_archive",
            ));
        }
        match manifest::parse(&bytes) {
            Ok(archive) => {
                *archive.source.lock().expect("source lock") = Some(io);
                OpenArchiveOutcome::Opened(Box::new(archive))
            }
            Err(err) => OpenArchiveOutcome::Failed(err),
        }
    }
}

/// Stream over a shared byte slice. Duplicates share the bytes but not
/// the cursor.
#[derive(Debug, Clone)]
pub struct MemIo {
    data: Arc<[u8]>,
    pos: u64,
}

impl MemIo {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl IoStream for MemIo {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let pos = self.pos as usize;
        if pos >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - pos);
        buf[..n].copy_from_slice(&self.data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::new(ErrorKind::ReadOnly, "mem.io.write"))
    }

    fn seek(&mut self, pos: u64) -> VfsResult<()> {
        if pos > self.data.len() as u64 {
            return Err(VfsError::new(ErrorKind::PastEof, "mem.io.seek"));
        }
        self.pos = pos;
        Ok(())
    }

    fn tell(&mut self) -> VfsResult<u64> {
        Ok(self.pos)
    }

    fn length(&mut self) -> VfsResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn duplicate(&self) -> VfsResult<Box<dyn IoStream>> {
        Ok(Box::new(MemIo::new(self.data.clone())))
    }

    fn flush(&mut self) -> VfsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> MemArchive {
        MemArchive::builder()
            .dir("data")
            .file("data/x", b"xxx")
            .file("readme.txt", b"hello")
            .symlink("link", "data")
            .build()
    }

    fn read_all(archive: &dyn Archive, path: &str) -> Vec<u8> {
        let mut io = archive.open_read(path).unwrap();
        let len = io.length().unwrap() as usize;
        let mut buf = vec![0u8; len];
        let n = io.read(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn stat_reports_entry_types() {
        let archive = sample();
        assert_eq!(archive.stat("data").unwrap().file_type, FileType::Directory);
        let st = archive.stat("data/x").unwrap();
        assert_eq!(st.file_type, FileType::Regular);
        assert_eq!(st.size, Some(3));
        assert!(st.read_only);
        assert_eq!(archive.stat("link").unwrap().file_type, FileType::Symlink);
        assert_eq!(
            archive.stat("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn open_read_follows_links() {
        let archive = sample();
        assert_eq!(read_all(&archive, "readme.txt"), b"hello");
        assert_eq!(read_all(&archive, "link/x"), b"xxx");
    }

    #[test]
    fn link_loops_are_detected() {
        let archive = MemArchive::builder()
            .symlink("a", "b")
            .symlink("b", "a")
            .build();
        assert_eq!(
            archive.open_read("a").unwrap_err().kind(),
            ErrorKind::SymlinkLoop
        );
    }

    #[test]
    fn link_escape_fails() {
        let archive = MemArchive::builder()
            .symlink("up", "../../outside")
            .build();
        assert_eq!(
            archive.open_read("up").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn writes_are_refused() {
        let archive = sample();
        assert_eq!(
            archive.open_write("new").unwrap_err().kind(),
            ErrorKind::ReadOnly
        );
        assert_eq!(archive.mkdir("new").unwrap_err().kind(), ErrorKind::ReadOnly);
        assert_eq!(
            archive.remove("data/x").unwrap_err().kind(),
            ErrorKind::ReadOnly
        );
    }

    #[test]
    fn manifest_round_trip() {
        let bytes = sample().manifest();
        let io = MemIo::new(bytes);

        let outcome = MemArchiver.open_archive(Some(io.duplicate().unwrap()), "pack.mem", false);
        let archive = match outcome {
            OpenArchiveOutcome::Opened(archive) => archive,
            other => panic!("expected Opened, got {other:?}"),
        };
        assert_eq!(read_all(&*archive, "data/x"), b"xxx");
        assert_eq!(archive.stat("link").unwrap().file_type, FileType::Symlink);

        // Unrecognized content is handed back unclaimed.
        let outcome = MemArchiver.open_archive(
            Some(Box::new(MemIo::new(&b"PK\x03\x04 not ours"[..])) as _),
            "other.zip",
            false,
        );
        assert!(matches!(outcome, OpenArchiveOutcome::Unclaimed(Some(_))));
    }

    #[test]
    fn truncated_manifest_is_corrupt() {
        let mut bytes = sample().manifest();
        bytes.truncate(bytes.len() - 4);
        let outcome =
            MemArchiver.open_archive(Some(Box::new(MemIo::new(bytes)) as _), "pack.mem", false);
        match outcome {
            OpenArchiveOutcome::Failed(err) => assert_eq!(err.kind(), ErrorKind::Corrupt),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn enumerate_lists_children() {
        let archive = sample();
        let mut names = Vec::new();
        archive
            .enumerate("", "/", &mut |_, name| {
                names.push(name.to_owned());
                EnumerateStatus::Continue
            })
            .unwrap();
        names.sort();
        assert_eq!(names, ["data", "link", "readme.txt"]);
    }
}
