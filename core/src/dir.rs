//! The built-in back-end for plain host directories.
//!
//! Its archive state is just the real directory prefix; every operation
//! joins the prefix with the requested virtual path (converting `/` to the
//! platform separator along the way) and delegates to the platform layer.

use crate::archiver::{
    Archive, Archiver, ArchiverInfo, EnumerateCallback, EnumerateStatus, FileStat,
    OpenArchiveOutcome,
};
use crate::error::{ErrorKind, VfsError, VfsResult};
use crate::io::{IoStream, NativeIo, OpenMode};
use crate::platform;
use std::path::PathBuf;

static DIR_INFO: ArchiverInfo = ArchiverInfo {
    extension: "",
    description: "Non-archive, direct filesystem I/O",
    supports_symlinks: true,
};

#[derive(Debug)]
pub struct DirArchiver;

impl Archiver for DirArchiver {
    fn info(&self) -> &ArchiverInfo {
        &DIR_INFO
    }

    fn open_archive(
        &self,
        io: Option<Box<dyn IoStream>>,
        name: &str,
        _for_writing: bool,
    ) -> OpenArchiveOutcome {
        debug_assert!(io.is_none(), "DIR works on names, not streams");
        let stat = match platform::stat(name.as_ref(), true) {
            Ok(stat) => stat,
            Err(err) => return OpenArchiveOutcome::Failed(err),
        };
        if !stat.is_dir() {
            return OpenArchiveOutcome::Unclaimed(io);
        }
        OpenArchiveOutcome::Opened(Box::new(DirArchive {
            prefix: PathBuf::from(name),
        }))
    }
}

#[derive(Debug)]
pub struct DirArchive {
    prefix: PathBuf,
}

impl DirArchive {
    /// Join the real prefix and a virtual path, converting separators.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.prefix.clone();
        for segment in path.split('/') {
            if !segment.is_empty() {
                full.push(segment);
            }
        }
        full
    }
}

impl Archive for DirArchive {
    fn enumerate(
        &self,
        dir: &str,
        origdir: &str,
        cb: &mut EnumerateCallback<'_>,
    ) -> VfsResult<EnumerateStatus> {
        let names = platform::enumerate(&self.resolve(dir))?;
        for name in names {
            match cb(origdir, &name) {
                EnumerateStatus::Continue => {}
                EnumerateStatus::Stop => return Ok(EnumerateStatus::Stop),
                EnumerateStatus::Abort => {
                    return Err(VfsError::new(ErrorKind::AppCallback, "dir.enumerate"))
                }
            }
        }
        Ok(EnumerateStatus::Continue)
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn IoStream>> {
        Ok(Box::new(NativeIo::open(&self.resolve(path), OpenMode::Read)?))
    }

    fn open_write(&self, path: &str) -> VfsResult<Box<dyn IoStream>> {
        Ok(Box::new(NativeIo::open(
            &self.resolve(path),
            OpenMode::Write,
        )?))
    }

    fn open_append(&self, path: &str) -> VfsResult<Box<dyn IoStream>> {
        Ok(Box::new(NativeIo::open(
            &self.resolve(path),
            OpenMode::Append,
        )?))
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        platform::delete(&self.resolve(path))
    }

    fn mkdir(&self, path: &str) -> VfsResult<()> {
        platform::mkdir(&self.resolve(path))
    }

    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        // The final component is deliberately not followed; the symlink
        // verification walk depends on seeing links as links.
        platform::stat(&self.resolve(path), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::FileType;

    fn open(dir: &std::path::Path) -> Box<dyn Archive> {
        match DirArchiver.open_archive(None, dir.to_str().unwrap(), false) {
            OpenArchiveOutcome::Opened(archive) => archive,
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    #[test]
    fn claims_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), b"x").unwrap();

        let outcome =
            DirArchiver.open_archive(None, dir.path().join("file").to_str().unwrap(), false);
        assert!(matches!(outcome, OpenArchiveOutcome::Unclaimed(_)));

        let outcome =
            DirArchiver.open_archive(None, dir.path().join("missing").to_str().unwrap(), false);
        match outcome {
            OpenArchiveOutcome::Failed(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_host_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = open(dir.path());

        archive.mkdir("sub").unwrap();
        {
            let mut io = archive.open_write("sub/file.txt").unwrap();
            io.write(b"payload").unwrap();
            io.flush().unwrap();
        }

        let st = archive.stat("sub/file.txt").unwrap();
        assert_eq!(st.file_type, FileType::Regular);
        assert_eq!(st.size, Some(7));

        let mut io = archive.open_read("sub/file.txt").unwrap();
        let mut buf = [0u8; 16];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"payload");

        archive.remove("sub/file.txt").unwrap();
        archive.remove("sub").unwrap();
        assert_eq!(
            archive.stat("sub").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn enumerate_yields_immediate_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b").join("nested"), b"").unwrap();

        let archive = open(dir.path());
        let mut seen = Vec::new();
        archive
            .enumerate("", "/", &mut |origdir, name| {
                assert_eq!(origdir, "/");
                seen.push(name.to_owned());
                EnumerateStatus::Continue
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, ["a", "b"]);
    }
}
