//! Symlink policy: the per-mount verification walk, the enumeration
//! filter, and the permit toggle — over both an in-memory archive and a
//! real directory.

use std::sync::Arc;
use strata_core::{ErrorKind, Vfs};
use strata_mem::{MemArchive, MemArchiver, MemIo};

fn new_vfs() -> Vfs {
    Vfs::init(None).expect("init")
}

/// Archive with a real subtree and a symlink pointing into it:
///   etc/passwd     "root:x"
///   etc/motd       "hello"
///   link -> etc
///   stray -> etc/passwd
fn linked_pack() -> MemArchive {
    MemArchive::builder()
        .file("etc/passwd", b"root:x")
        .file("etc/motd", b"hello")
        .symlink("link", "etc")
        .symlink("stray", "etc/passwd")
        .build()
}

fn mounted(pack: &MemArchive) -> Vfs {
    let vfs = new_vfs();
    vfs.register_archiver(Arc::new(MemArchiver)).unwrap();
    vfs.mount_io(Box::new(MemIo::new(pack.manifest())), "pack.mem", None, true)
        .unwrap();
    vfs
}

fn read_all(vfs: &Vfs, path: &str) -> Vec<u8> {
    let handle = vfs.open_read(path).expect("open_read");
    let mut buf = vec![0u8; 64];
    let n = handle.read_bytes(&mut buf).unwrap();
    buf.truncate(n);
    vfs.close(&handle).unwrap();
    buf
}

#[test]
fn traversal_through_a_symlink_is_forbidden_by_default() {
    let vfs = mounted(&linked_pack());
    assert!(!vfs.symbolic_links_permitted());

    let err = vfs.open_read("/link/passwd").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SymlinkForbidden);
    assert_eq!(vfs.last_error_code(), Some(ErrorKind::SymlinkForbidden));

    // The same data is reachable by its real path.
    assert_eq!(read_all(&vfs, "/etc/passwd"), b"root:x");
}

#[test]
fn permitting_symlinks_makes_the_same_call_succeed() {
    let vfs = mounted(&linked_pack());
    vfs.permit_symbolic_links(true);
    assert!(vfs.symbolic_links_permitted());

    assert_eq!(read_all(&vfs, "/link/passwd"), b"root:x");
    assert_eq!(read_all(&vfs, "/stray"), b"root:x");

    // And flipping back restores the refusal.
    vfs.permit_symbolic_links(false);
    assert_eq!(
        vfs.open_read("/link/passwd").unwrap_err().kind(),
        ErrorKind::SymlinkForbidden
    );
}

#[test]
fn stat_refuses_to_look_through_forbidden_links() {
    let vfs = mounted(&linked_pack());

    let err = vfs.stat("/link").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SymlinkForbidden);
    assert!(!vfs.is_symbolic_link("/link")); // stat failed, so no

    vfs.permit_symbolic_links(true);
    assert!(vfs.is_symbolic_link("/link"));
    assert!(vfs.is_symbolic_link("/stray"));
    assert!(!vfs.is_symbolic_link("/etc/passwd"));
}

#[test]
fn enumeration_drops_symlinked_children_when_forbidden() {
    let vfs = mounted(&linked_pack());

    assert_eq!(vfs.enumerate_files("/").unwrap(), vec!["etc"]);
    assert_eq!(
        vfs.enumerate_files("/etc").unwrap(),
        vec!["motd", "passwd"]
    );

    vfs.permit_symbolic_links(true);
    assert_eq!(
        vfs.enumerate_files("/").unwrap(),
        vec!["etc", "link", "stray"]
    );
}

#[cfg(unix)]
mod host_symlinks {
    use super::*;
    use std::fs;

    fn linked_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real").join("f"), b"payload").unwrap();
        std::os::unix::fs::symlink("real", dir.path().join("sl")).unwrap();
        dir
    }

    #[test]
    fn host_directory_mounts_honor_the_policy() {
        let dir = linked_dir();
        let vfs = new_vfs();
        vfs.mount(dir.path().to_str().unwrap(), None, true).unwrap();

        assert_eq!(
            vfs.open_read("/sl/f").unwrap_err().kind(),
            ErrorKind::SymlinkForbidden
        );
        assert_eq!(vfs.enumerate_files("/").unwrap(), vec!["real"]);
        assert_eq!(read_all(&vfs, "/real/f"), b"payload");

        vfs.permit_symbolic_links(true);
        assert_eq!(read_all(&vfs, "/sl/f"), b"payload");
        assert_eq!(vfs.enumerate_files("/").unwrap(), vec!["real", "sl"]);
    }

    #[test]
    fn deleting_through_links_is_gated_too() {
        let dir = linked_dir();
        let vfs = new_vfs();
        let path = dir.path().to_str().unwrap();
        vfs.set_write_dir(Some(path)).unwrap();

        assert_eq!(
            vfs.delete("/sl/f").unwrap_err().kind(),
            ErrorKind::SymlinkForbidden
        );
        vfs.permit_symbolic_links(true);
        vfs.delete("/sl/f").unwrap();
        assert!(!dir.path().join("real").join("f").exists());
    }
}
