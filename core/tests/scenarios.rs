//! End-to-end scenarios tying mounts, writes, enumeration and the
//! per-thread error registry together.

use std::sync::Arc;
use strata_core::{ErrorKind, FileType, Vfs};
use strata_mem::{MemArchive, MemArchiver, MemIo};

fn new_vfs() -> Vfs {
    Vfs::init(None).expect("init")
}

fn read_all(vfs: &Vfs, path: &str) -> Vec<u8> {
    let handle = vfs.open_read(path).expect("open_read");
    let mut buf = vec![0u8; 256];
    let n = handle.read_bytes(&mut buf).unwrap();
    buf.truncate(n);
    vfs.close(&handle).unwrap();
    buf
}

#[test]
fn create_read_unmount_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();

    let vfs = new_vfs();
    vfs.set_write_dir(Some(path)).unwrap();
    vfs.mount(path, None, true).unwrap();

    let out = vfs.open_write("/hello.txt").unwrap();
    out.write_bytes(b"hi").unwrap();
    vfs.close(&out).unwrap();

    assert_eq!(read_all(&vfs, "/hello.txt"), b"hi");

    vfs.unmount(path).unwrap();
    assert!(!vfs.exists("/hello.txt"));
    // The write dir is independent of the search path.
    assert_eq!(vfs.write_dir().as_deref(), Some(path));
}

#[test]
fn shadowing_dedup_and_real_dir() {
    let dir = tempfile::tempdir().unwrap();
    let dir_path = dir.path().to_str().unwrap();

    let vfs = new_vfs();
    vfs.register_archiver(Arc::new(MemArchiver)).unwrap();
    vfs.set_write_dir(Some(dir_path)).unwrap();
    vfs.mount(dir_path, None, true).unwrap();

    let pack = MemArchive::builder().file("data/x", b"packed").build();
    vfs.mount_io(Box::new(MemIo::new(pack.manifest())), "pack.mem", None, true)
        .unwrap();

    // Only the archive has it.
    assert_eq!(vfs.enumerate_files("/data").unwrap(), vec!["x"]);
    assert_eq!(vfs.real_dir("/data/x").unwrap().as_deref(), Some("pack.mem"));
    assert_eq!(read_all(&vfs, "/data/x"), b"packed");

    // Write the same path into the real dir; the earlier mount now wins
    // and the listing still has one entry.
    vfs.mkdir("/data").unwrap();
    let out = vfs.open_write("/data/x").unwrap();
    out.write_bytes(b"local").unwrap();
    vfs.close(&out).unwrap();

    assert_eq!(vfs.enumerate_files("/data").unwrap(), vec!["x"]);
    assert_eq!(vfs.real_dir("/data/x").unwrap().as_deref(), Some(dir_path));
    assert_eq!(read_all(&vfs, "/data/x"), b"local");
}

#[test]
fn archive_mounted_under_a_prefix_is_a_virtual_tree() {
    let vfs = new_vfs();
    vfs.register_archiver(Arc::new(MemArchiver)).unwrap();

    let pack = MemArchive::builder()
        .file("levels/one.map", b"...")
        .build();
    vfs.mount_io(
        Box::new(MemIo::new(pack.manifest())),
        "assets.mem",
        Some("/assets"),
        true,
    )
    .unwrap();

    // No mount sits at "/", yet "assets" appears there.
    assert_eq!(vfs.enumerate_files("/").unwrap(), vec!["assets"]);

    let st = vfs.stat("/assets").unwrap();
    assert_eq!(st.file_type, FileType::Directory);
    assert!(st.read_only);

    assert_eq!(
        vfs.enumerate_files("/assets").unwrap(),
        vec!["levels"]
    );
    assert_eq!(read_all(&vfs, "/assets/levels/one.map"), b"...");
}

#[test]
fn root_stat_reflects_the_write_dir() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = new_vfs();

    let st = vfs.stat("/").unwrap();
    assert!(st.is_dir());
    assert!(st.read_only);

    vfs.set_write_dir(Some(dir.path().to_str().unwrap())).unwrap();
    let st = vfs.stat("/").unwrap();
    assert!(st.is_dir());
    assert!(!st.read_only);
}

#[test]
fn mkdir_builds_every_missing_ancestor() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = new_vfs();
    vfs.set_write_dir(Some(dir.path().to_str().unwrap())).unwrap();
    vfs.mount(dir.path().to_str().unwrap(), None, true).unwrap();

    vfs.mkdir("/a/b/c").unwrap();
    assert!(dir.path().join("a/b/c").is_dir());
    assert!(vfs.is_directory("/a/b/c"));

    // Re-running is fine; colliding with a file is not.
    vfs.mkdir("/a/b/c").unwrap();
    let out = vfs.open_write("/a/file").unwrap();
    vfs.close(&out).unwrap();
    assert_eq!(
        vfs.mkdir("/a/file/deeper").unwrap_err().kind(),
        ErrorKind::Duplicate
    );
}

#[test]
fn delete_removes_files_and_empty_dirs_only() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = new_vfs();
    vfs.set_write_dir(Some(dir.path().to_str().unwrap())).unwrap();
    vfs.mount(dir.path().to_str().unwrap(), None, true).unwrap();

    vfs.mkdir("/keep/sub").unwrap();
    let out = vfs.open_write("/keep/sub/f").unwrap();
    vfs.close(&out).unwrap();

    let err = vfs.delete("/keep/sub").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirNotEmpty);
    vfs.delete("/keep/sub/f").unwrap();
    vfs.delete("/keep/sub").unwrap();
    vfs.delete("/keep").unwrap();
    assert!(!vfs.exists("/keep"));
}

#[test]
fn error_slots_do_not_leak_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a"), b"contents").unwrap();

    let vfs = new_vfs();
    vfs.register_archiver(Arc::new(MemArchiver)).unwrap();
    vfs.mount(dir.path().to_str().unwrap(), None, true).unwrap();

    let reader = {
        let vfs = vfs.clone();
        std::thread::spawn(move || {
            for _ in 0..300 {
                let handle = vfs.open_read("/a").expect("open_read");
                let mut buf = [0u8; 16];
                assert_eq!(handle.read_bytes(&mut buf).unwrap(), 8);
                vfs.close(&handle).unwrap();
            }
            // Nothing this thread did failed, so its slot must be clean
            // no matter how many errors the other thread produced.
            assert_eq!(vfs.last_error_code(), None);
        })
    };

    let churner = {
        let vfs = vfs.clone();
        let pack = MemArchive::builder().file("other", b"x").build().manifest();
        std::thread::spawn(move || {
            let mut errors = 0;
            for _ in 0..300 {
                vfs.mount_io(
                    Box::new(MemIo::new(pack.clone())),
                    "churn.mem",
                    Some("/other"),
                    true,
                )
                .expect("mount");
                vfs.unmount("churn.mem").expect("unmount");
                // A deliberate failure each round lands in this thread's
                // slot only.
                assert!(vfs.unmount("churn.mem").is_err());
                if vfs.last_error_code() == Some(ErrorKind::NotMounted) {
                    errors += 1;
                }
            }
            assert_eq!(errors, 300);
        })
    };

    reader.join().unwrap();
    churner.join().unwrap();
}

#[test]
fn getting_an_error_code_clears_it_and_names_it() {
    let vfs = new_vfs();
    assert_eq!(vfs.last_error_code(), None);

    assert!(vfs.open_read("/nope").is_err());
    let code = vfs.last_error_code().unwrap();
    assert_eq!(code, ErrorKind::NotFound);
    assert_eq!(code.message(), "not found");
    assert_eq!(vfs.last_error_code(), None);

    vfs.set_error_code(ErrorKind::BadPassword);
    assert_eq!(vfs.last_error_code(), Some(ErrorKind::BadPassword));
}

#[test]
fn deinit_flushes_and_closes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap();

    let vfs = new_vfs();
    vfs.set_write_dir(Some(path)).unwrap();
    vfs.mount(path, None, true).unwrap();

    let out = vfs.open_write("/pending").unwrap();
    out.set_buffer(64).unwrap();
    out.write_bytes(b"buffered bytes").unwrap();
    // Not closed, not flushed: deinit must push this out.
    assert!(vfs.is_init());
    vfs.deinit().unwrap();
    assert!(!vfs.is_init());

    assert_eq!(
        std::fs::read(dir.path().join("pending")).unwrap(),
        b"buffered bytes"
    );
    assert_eq!(vfs.deinit().unwrap_err().kind(), ErrorKind::NotInitialized);
}
