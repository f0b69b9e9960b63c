//! Wire form of a [`MemArchive`](crate::MemArchive).
//!
//! Line-based, after a magic first line:
//!
//! ```text
//! STRATA-MEM-1
//! d <path>
//! l <path> <target>
//! f <path> <len>
//! <len raw bytes>
//! ```
//!
//! Paths are in sanitized interior form and may not contain spaces; a
//! file's raw bytes are followed by one newline. Anything that deviates is
//! `Corrupt` — the magic line alone decides whether the content is ours.

use crate::{MemArchive, MemPayload};
use std::sync::Arc;
use strata_core::{sanitize, DirTree, ErrorKind, VfsError, VfsResult};

pub const MAGIC: &[u8] = b"STRATA-MEM-1\n";

pub(crate) fn recognizes(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

fn corrupt() -> VfsError {
    VfsError::new(ErrorKind::Corrupt, "mem.manifest")
}

pub(crate) fn serialize(tree: &DirTree<MemPayload>) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    for id in 1..tree.len() {
        let name = tree.name(id);
        let payload = tree.payload(id);
        if let Some(target) = payload.link.as_deref() {
            out.extend_from_slice(format!("l {name} {target}\n").as_bytes());
        } else if tree.is_dir(id) {
            out.extend_from_slice(format!("d {name}\n").as_bytes());
        } else {
            let data = payload.data.as_deref().unwrap_or(&[]);
            out.extend_from_slice(format!("f {name} {}\n", data.len()).as_bytes());
            out.extend_from_slice(data);
            out.push(b'\n');
        }
    }
    out
}

fn checked_path(raw: &str) -> VfsResult<String> {
    let clean = sanitize(raw).map_err(|_| corrupt())?;
    if clean.is_empty() {
        return Err(corrupt());
    }
    Ok(clean)
}

pub(crate) fn parse(bytes: &[u8]) -> VfsResult<MemArchive> {
    debug_assert!(recognizes(bytes));
    let mut tree: DirTree<MemPayload> = DirTree::new();
    let mut pos = MAGIC.len();

    while pos < bytes.len() {
        let line_end = bytes[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| pos + i)
            .ok_or_else(corrupt)?;
        let line = std::str::from_utf8(&bytes[pos..line_end]).map_err(|_| corrupt())?;
        pos = line_end + 1;
        if line.is_empty() {
            continue;
        }

        let (tag, rest) = line.split_once(' ').ok_or_else(corrupt)?;
        match tag {
            "d" => {
                tree.add(&checked_path(rest)?, true).map_err(|_| corrupt())?;
            }
            "l" => {
                let (path, target) = rest.split_once(' ').ok_or_else(corrupt)?;
                let id = tree
                    .add(&checked_path(path)?, false)
                    .map_err(|_| corrupt())?;
                tree.payload_mut(id).link = Some(target.to_owned());
            }
            "f" => {
                let (path, len) = rest.rsplit_once(' ').ok_or_else(corrupt)?;
                let len: usize = len.parse().map_err(|_| corrupt())?;
                let end = pos.checked_add(len).ok_or_else(corrupt)?;
                if end >= bytes.len() {
                    return Err(corrupt());
                }
                let data = &bytes[pos..end];
                // Trailing newline after the payload.
                if bytes[end] != b'\n' {
                    return Err(corrupt());
                }
                pos = end + 1;
                let id = tree
                    .add(&checked_path(path)?, false)
                    .map_err(|_| corrupt())?;
                tree.payload_mut(id).data = Some(Arc::from(data));
            }
            _ => return Err(corrupt()),
        }
    }

    Ok(MemArchive {
        tree,
        source: std::sync::Mutex::new(None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_gates_recognition() {
        assert!(recognizes(MAGIC));
        assert!(recognizes(b"STRATA-MEM-1\nd data\n"));
        assert!(!recognizes(b"STRATA-MEM-2\n"));
        assert!(!recognizes(b"PK\x03\x04"));
    }

    #[test]
    fn rejects_traversal_in_entry_paths() {
        let bad = b"STRATA-MEM-1\nd ../escape\n";
        assert_eq!(parse(bad).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn rejects_unknown_tags_and_bad_lengths() {
        assert_eq!(
            parse(b"STRATA-MEM-1\nx what\n").unwrap_err().kind(),
            ErrorKind::Corrupt
        );
        assert_eq!(
            parse(b"STRATA-MEM-1\nf a 9999\nshort\n").unwrap_err().kind(),
            ErrorKind::Corrupt
        );
    }

    #[test]
    fn payload_bytes_may_contain_newlines() {
        use strata_core::Archive;

        let manifest = b"STRATA-MEM-1\nf a 3\n\n\n\n\n";
        let archive = parse(manifest).unwrap();
        let mut io = archive.open_read("a").unwrap();
        let mut buf = [0u8; 8];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\n\n\n");
    }
}
