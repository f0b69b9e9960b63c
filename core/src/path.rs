//! Virtual-path sanitizer and mount-point prefix predicates.
//!
//! The sanitizer is the only layer that enforces path safety; everything
//! downstream (mount scans, archive back-ends) trusts its output. The
//! canonical interior form has no leading, trailing or doubled `/`, and the
//! empty string is the root.

use crate::error::{ErrorKind, VfsError, VfsResult};

/// Normalize a caller-supplied virtual path to canonical interior form.
///
/// Rules, in one left-to-right pass:
/// - leading `/` characters are stripped;
/// - `:` and `\` are rejected anywhere;
/// - runs of `/` collapse to a single boundary and a trailing `/` is
///   dropped, so `"foo/"` and `"foo"` canonicalize identically;
/// - the segments `.` and `..` are rejected, as is an input that is
///   entirely `.` or `..`;
/// - the empty string survives as the canonical root.
pub fn sanitize(input: &str) -> VfsResult<String> {
    let src = input.trim_start_matches('/');
    if src == "." || src == ".." {
        return Err(VfsError::new(ErrorKind::BadFilename, "path.sanitize"));
    }

    let mut out = String::with_capacity(src.len());
    for segment in src.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(VfsError::new(ErrorKind::BadFilename, "path.sanitize"));
        }
        if segment.bytes().any(|b| b == b':' || b == b'\\') {
            return Err(VfsError::new(ErrorKind::BadFilename, "path.sanitize"));
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    Ok(out)
}

/// Strip a mount point off a sanitized path.
///
/// `mount_point` is the stored form: `None` for a root mount, otherwise a
/// sanitized interior path with a trailing `/`. Returns the
/// archive-relative suffix when `fname` lies under the mount point, `None`
/// otherwise. The suffix for the mount point itself is `""`.
pub(crate) fn archive_relative<'a>(mount_point: Option<&str>, fname: &'a str) -> Option<&'a str> {
    let Some(mp) = mount_point else {
        return Some(fname);
    };
    let trimmed = &mp[..mp.len() - 1];
    if fname == trimmed {
        return Some("");
    }
    fname
        .strip_prefix(trimmed)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Is `fname` a proper interior segment of this mount point?
///
/// True iff `fname` is a strict prefix of the mount point ending on a
/// segment boundary (the root counts). A complete match is *not* interior.
/// Used to synthesize virtual directory entries for deeply nested mount
/// points.
pub(crate) fn part_of_mount_point(mount_point: Option<&str>, fname: &str) -> bool {
    let Some(mp) = mount_point else {
        return false;
    };
    if fname.is_empty() {
        return true;
    }
    let trimmed = &mp[..mp.len() - 1];
    fname.len() < trimmed.len()
        && trimmed.as_bytes()[fname.len()] == b'/'
        && trimmed.starts_with(fname)
}

/// End offsets of every `/`-separated prefix of a non-empty sanitized
/// path, the full length last. `"a/b/c"` yields `[1, 3, 5]`.
pub(crate) fn segment_ends(path: &str) -> smallvec::SmallVec<[usize; 16]> {
    let mut ends: smallvec::SmallVec<[usize; 16]> = smallvec::SmallVec::new();
    for (i, byte) in path.bytes().enumerate() {
        if byte == b'/' {
            ends.push(i);
        }
    }
    ends.push(path.len());
    ends
}

/// The next path segment of `mount_point` after the interior prefix
/// `fname`. Callers must have established `part_of_mount_point` first.
pub(crate) fn next_mount_segment<'a>(mount_point: &'a str, fname: &str) -> &'a str {
    let start = if fname.is_empty() { 0 } else { fname.len() + 1 };
    let rest = &mount_point[start..];
    match rest.find('/') {
        Some(end) => &rest[..end],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(input: &str) -> String {
        sanitize(input).unwrap()
    }

    fn bad(input: &str) {
        let err = sanitize(input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadFilename, "input: {input:?}");
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(ok("/a//b/"), "a/b");
        assert_eq!(ok("/"), "");
        assert_eq!(ok(""), "");
        assert_eq!(ok("///"), "");
        assert_eq!(ok("foo/"), "foo");
        assert_eq!(ok("foo"), "foo");
        assert_eq!(ok("/deep/nested///tree/"), "deep/nested/tree");
    }

    #[test]
    fn idempotent() {
        for input in ["/a//b/", "x/y/z", "", "/", "assets///pack"] {
            let once = ok(input);
            assert_eq!(ok(&once), once);
        }
    }

    #[test]
    fn rejects_dot_segments() {
        bad(".");
        bad("..");
        bad("/..");
        bad("a/./b");
        bad("a/../b");
        bad("a/..");
        bad("../a");
    }

    #[test]
    fn rejects_illegal_bytes() {
        bad("c:/windows");
        bad("a\\b");
        bad("a/b:c");
    }

    #[test]
    fn relative_paths() {
        assert_eq!(archive_relative(None, "a/b"), Some("a/b"));
        assert_eq!(archive_relative(None, ""), Some(""));
        assert_eq!(archive_relative(Some("a/b/"), "a/b"), Some(""));
        assert_eq!(archive_relative(Some("a/b/"), "a/b/c"), Some("c"));
        assert_eq!(archive_relative(Some("a/b/"), "a/bc"), None);
        assert_eq!(archive_relative(Some("a/b/"), "a"), None);
        assert_eq!(archive_relative(Some("a/b/"), ""), None);
    }

    #[test]
    fn interior_segments() {
        assert!(!part_of_mount_point(None, "a"));
        assert!(part_of_mount_point(Some("a/b/c/"), ""));
        assert!(part_of_mount_point(Some("a/b/c/"), "a"));
        assert!(part_of_mount_point(Some("a/b/c/"), "a/b"));
        assert!(!part_of_mount_point(Some("a/b/c/"), "a/b/c"));
        assert!(!part_of_mount_point(Some("a/b/c/"), "a/b/c/d"));
        assert!(!part_of_mount_point(Some("a/b/c/"), "a/bc"));
    }

    #[test]
    fn synthesized_segments() {
        assert_eq!(next_mount_segment("a/b/c/", ""), "a");
        assert_eq!(next_mount_segment("a/b/c/", "a"), "b");
        assert_eq!(next_mount_segment("a/b/c/", "a/b"), "c");
        assert_eq!(next_mount_segment("assets/", ""), "assets");
    }
}
