//! In-memory directory index for archive back-ends.
//!
//! A back-end that parses its container up front stores the listing in a
//! [`DirTree`]: full path to entry, parent/child structure derived from the
//! paths, and an arbitrary payload per entry (data offsets, inline bytes,
//! whatever the format needs). Adding an entry fills in any missing
//! ancestor directories; adding a path whose ancestor is a plain file means
//! the container is broken.

use crate::archiver::{EnumerateCallback, EnumerateStatus};
use crate::error::{ErrorKind, VfsError, VfsResult};
use std::collections::HashMap;

pub type EntryId = usize;

const ROOT: EntryId = 0;

#[derive(Debug)]
struct Entry<T> {
    /// Full path within the archive, sanitized interior form. The root's
    /// name is empty.
    name: String,
    is_dir: bool,
    children: Vec<EntryId>,
    payload: T,
}

#[derive(Debug)]
pub struct DirTree<T> {
    entries: Vec<Entry<T>>,
    index: HashMap<String, EntryId>,
}

impl<T: Default> DirTree<T> {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                name: String::new(),
                is_dir: true,
                children: Vec::new(),
                payload: T::default(),
            }],
            index: HashMap::new(),
        }
    }

    /// Insert `name` (and any missing ancestors, as directories). Returns
    /// the existing entry unchanged if the path is already present.
    pub fn add(&mut self, name: &str, is_dir: bool) -> VfsResult<EntryId> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }

        let parent = match name.rfind('/') {
            Some(sep) => {
                let ancestor = &name[..sep];
                match self.find(ancestor) {
                    Some(id) => {
                        if !self.entries[id].is_dir {
                            return Err(VfsError::new(ErrorKind::Corrupt, "tree.add"));
                        }
                        id
                    }
                    None => {
                        let ancestor = ancestor.to_owned();
                        self.add(&ancestor, true)?
                    }
                }
            }
            None => ROOT,
        };

        let id = self.entries.len();
        self.entries.push(Entry {
            name: name.to_owned(),
            is_dir,
            children: Vec::new(),
            payload: T::default(),
        });
        self.index.insert(name.to_owned(), id);
        self.entries[parent].children.push(id);
        Ok(id)
    }

    /// Look up a full path. The empty path is the root.
    pub fn find(&self, path: &str) -> Option<EntryId> {
        if path.is_empty() {
            return Some(ROOT);
        }
        self.index.get(path).copied()
    }

    pub fn is_dir(&self, id: EntryId) -> bool {
        self.entries[id].is_dir
    }

    pub fn name(&self, id: EntryId) -> &str {
        &self.entries[id].name
    }

    pub fn payload(&self, id: EntryId) -> &T {
        &self.entries[id].payload
    }

    pub fn payload_mut(&mut self, id: EntryId) -> &mut T {
        &mut self.entries[id].payload
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Invoke `cb` once per immediate child of `dname`, passing the child's
    /// trailing path segment.
    pub fn enumerate(
        &self,
        dname: &str,
        origdir: &str,
        cb: &mut EnumerateCallback<'_>,
    ) -> VfsResult<EnumerateStatus> {
        let dir = self
            .find(dname)
            .ok_or_else(|| VfsError::new(ErrorKind::NotFound, "tree.enumerate"))?;
        for &child in &self.entries[dir].children {
            let name = &self.entries[child].name;
            let segment = match name.rfind('/') {
                Some(sep) => &name[sep + 1..],
                None => name.as_str(),
            };
            match cb(origdir, segment) {
                EnumerateStatus::Continue => {}
                EnumerateStatus::Stop => return Ok(EnumerateStatus::Stop),
                EnumerateStatus::Abort => {
                    return Err(VfsError::new(ErrorKind::AppCallback, "tree.enumerate"))
                }
            }
        }
        Ok(EnumerateStatus::Continue)
    }
}

impl<T: Default> Default for DirTree<T> {
    fn default() -> Self {
        Self::new()
    }
}
