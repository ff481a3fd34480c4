//! Filesystem capability used by every sync stage
//!
//! The stages never call `std::fs` directly. They go through [`FileSystem`] so the
//! same code runs against the real disk ([`LocalFs`]) and against the in-memory
//! double (`MemoryFs`, built for tests and the `test-util` feature) that injects
//! failures.

use std::io;
use std::path::{Path, PathBuf};

pub mod local;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use local::LocalFs;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{FailOp, MemoryFs};

/// Kind of a filesystem entry, read without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Dir)
    }
}

/// One entry found by a walk, with its path relative to the walk root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

pub trait FileSystem: Send + Sync {
    /// `None` when nothing exists at `path`
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;

    /// Direct children of a directory, sorted by name
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy a regular file, replacing an existing file at `to`
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recreate the symlink at `from` as a new link at `to`
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursive walk below `root` (root itself excluded), depth-first and sorted
    /// by name, never following symlinks
    fn walk(&self, root: &Path) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        walk_into(self, root, root, &mut entries)?;
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        matches!(self.kind(path), Ok(Some(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.kind(path), Ok(Some(EntryKind::Dir)))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn walk_into<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    dir: &Path,
    out: &mut Vec<Entry>,
) -> io::Result<()> {
    for child in fs.list_dir(dir)? {
        let Some(kind) = fs.kind(&child)? else {
            continue;
        };
        let relative = child
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| child.clone());
        out.push(Entry {
            path: relative,
            kind,
        });
        if kind.is_dir() {
            walk_into(fs, root, &child, out)?;
        }
    }
    Ok(())
}

/// Remove whatever sits at `path`, directory or not
pub fn remove_entry<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> io::Result<()> {
    match fs.kind(path)? {
        Some(EntryKind::Dir) => fs.remove_dir_all(path),
        Some(_) => fs.remove_file(path),
        None => Ok(()),
    }
}

/// Copy one entry of a given kind, creating parent directories as needed
pub fn copy_entry<F: FileSystem + ?Sized>(
    fs: &F,
    kind: EntryKind,
    from: &Path,
    to: &Path,
) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs.create_dir_all(parent)?;
    }
    match kind {
        EntryKind::Dir => fs.create_dir_all(to),
        EntryKind::File => fs.copy_file(from, to),
        EntryKind::Symlink => fs.copy_symlink(from, to),
    }
}
