//! In-memory filesystem double
//!
//! Clones share the same tree, so a test can hand one handle to the sync engine and
//! keep another to inspect or seed content. Individual operations can be made to
//! fail for a given path with [`MemoryFs::fail_on`].

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{EntryKind, FileSystem};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(PathBuf),
}

impl Node {
    fn kind(&self) -> EntryKind {
        match self {
            Node::File(_) => EntryKind::File,
            Node::Dir => EntryKind::Dir,
            Node::Symlink(_) => EntryKind::Symlink,
        }
    }
}

/// Operation class used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    Read,
    Write,
    Remove,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    failures: HashSet<(FailOp, PathBuf)>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<State>>,
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            _ => {}
        }
    }
    out
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

fn injected(op: FailOp, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("injected {op:?} failure at {}", path.display()),
    )
}

impl State {
    fn check(&self, op: FailOp, path: &Path) -> io::Result<()> {
        if self.failures.contains(&(op, path.to_path_buf())) {
            return Err(injected(op, path));
        }
        Ok(())
    }

    fn ensure_dirs(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            match self.nodes.get(ancestor) {
                Some(Node::Dir) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("{} is not a directory", ancestor.display()),
                    ));
                }
                None => {
                    self.check(FailOp::Write, ancestor)?;
                    self.nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn require_parent_dir(&self, path: &Path) -> io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match self.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", parent.display()),
            )),
            None => Err(not_found(parent)),
        }
    }

    fn put(&mut self, path: &Path, node: Node) -> io::Result<()> {
        self.check(FailOp::Write, path)?;
        self.require_parent_dir(path)?;
        if let Some(Node::Dir) = self.nodes.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        self.nodes.insert(path.to_path_buf(), node);
        Ok(())
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic in another test thread must not hide this tree
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a file with its parent directories
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = normalize(path.as_ref());
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            let _ = state.ensure_dirs(parent);
        }
        state
            .nodes
            .insert(path, Node::File(contents.as_ref().to_vec()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        let _ = self.lock().ensure_dirs(&path);
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            let _ = state.ensure_dirs(parent);
        }
        state
            .nodes
            .insert(path, Node::Symlink(target.as_ref().to_path_buf()));
    }

    /// Make every `op` on exactly `path` fail with `PermissionDenied`
    pub fn fail_on(&self, op: FailOp, path: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        self.lock().failures.insert((op, path));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// File contents, or `None` when `path` is not a regular file
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize(path.as_ref())) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Every entry below `root` as `(relative path, kind, file bytes)`
    pub fn tree(&self, root: impl AsRef<Path>) -> Vec<(PathBuf, EntryKind, Option<Vec<u8>>)> {
        let root = normalize(root.as_ref());
        self.lock()
            .nodes
            .iter()
            .filter(|(path, _)| path.starts_with(&root) && **path != root)
            .map(|(path, node)| {
                let relative = path.strip_prefix(&root).unwrap_or(path).to_path_buf();
                let bytes = match node {
                    Node::File(bytes) => Some(bytes.clone()),
                    _ => None,
                };
                (relative, node.kind(), bytes)
            })
            .collect()
    }
}

impl FileSystem for MemoryFs {
    fn kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        Ok(self.lock().nodes.get(&normalize(path)).map(Node::kind))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = normalize(path);
        let state = self.lock();
        state.check(FailOp::Read, &path)?;
        match state.nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", path.display()),
                ));
            }
            None => return Err(not_found(&path)),
        }
        Ok(state
            .nodes
            .keys()
            .filter(|candidate| candidate.parent() == Some(path.as_path()))
            .cloned()
            .collect())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = normalize(path);
        let state = self.lock();
        state.check(FailOp::Read, &path)?;
        match state.nodes.get(&path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let path = normalize(path);
        self.lock().put(&path, Node::File(contents.to_vec()))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        self.lock().ensure_dirs(&path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut state = self.lock();
        state.check(FailOp::Remove, &path)?;
        match state.nodes.get(&path) {
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            )),
            Some(_) => {
                state.nodes.remove(&path);
                Ok(())
            }
            None => Err(not_found(&path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut state = self.lock();
        if !state.nodes.contains_key(&path) {
            return Err(not_found(&path));
        }
        let doomed: Vec<PathBuf> = state
            .nodes
            .keys()
            .filter(|candidate| candidate.starts_with(&path))
            .cloned()
            .collect();
        for candidate in &doomed {
            state.check(FailOp::Remove, candidate)?;
        }
        for candidate in doomed {
            state.nodes.remove(&candidate);
        }
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let bytes = self.read(from)?;
        let to = normalize(to);
        let mut state = self.lock();
        if let Some(Node::Symlink(_)) = state.nodes.get(&to) {
            state.nodes.remove(&to);
        }
        state.put(&to, Node::File(bytes))
    }

    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut state = self.lock();
        state.check(FailOp::Read, &from)?;
        let target = match state.nodes.get(&from) {
            Some(Node::Symlink(target)) => target.clone(),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a symlink", from.display()),
                ));
            }
            None => return Err(not_found(&from)),
        };
        state.put(&to, Node::Symlink(target))
    }
}
