//! Replace stage: swap a lesson's content for a fetched snapshot
//!
//! Every direct entry of the lesson root is removed except the infrastructure
//! entries, then the snapshot is copied in. Protected files are deleted here too;
//! the restore stage brings them back from the backup set.

use std::path::Path;

use super::Infrastructure;
use super::error::{PathFailure, ReplaceError};
use crate::fs::{self as vfs, FileSystem};

/// Replace all non-infrastructure content of `lesson_root` with `snapshot_root`
///
/// Work continues past individual failures so that as much of the snapshot as
/// possible lands; every failure is reported.
pub fn replace_content<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    snapshot_root: &Path,
    infra: &Infrastructure,
) -> Result<usize, ReplaceError> {
    let mut failures = Vec::new();

    match fs.list_dir(lesson_root) {
        Ok(children) => {
            for child in children {
                let reserved = child
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| infra.is_reserved(name));
                if reserved {
                    continue;
                }
                if let Err(e) = vfs::remove_entry(fs, &child) {
                    tracing::warn!("Could not remove {}: {}", child.display(), e);
                    failures.push(PathFailure::new(child, e));
                }
            }
        }
        Err(e) => failures.push(PathFailure::new(lesson_root, e)),
    }

    let entries = match fs.walk(snapshot_root) {
        Ok(entries) => entries,
        Err(e) => {
            failures.push(PathFailure::new(snapshot_root, e));
            return Err(ReplaceError { failures });
        }
    };

    let mut copied = 0;
    for entry in entries.iter().filter(|entry| !infra.contains(&entry.path)) {
        let from = snapshot_root.join(&entry.path);
        let to = lesson_root.join(&entry.path);
        match vfs::copy_entry(fs, entry.kind, &from, &to) {
            Ok(()) => copied += 1,
            Err(e) => {
                tracing::warn!("Could not copy {}: {}", entry.path.display(), e);
                failures.push(PathFailure::new(&entry.path, e));
            }
        }
    }

    if failures.is_empty() {
        tracing::debug!("Replaced lesson content with {} snapshot entries", copied);
        Ok(copied)
    } else {
        Err(ReplaceError { failures })
    }
}
