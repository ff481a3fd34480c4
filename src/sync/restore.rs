//! Restore stage: lay a backup set back over the freshly replaced content
//!
//! Backed-up files win over upstream files at the same path. A path now occupied
//! by something of a different kind (a directory where a file was, or the other
//! way round) is reported as a collision and left alone.

use std::path::Path;

use super::backup::BackupSet;
use super::error::{PathFailure, RestoreError, RestoreFailure};
use crate::fs::{EntryKind, FileSystem};

fn describe(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Dir => "directory",
        EntryKind::Symlink => "symlink",
    }
}

fn restore_one<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    backup_root: &Path,
    relative: &Path,
    kind: EntryKind,
) -> Result<(), RestoreFailure> {
    let io_failure = |e| RestoreFailure::Io(PathFailure::new(relative, e));
    let target = lesson_root.join(relative);
    let occupant = fs.kind(&target).map_err(io_failure)?;

    match (kind, occupant) {
        (EntryKind::Dir, None) => fs.create_dir_all(&target).map_err(io_failure),
        (EntryKind::Dir, Some(EntryKind::Dir)) => Ok(()),
        (EntryKind::Dir, Some(found)) | (_, Some(found @ EntryKind::Dir)) => {
            Err(RestoreFailure::Collision {
                path: relative.to_path_buf(),
                found: describe(found),
            })
        }
        (kind, _) => {
            if let Some(parent) = target.parent() {
                fs.create_dir_all(parent).map_err(io_failure)?;
            }
            let source = backup_root.join(relative);
            let copied = match kind {
                EntryKind::Symlink => fs.copy_symlink(&source, &target),
                _ => fs.copy_file(&source, &target),
            };
            copied.map_err(io_failure)
        }
    }
}

/// Copy every entry of `backup` into `lesson_root`, returning how many landed
pub fn restore_backup<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    backup: &BackupSet,
) -> Result<usize, RestoreError> {
    let mut restored = 0;
    let mut failures = Vec::new();

    for entry in &backup.entries {
        match restore_one(fs, lesson_root, &backup.root, &entry.path, entry.kind) {
            Ok(()) => {
                tracing::trace!("Restored {}", entry.path.display());
                restored += 1;
            }
            Err(failure) => {
                tracing::warn!("Could not restore {}", failure);
                failures.push(failure);
            }
        }
    }

    if failures.is_empty() {
        tracing::debug!("Restored {} entries from {}", restored, backup.name());
        Ok(restored)
    } else {
        Err(RestoreError::Incomplete { failures })
    }
}

/// Restore from a backup directory on disk, returning the set that was read
pub fn restore_from_dir<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    backup_root: &Path,
) -> Result<(BackupSet, usize), RestoreError> {
    let backup = BackupSet::load(fs, backup_root).map_err(|source| RestoreError::Unreadable {
        path: backup_root.to_path_buf(),
        source,
    })?;
    let restored = restore_backup(fs, lesson_root, &backup)?;
    Ok((backup, restored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Entry, FailOp, MemoryFs};
    use std::path::PathBuf;

    const ROOT: &str = "/lessons/lesson3_1";
    const BACKUP: &str = "/lessons/lesson3_1/.custom-changes/backup-20250314-092601";

    fn backup_of(fs: &MemoryFs) -> BackupSet {
        BackupSet::load(fs, Path::new(BACKUP)).unwrap()
    }

    #[test]
    fn test_backed_up_file_wins_over_upstream_copy() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{BACKUP}/my-notes.md"), "mine");
        fs.add_file(format!("{ROOT}/my-notes.md"), "upstream");

        let restored = restore_backup(&fs, Path::new(ROOT), &backup_of(&fs)).unwrap();

        assert_eq!(restored, 1);
        assert_eq!(fs.contents(format!("{ROOT}/my-notes.md")), Some(b"mine".to_vec()));
    }

    #[test]
    fn test_missing_parent_directories_are_recreated() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{BACKUP}/custom-scripts/deep/run.sh"), "#!/bin/sh");
        fs.add_dir(ROOT);

        let restored = restore_backup(&fs, Path::new(ROOT), &backup_of(&fs)).unwrap();

        assert_eq!(restored, 3);
        assert_eq!(
            fs.contents(format!("{ROOT}/custom-scripts/deep/run.sh")),
            Some(b"#!/bin/sh".to_vec())
        );
    }

    #[test]
    fn test_directory_in_the_way_is_a_collision_and_left_alone() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{BACKUP}/my-notes.md"), "mine");
        fs.add_file(format!("{BACKUP}/notebook.local.ipynb"), "local");
        fs.add_file(format!("{ROOT}/my-notes.md/README.md"), "upstream dir");

        let err = restore_backup(&fs, Path::new(ROOT), &backup_of(&fs)).unwrap_err();

        let RestoreError::Incomplete { failures } = err else {
            panic!("expected an incomplete restore");
        };
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            RestoreFailure::Collision { path, found: "directory" } if path == &PathBuf::from("my-notes.md")
        ));
        assert_eq!(
            fs.contents(format!("{ROOT}/my-notes.md/README.md")),
            Some(b"upstream dir".to_vec())
        );
        assert_eq!(fs.contents(format!("{ROOT}/notebook.local.ipynb")), Some(b"local".to_vec()));
    }

    #[test]
    fn test_file_in_the_way_of_a_directory_is_a_collision() {
        let fs = MemoryFs::new();
        fs.add_dir(BACKUP);
        fs.add_file(format!("{ROOT}/custom-data"), "upstream file");
        let backup = BackupSet {
            root: PathBuf::from(BACKUP),
            entries: vec![Entry {
                path: PathBuf::from("custom-data"),
                kind: EntryKind::Dir,
            }],
        };

        let err = restore_backup(&fs, Path::new(ROOT), &backup).unwrap_err();

        assert_eq!(
            err.to_string(),
            "1 backed-up entry could not be restored: custom-data: occupied by a file"
        );
        assert_eq!(fs.contents(format!("{ROOT}/custom-data")), Some(b"upstream file".to_vec()));
    }

    #[test]
    fn test_symlinks_come_back_as_symlinks() {
        let fs = MemoryFs::new();
        fs.add_symlink(format!("{BACKUP}/my-link"), "notebook.ipynb");
        fs.add_file(format!("{ROOT}/my-link"), "upstream");

        restore_backup(&fs, Path::new(ROOT), &backup_of(&fs)).unwrap();

        assert_eq!(
            fs.kind(Path::new(&format!("{ROOT}/my-link"))).unwrap(),
            Some(EntryKind::Symlink)
        );
    }

    #[test]
    fn test_io_failures_are_collected_and_the_rest_restored() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{BACKUP}/a-notes.md"), "a");
        fs.add_file(format!("{BACKUP}/b-notes.md"), "b");
        fs.add_dir(ROOT);
        fs.fail_on(FailOp::Write, format!("{ROOT}/a-notes.md"));

        let err = restore_backup(&fs, Path::new(ROOT), &backup_of(&fs)).unwrap_err();

        assert!(matches!(err, RestoreError::Incomplete { ref failures } if failures.len() == 1));
        assert_eq!(fs.contents(format!("{ROOT}/b-notes.md")), Some(b"b".to_vec()));
    }

    #[test]
    fn test_restore_from_dir_reads_the_set_from_disk() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{BACKUP}/my-notes.md"), "mine");
        fs.add_dir(ROOT);

        let (backup, restored) = restore_from_dir(&fs, Path::new(ROOT), Path::new(BACKUP)).unwrap();

        assert_eq!(backup.name(), "backup-20250314-092601");
        assert_eq!(restored, 1);
        assert_eq!(fs.contents(format!("{ROOT}/my-notes.md")), Some(b"mine".to_vec()));
    }

    #[test]
    fn test_unreadable_backup_directory() {
        let fs = MemoryFs::new();
        fs.add_dir(ROOT);

        let err = restore_from_dir(&fs, Path::new(ROOT), Path::new(BACKUP)).unwrap_err();

        assert!(matches!(err, RestoreError::Unreadable { .. }));
    }
}
