//! Backup stage: capture every protected path before anything destructive runs
//!
//! Backups live at `<lesson>/<backup_dir>/backup-YYYYMMDD-HHMMSS[-N]/` and mirror
//! the relative layout of the protected paths. The stage only reads the lesson
//! content; the sole thing it creates is the new backup directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::Infrastructure;
use super::error::BackupError;
use super::rules::PreservationRules;
use crate::fs::{self as vfs, Entry, EntryKind, FileSystem};

const PREFIX: &str = "backup-";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = 15;

/// Protected entries captured at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    /// Absolute location of this set's directory
    pub root: PathBuf,
    /// Entries relative to both the lesson root and `root`, in walk order
    pub entries: Vec<Entry>,
}

impl BackupSet {
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild a set from a backup directory already on disk
    pub fn load<F: FileSystem + ?Sized>(fs: &F, root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            entries: fs.walk(root)?,
        })
    }
}

/// Ordering key of a backup directory name: timestamp, then collision counter
fn sort_key(name: &str) -> Option<(&str, u32)> {
    let rest = name.strip_prefix(PREFIX)?;
    let stamp = rest.get(..STAMP_LEN)?;
    match &rest[STAMP_LEN..] {
        "" => Some((stamp, 0)),
        suffix => suffix.strip_prefix('-')?.parse().ok().map(|n| (stamp, n)),
    }
}

/// Backup directory names under `backup_root`, oldest first
pub fn list_backups<F: FileSystem + ?Sized>(
    fs: &F,
    backup_root: &Path,
) -> std::io::Result<Vec<PathBuf>> {
    if !fs.is_dir(backup_root) {
        return Ok(Vec::new());
    }
    let mut backups: Vec<PathBuf> = fs
        .list_dir(backup_root)?
        .into_iter()
        .filter(|path| fs.is_dir(path))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(sort_key)
                .is_some()
        })
        .collect();
    backups.sort_by(|a, b| {
        let key = |path: &PathBuf| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(sort_key)
                .map(|(stamp, n)| (stamp.to_string(), n))
        };
        key(a).cmp(&key(b))
    });
    Ok(backups)
}

/// Pick a directory name for `now` that no earlier attempt has used
///
/// Counters only grow within one timestamp, so a pruned name is never handed out
/// again and name order stays creation order.
fn unique_backup_dir<F: FileSystem + ?Sized>(
    fs: &F,
    backup_root: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, BackupError> {
    let stamp = now.format(STAMP_FORMAT).to_string();
    let base = format!("{PREFIX}{stamp}");
    let highest = list_backups(fs, backup_root)
        .map_err(|source| BackupError::Walk {
            path: backup_root.to_path_buf(),
            source,
        })?
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .filter_map(|name| sort_key(name).filter(|(s, _)| *s == stamp).map(|(_, n)| n))
        .max();

    let mut counter = highest.map_or(0, |n| n + 1);
    loop {
        let candidate = match counter {
            0 => backup_root.join(&base),
            n => backup_root.join(format!("{base}-{n}")),
        };
        if !fs.exists(&candidate) {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Every protected entry of a lesson, in walk order, infrastructure excluded
pub fn collect_protected<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    rules: &PreservationRules,
    infra: &Infrastructure,
) -> Result<Vec<Entry>, BackupError> {
    let walk_error = |path: &Path, source| BackupError::Walk {
        path: path.to_path_buf(),
        source,
    };

    let mut protected = Vec::new();
    for top in fs
        .list_dir(lesson_root)
        .map_err(|e| walk_error(lesson_root, e))?
    {
        let Some(name) = top.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if infra.is_reserved(name) {
            continue;
        }
        let Some(kind) = fs.kind(&top).map_err(|e| walk_error(&top, e))? else {
            continue;
        };

        let mut candidates = vec![Entry {
            path: PathBuf::from(name),
            kind,
        }];
        if kind.is_dir() {
            candidates.extend(
                fs.walk(&top)
                    .map_err(|e| walk_error(&top, e))?
                    .into_iter()
                    .map(|entry| Entry {
                        path: Path::new(name).join(entry.path),
                        kind: entry.kind,
                    }),
            );
        }

        protected.extend(candidates.into_iter().filter(|entry| match entry.kind {
            EntryKind::Dir => rules.matches_dir(&entry.path),
            EntryKind::File | EntryKind::Symlink => rules.matches(&entry.path),
        }));
    }
    Ok(protected)
}

/// Copy every protected path of `lesson_root` into a fresh backup set
///
/// The backup directory exists before the first copy, so a lesson with nothing to
/// protect still yields an (empty) set. Any failed copy aborts the stage.
pub fn create_backup<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    rules: &PreservationRules,
    infra: &Infrastructure,
    now: DateTime<Utc>,
) -> Result<BackupSet, BackupError> {
    let backup_root = infra.backup_root(lesson_root);
    let root = unique_backup_dir(fs, &backup_root, now)?;
    fs.create_dir_all(&root).map_err(|source| BackupError::CreateDir {
        path: root.clone(),
        source,
    })?;
    tracing::debug!("Created backup directory {}", root.display());

    let entries = collect_protected(fs, lesson_root, rules, infra)?;
    for entry in &entries {
        let from = lesson_root.join(&entry.path);
        let to = root.join(&entry.path);
        vfs::copy_entry(fs, entry.kind, &from, &to).map_err(|source| BackupError::Copy {
            path: entry.path.clone(),
            source,
        })?;
        tracing::trace!("Backed up {}", entry.path.display());
    }

    tracing::info!(
        "Backed up {} protected entr{} to {}",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        root.display()
    );
    Ok(BackupSet { root, entries })
}

/// Directory of a lesson's newest backup set, or of the one called `name`
pub fn find_backup_dir<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    infra: &Infrastructure,
    name: Option<&str>,
) -> std::io::Result<Option<PathBuf>> {
    let backup_root = infra.backup_root(lesson_root);
    let chosen = match name {
        Some(name) => {
            let path = backup_root.join(name);
            fs.is_dir(&path).then_some(path)
        }
        None => list_backups(fs, &backup_root)?.pop(),
    };
    Ok(chosen)
}

/// Delete the oldest backup sets so that at most `keep` remain
pub fn prune_backups<F: FileSystem + ?Sized>(
    fs: &F,
    lesson_root: &Path,
    infra: &Infrastructure,
    keep: usize,
) -> std::io::Result<Vec<PathBuf>> {
    let backups = list_backups(fs, &infra.backup_root(lesson_root))?;
    let excess = backups.len().saturating_sub(keep);
    let doomed: Vec<PathBuf> = backups.into_iter().take(excess).collect();
    for path in &doomed {
        fs.remove_dir_all(path)?;
        tracing::debug!("Pruned old backup {}", path.display());
    }
    Ok(doomed)
}
