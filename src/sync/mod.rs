//! Lesson sync engine
//!
//! One sync walks a lesson through Backup → Fetch → Replace → Restore. Backup and
//! Fetch never touch live content, so a failure there leaves the folder exactly as
//! it was. Replace is the only non-atomic step; Restore always runs after it.

pub mod backup;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod replace;
pub mod restore;
pub mod rules;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use backup::BackupSet;
pub use error::SyncError;
pub use fetch::{Snapshot, SnapshotFetcher};
pub use manager::SyncManager;
pub use rules::PreservationRules;

/// Fixed entries at a lesson root that belong to the tool, not to content
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Infrastructure {
    /// Directory holding every backup set of the lesson
    pub backup_dir: String,
    /// Human-readable record of the lesson's upstream and sync dates
    pub info_file: String,
}

impl Default for Infrastructure {
    fn default() -> Self {
        Self {
            backup_dir: ".custom-changes".to_string(),
            info_file: "LESSON_INFO.md".to_string(),
        }
    }
}

impl Infrastructure {
    /// Is this direct entry of a lesson root reserved
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.backup_dir || name == self.info_file
    }

    /// Reserved when the first segment of a lesson-relative path is reserved
    pub fn contains(&self, relative: &Path) -> bool {
        relative
            .components()
            .next()
            .and_then(|first| first.as_os_str().to_str())
            .is_some_and(|first| self.is_reserved(first))
    }

    pub fn backup_root(&self, lesson_root: &Path) -> PathBuf {
        lesson_root.join(&self.backup_dir)
    }

    pub fn info_path(&self, lesson_root: &Path) -> PathBuf {
        lesson_root.join(&self.info_file)
    }
}

/// Where a lesson currently is in its sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    BackingUp,
    Fetching,
    Replacing,
    Restoring,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Idle => "idle",
            SyncStage::BackingUp => "backing-up",
            SyncStage::Fetching => "fetching",
            SyncStage::Replacing => "replacing",
            SyncStage::Restoring => "restoring",
        };
        f.write_str(name)
    }
}

/// How a lesson's sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Done,
    /// Aborted before live content was touched
    Failed,
    /// Replace or Restore went wrong; content may be mixed
    FailedPartial,
}

impl TerminalState {
    pub fn is_failure(self) -> bool {
        !matches!(self, TerminalState::Done)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminalState::Done => "Done",
            TerminalState::Failed => "Failed",
            TerminalState::FailedPartial => "Failed-Partial",
        };
        f.write_str(name)
    }
}

/// Outcome of one lesson's sync
#[derive(Debug)]
pub struct LessonReport {
    pub lesson: String,
    pub state: TerminalState,
    /// Backup set created by this attempt, if Backup got that far
    pub backup: Option<PathBuf>,
    /// Number of protected entries laid back down
    pub restored: usize,
    /// Everything that went wrong; non-empty for `Done` only when bookkeeping failed
    pub errors: Vec<SyncError>,
}

impl LessonReport {
    fn new(lesson: &str) -> Self {
        Self {
            lesson: lesson.to_string(),
            state: TerminalState::Done,
            backup: None,
            restored: 0,
            errors: Vec::new(),
        }
    }

    fn failed(mut self, error: impl Into<SyncError>) -> Self {
        let error = error.into();
        tracing::warn!("{}: sync failed: {}", self.lesson, error);
        self.state = TerminalState::Failed;
        self.errors.push(error);
        self
    }
}

/// Per-lesson outcomes of a bulk sync, in the order lessons were processed
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<LessonReport>,
}

impl BatchReport {
    pub fn states(&self) -> Vec<TerminalState> {
        self.reports.iter().map(|report| report.state).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|report| report.state.is_failure())
    }

    pub fn count(&self, state: TerminalState) -> usize {
        self.reports.iter().filter(|report| report.state == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_is_matched_by_first_segment_only() {
        let infra = Infrastructure::default();
        assert!(infra.contains(Path::new(".custom-changes/backup-1/a.txt")));
        assert!(infra.contains(Path::new("LESSON_INFO.md")));
        assert!(!infra.contains(Path::new("week1/LESSON_INFO.md")));
        assert!(!infra.contains(Path::new("notebook.ipynb")));
    }

    #[test]
    fn test_terminal_state_names() {
        assert_eq!(TerminalState::Done.to_string(), "Done");
        assert_eq!(TerminalState::FailedPartial.to_string(), "Failed-Partial");
        assert!(TerminalState::Failed.is_failure());
        assert!(!TerminalState::Done.is_failure());
    }
}
