//! Error taxonomy for the sync stages
//!
//! Every stage reports through its own type so the orchestrator can decide which
//! terminal state a failure maps to. None of these escape a lesson's sync: the
//! manager folds them into its [`LessonReport`](super::LessonReport).

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single path that could not be processed
#[derive(Debug, Error)]
#[error("{}: {source}", .path.display())]
pub struct PathFailure {
    pub path: PathBuf,
    pub source: io::Error,
}

impl PathFailure {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

fn summarize<T: fmt::Display>(failures: &[T]) -> String {
    match failures {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

fn entries(count: usize) -> &'static str {
    if count == 1 { "entry" } else { "entries" }
}

/// A preservation rule that cannot be compiled
#[derive(Debug, Error)]
#[error("invalid preservation rule `{rule}`: {reason}")]
pub struct PatternConfigError {
    pub rule: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("could not create backup directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("could not enumerate {}: {source}", .path.display())]
    Walk { path: PathBuf, source: io::Error },

    #[error("could not back up {}: {source}", .path.display())]
    Copy { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("malformed upstream reference `{reference}`: {reason}")]
    Malformed { reference: String, reason: String },

    #[error("upstream `{reference}` is unreachable: {message}")]
    Unreachable { reference: String, message: String },

    #[error("fetching `{reference}` timed out after {}s", .after.as_secs())]
    Timeout { reference: String, after: Duration },

    #[error("upstream `{reference}` produced an empty snapshot")]
    Empty { reference: String },

    #[error("could not stage snapshot of `{reference}`: {source}")]
    Io { reference: String, source: io::Error },
}

/// Replace stopped part-way; the lesson folder may hold a mix of old and new content
#[derive(Debug, Error)]
#[error("{} {} could not be replaced: {}", .failures.len(), entries(.failures.len()), summarize(.failures))]
pub struct ReplaceError {
    pub failures: Vec<PathFailure>,
}

#[derive(Debug, Error)]
pub enum RestoreFailure {
    /// Something of a different kind now occupies the path
    #[error("{}: occupied by a {found}", .path.display())]
    Collision { path: PathBuf, found: &'static str },

    #[error(transparent)]
    Io(PathFailure),
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("could not read backup {}: {source}", .path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("{} backed-up {} could not be restored: {}", .failures.len(), entries(.failures.len()), summarize(.failures))]
    Incomplete { failures: Vec<RestoreFailure> },
}

/// Anything that ends a lesson's sync short of `Done`
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("lesson `{0}` does not exist")]
    LessonNotFound(String),

    #[error("no upstream reference recorded for lesson `{0}`")]
    MissingUpstream(String),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    /// Content is in place but the bookkeeping afterwards failed
    #[error("could not record sync in {}: {source}", .path.display())]
    Record { path: PathBuf, source: io::Error },
}
