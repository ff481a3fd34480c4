//! Snapshot fetcher seam
//!
//! The orchestrator only needs "give me a clean copy of this upstream". The git
//! implementation lives in [`crate::git::remote`]; tests plug in their own.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::error::FetchError;

/// A clean copy of upstream content, staged outside the lesson folder
///
/// When the snapshot owns its staging directory, dropping it deletes the copy.
#[derive(Debug)]
pub struct Snapshot {
    root: PathBuf,
    _staging: Option<TempDir>,
}

impl Snapshot {
    /// A snapshot at `root` inside a staging directory it now owns
    pub fn staged(root: PathBuf, staging: TempDir) -> Self {
        Self {
            root,
            _staging: Some(staging),
        }
    }

    /// A snapshot at `root` whose lifetime is managed elsewhere
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _staging: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub trait SnapshotFetcher: Send + Sync {
    /// Fetch `upstream` into a fresh directory. Never retried by the caller.
    fn fetch(&self, upstream: &str) -> Result<Snapshot, FetchError>;
}
