//! # lessonsync
//!
//! Keeps course lesson folders in step with their upstream git repositories
//! while preserving the files students changed locally.
//!
//! Every sync runs one lesson through four stages:
//!
//! 1. **Backup** copies everything matching the preservation rules into a
//!    timestamped `backup-*` directory inside the lesson.
//! 2. **Fetch** clones a fresh snapshot of the upstream.
//! 3. **Replace** swaps the lesson content for the snapshot.
//! 4. **Restore** lays the backed-up files back down on top.
//!
//! ```bash
//! lessonsync add https://github.com/org/pandas-intro.git 3_12 pandas
//! lessonsync sync lesson3_12_pandas
//! lessonsync sync --all
//! ```

pub mod cli;
pub mod config;
pub mod fs;
pub mod git;
pub mod lessons;
pub mod sync;

pub use cli::{Cli, Output};
pub use config::LessonSyncConfig;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
