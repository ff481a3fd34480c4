//! Configuration management for lessonsync
//!
//! Settings are layered with figment: embedded defaults, then the user config,
//! the repository config, an explicit `--config` file and finally `LESSONSYNC_`
//! environment variables.

pub mod core;
pub mod settings;

pub use core::{ConfigFormat, LessonSyncConfig};
pub use settings::Settings;
