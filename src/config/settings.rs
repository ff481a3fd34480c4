//! Typed settings extracted from the merged configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::lessons::LessonCatalog;
use crate::sync::error::PatternConfigError;
use crate::sync::manager::SyncOptions;
use crate::sync::{Infrastructure, PreservationRules};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub lessons: LessonsSettings,
    pub sync: SyncSettings,
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonsSettings {
    /// Directory holding one folder per lesson
    pub root: PathBuf,
    /// Lesson catalog file
    pub metadata: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Preservation rules, merged with the catalog's own patterns
    pub preserve: Vec<String>,
    pub backup_dir: String,
    pub info_file: String,
    #[serde(default)]
    pub keep_backups: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub shallow: bool,
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("sync.backup_dir", &self.sync.backup_dir),
            ("sync.info_file", &self.sync.info_file),
        ] {
            if !is_plain_name(value) {
                bail!("{key} must be a single file name, got {value:?}");
            }
        }
        if self.sync.backup_dir == self.sync.info_file {
            bail!("sync.backup_dir and sync.info_file must differ");
        }
        if self.sync.keep_backups == Some(0) {
            bail!("sync.keep_backups must be at least 1 (leave it unset to keep every backup)");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs cannot be 0");
        }
        Ok(())
    }

    pub fn infrastructure(&self) -> Infrastructure {
        Infrastructure {
            backup_dir: self.sync.backup_dir.clone(),
            info_file: self.sync.info_file.clone(),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            lessons_root: self.lessons.root.clone(),
            catalog_path: self.lessons.metadata.clone(),
            infra: self.infrastructure(),
            keep_backups: self.sync.keep_backups,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Configured rules plus the catalog's, compiled once for the whole run
    pub fn preservation_rules(
        &self,
        catalog: &LessonCatalog,
    ) -> Result<PreservationRules, PatternConfigError> {
        PreservationRules::new(
            self.sync
                .preserve
                .iter()
                .chain(catalog.preservation_patterns.iter()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn settings() -> Settings {
        Settings {
            lessons: LessonsSettings {
                root: PathBuf::from("lessons"),
                metadata: PathBuf::from("lessons-metadata.json"),
            },
            sync: SyncSettings {
                preserve: vec!["*.local.*".to_string(), "my-*".to_string()],
                backup_dir: ".custom-changes".to_string(),
                info_file: "LESSON_INFO.md".to_string(),
                keep_backups: None,
            },
            fetch: FetchSettings {
                timeout_secs: 300,
                shallow: true,
            },
        }
    }

    #[test]
    fn test_rules_are_the_union_of_config_and_catalog() {
        let catalog = LessonCatalog {
            preservation_patterns: vec!["my-*".to_string(), "answers/".to_string()],
            ..LessonCatalog::default()
        };

        let rules = settings().preservation_rules(&catalog).unwrap();

        assert_eq!(rules.sources().collect::<Vec<_>>(), vec!["*.local.*", "my-*", "answers/"]);
        assert!(rules.matches(Path::new("answers/q1.py")));
    }

    #[test]
    fn test_bad_catalog_rule_is_a_pattern_error() {
        let catalog = LessonCatalog {
            preservation_patterns: vec!["**/*.md".to_string()],
            ..LessonCatalog::default()
        };

        let err = settings().preservation_rules(&catalog).unwrap_err();

        assert_eq!(err.rule, "**/*.md");
    }

    #[test]
    fn test_validation_rejects_unsafe_layout() {
        let mut nested = settings();
        nested.sync.backup_dir = "a/b".to_string();
        assert!(nested.validate().is_err());

        let mut clash = settings();
        clash.sync.info_file = ".custom-changes".to_string();
        assert!(clash.validate().is_err());

        let mut zero = settings();
        zero.sync.keep_backups = Some(0);
        assert!(zero.validate().is_err());

        assert!(settings().validate().is_ok());
    }
}
