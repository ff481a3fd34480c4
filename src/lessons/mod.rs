//! Lesson catalog (`lessons-metadata.json`)
//!
//! The catalog is the metadata record the sync engine reads upstream references
//! from and writes `last_synced` back to. Unknown fields are ignored and missing
//! ones take defaults, so hand-edited files keep loading.

pub mod info;

use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

/// Date format used for `added_date` and `last_synced`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Folder name under the lessons root; the lesson's identifier
    pub folder: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub source_repo: String,
    #[serde(default)]
    pub added_date: String,
    #[serde(default)]
    pub last_synced: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub has_custom_changes: bool,
}

impl Lesson {
    pub fn folder_name(number: &str, name: &str) -> String {
        format!("lesson{number}_{name}")
    }

    /// Module is the part of the lesson number before the first `_`
    pub fn module_of(number: &str) -> String {
        number.split('_').next().unwrap_or_default().to_string()
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCatalog {
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub preservation_patterns: Vec<String>,
}

impl Default for LessonCatalog {
    fn default() -> Self {
        Self {
            lessons: Vec::new(),
            last_updated: String::new(),
            version: default_version(),
            preservation_patterns: Vec::new(),
        }
    }
}

impl LessonCatalog {
    /// Load the catalog; a missing file is an empty catalog
    pub fn load<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> io::Result<Self> {
        if !fs.exists(path) {
            tracing::debug!("No catalog at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let bytes = fs.read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save<F: FileSystem + ?Sized>(&self, fs: &F, path: &Path) -> io::Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        fs.write(path, &bytes)
    }

    pub fn get(&self, folder: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|lesson| lesson.folder == folder)
    }

    pub fn get_mut(&mut self, folder: &str) -> Option<&mut Lesson> {
        self.lessons.iter_mut().find(|lesson| lesson.folder == folder)
    }

    pub fn in_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Lesson> + 'a {
        self.lessons.iter().filter(move |lesson| lesson.module == module)
    }

    /// Distinct module names, sorted
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self.lessons.iter().map(|lesson| lesson.module.as_str()).collect();
        modules.sort_unstable();
        modules.dedup();
        modules
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    }
}
