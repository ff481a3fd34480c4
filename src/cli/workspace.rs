use anyhow::{Context, Result};

use crate::config::{LessonSyncConfig, Settings};
use crate::fs::LocalFs;
use crate::git::GitFetcher;
use crate::lessons::LessonCatalog;
use crate::sync::SyncManager;

/// Everything a lesson command needs: settings, the catalog and a ready manager
pub struct Workspace {
    pub settings: Settings,
    pub catalog: LessonCatalog,
    pub manager: SyncManager<LocalFs, GitFetcher>,
}

impl Workspace {
    /// Load configuration and catalog, and compile the preservation rules.
    ///
    /// A malformed rule fails here, before any lesson is touched.
    pub fn load(custom_config: Option<&str>) -> Result<Self> {
        let config = LessonSyncConfig::load(custom_config)?;
        let settings = config.settings()?;

        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let mut options = settings.sync_options();
        options.lessons_root = cwd.join(&options.lessons_root);
        options.catalog_path = cwd.join(&options.catalog_path);

        let fs = LocalFs::new();
        let catalog = LessonCatalog::load(&fs, &options.catalog_path).with_context(|| {
            format!("Failed to load lesson catalog {}", options.catalog_path.display())
        })?;
        let rules = settings
            .preservation_rules(&catalog)
            .context("Invalid preservation rules")?;
        tracing::debug!("Compiled {} preservation rules", rules.len());

        let fetcher = GitFetcher::new(settings.fetch_timeout(), settings.fetch.shallow);
        let manager = SyncManager::new(fs, fetcher, options, rules);

        Ok(Self {
            settings,
            catalog,
            manager,
        })
    }
}
