use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};

use super::backup::{self, BackupSet};
use super::error::SyncError;
use super::fetch::SnapshotFetcher;
use super::replace::replace_content;
use super::restore::{restore_backup, restore_from_dir};
use super::rules::PreservationRules;
use super::{BatchReport, Infrastructure, LessonReport, SyncStage, TerminalState};
use crate::fs::{Entry, FileSystem};
use crate::lessons::info::{self, InfoFields};
use crate::lessons::{DATE_FORMAT, Lesson, LessonCatalog};

/// Where lessons live and how their folders are laid out
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub lessons_root: PathBuf,
    pub catalog_path: PathBuf,
    pub infra: Infrastructure,
    /// Backup sets to keep per lesson after a successful sync; `None` keeps all
    pub keep_backups: Option<usize>,
}

/// Drives lessons through Backup → Fetch → Replace → Restore
pub struct SyncManager<F: FileSystem, S: SnapshotFetcher> {
    fs: F,
    fetcher: S,
    options: SyncOptions,
    rules: PreservationRules,
    clock: fn() -> DateTime<Utc>,
}

/// A lesson id is a single folder name under the lessons root
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

impl<F: FileSystem, S: SnapshotFetcher> SyncManager<F, S> {
    pub fn new(fs: F, fetcher: S, options: SyncOptions, rules: PreservationRules) -> Self {
        Self {
            fs,
            fetcher,
            options,
            rules,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn rules(&self) -> &PreservationRules {
        &self.rules
    }

    pub fn lesson_root(&self, id: &str) -> PathBuf {
        self.options.lessons_root.join(id)
    }

    fn existing_root(&self, id: &str) -> Option<PathBuf> {
        if !is_valid_id(id) {
            return None;
        }
        let root = self.lesson_root(id);
        self.fs.is_dir(&root).then_some(root)
    }

    /// Lesson folders in directory listing order
    pub fn lesson_ids(&self) -> Result<Vec<String>> {
        let root = &self.options.lessons_root;
        if !self.fs.is_dir(root) {
            return Ok(Vec::new());
        }
        let children = self
            .fs
            .list_dir(root)
            .with_context(|| format!("Failed to list lessons in {}", root.display()))?;
        Ok(children
            .into_iter()
            .filter(|path| self.fs.is_dir(path))
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .filter(|name| !name.starts_with('.'))
            .collect())
    }

    /// Upstream from the catalog, falling back to the lesson's info file
    fn upstream_of(&self, catalog: &LessonCatalog, id: &str, root: &Path) -> Option<String> {
        if let Some(lesson) = catalog.get(id) {
            if !lesson.source_repo.trim().is_empty() {
                return Some(lesson.source_repo.trim().to_string());
            }
        }
        let text = self
            .fs
            .read_to_string(&self.options.infra.info_path(root))
            .ok()?;
        info::source_repository(&text)
    }

    fn enter(&self, id: &str, stage: SyncStage) {
        tracing::debug!("{}: {}", id, stage);
    }

    /// Run one lesson through the full sync
    ///
    /// Never fails as a whole: every problem is folded into the report's terminal
    /// state and error list.
    pub fn sync_lesson(&self, catalog: &mut LessonCatalog, id: &str) -> LessonReport {
        let span = tracing::info_span!("sync", lesson = id);
        let _enter = span.enter();
        let infra = &self.options.infra;
        let mut report = LessonReport::new(id);
        self.enter(id, SyncStage::Idle);

        let Some(root) = self.existing_root(id) else {
            return report.failed(SyncError::LessonNotFound(id.to_string()));
        };
        let Some(upstream) = self.upstream_of(catalog, id, &root) else {
            return report.failed(SyncError::MissingUpstream(id.to_string()));
        };

        self.enter(id, SyncStage::BackingUp);
        let now = (self.clock)();
        let backup = match backup::create_backup(&self.fs, &root, &self.rules, infra, now) {
            Ok(backup) => backup,
            Err(e) => return report.failed(e),
        };
        report.backup = Some(backup.root.clone());

        self.enter(id, SyncStage::Fetching);
        let snapshot = match self.fetcher.fetch(&upstream) {
            Ok(snapshot) => snapshot,
            Err(e) => return report.failed(e),
        };

        self.enter(id, SyncStage::Replacing);
        if let Err(e) = replace_content(&self.fs, &root, snapshot.root(), infra) {
            tracing::warn!("{}: {}", id, e);
            report.state = TerminalState::FailedPartial;
            report.errors.push(e.into());
        }
        drop(snapshot);

        // Restore always runs once Replace has started
        self.enter(id, SyncStage::Restoring);
        match restore_backup(&self.fs, &root, &backup) {
            Ok(restored) => report.restored = restored,
            Err(e) => {
                tracing::warn!("{}: {}", id, e);
                report.state = TerminalState::FailedPartial;
                report.errors.push(e.into());
            }
        }

        if report.state == TerminalState::Done {
            self.record_success(catalog, id, &root, &backup, now, &mut report);
        }
        tracing::info!("{} → {}", id, report.state);
        report
    }

    /// Bookkeeping after a `Done` sync; failures here never change the state
    fn record_success(
        &self,
        catalog: &mut LessonCatalog,
        id: &str,
        root: &Path,
        backup: &BackupSet,
        now: DateTime<Utc>,
        report: &mut LessonReport,
    ) {
        let date = now.format(DATE_FORMAT).to_string();

        if let Some(lesson) = catalog.get_mut(id) {
            lesson.last_synced = date.clone();
            lesson.has_custom_changes = !backup.is_empty();
            catalog.touch(now);
            let path = &self.options.catalog_path;
            if let Err(source) = catalog.save(&self.fs, path) {
                report.errors.push(SyncError::Record {
                    path: path.clone(),
                    source,
                });
            }
        }

        let info_path = self.options.infra.info_path(root);
        if self.fs.exists(&info_path) {
            let updated = self
                .fs
                .read_to_string(&info_path)
                .map(|text| info::update_last_synced(&text, &date));
            let written = match updated {
                Ok(Some(text)) => self.fs.write(&info_path, text.as_bytes()),
                Ok(None) => {
                    tracing::debug!("{} has no Last Synced line", info_path.display());
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(source) = written {
                report.errors.push(SyncError::Record {
                    path: info_path,
                    source,
                });
            }
        }

        if let Some(keep) = self.options.keep_backups {
            if let Err(source) = backup::prune_backups(&self.fs, root, &self.options.infra, keep) {
                report.errors.push(SyncError::Record {
                    path: self.options.infra.backup_root(root),
                    source,
                });
            }
        }

        for error in &report.errors {
            tracing::warn!("{}: {}", id, error);
        }
    }

    /// Sync the given lessons one after another; no failure stops the batch
    pub fn sync_lessons<I>(&self, catalog: &mut LessonCatalog, ids: I) -> BatchReport
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let reports = ids
            .into_iter()
            .map(|id| self.sync_lesson(catalog, id.as_ref()))
            .collect();
        BatchReport { reports }
    }

    pub fn sync_all(&self, catalog: &mut LessonCatalog) -> Result<BatchReport> {
        let ids = self.lesson_ids()?;
        tracing::info!("Syncing {} lessons", ids.len());
        Ok(self.sync_lessons(catalog, ids))
    }

    /// Folders of a module in listing order, then catalog entries with no folder
    pub fn module_lesson_ids(&self, catalog: &LessonCatalog, module: &str) -> Result<Vec<String>> {
        let wanted: Vec<&str> = catalog
            .in_module(module)
            .map(|lesson| lesson.folder.as_str())
            .collect();
        let listed = self.lesson_ids()?;

        let mut ids: Vec<String> = listed
            .iter()
            .filter(|id| wanted.contains(&id.as_str()))
            .cloned()
            .collect();
        ids.extend(
            wanted
                .iter()
                .filter(|folder| !listed.iter().any(|id| id == **folder))
                .map(|folder| folder.to_string()),
        );
        Ok(ids)
    }

    pub fn sync_module(&self, catalog: &mut LessonCatalog, module: &str) -> Result<BatchReport> {
        let ids = self.module_lesson_ids(catalog, module)?;
        if ids.is_empty() {
            bail!("No lessons found in module {module}");
        }
        tracing::info!("Syncing {} lessons in module {}", ids.len(), module);
        Ok(self.sync_lessons(catalog, ids))
    }

    /// Fetch a new lesson into `lesson{number}_{name}` and register it
    pub fn add_lesson(
        &self,
        catalog: &mut LessonCatalog,
        upstream: &str,
        number: &str,
        name: &str,
        description: &str,
    ) -> Result<Lesson> {
        if number.trim().is_empty() || name.trim().is_empty() {
            bail!("Lesson number and name must not be empty");
        }
        let folder = Lesson::folder_name(number.trim(), name.trim());
        if !is_valid_id(&folder) {
            bail!("Invalid lesson folder name: {folder}");
        }
        let root = self.lesson_root(&folder);
        if self.fs.exists(&root) {
            bail!("Lesson folder {} already exists", root.display());
        }
        if catalog.get(&folder).is_some() {
            bail!("Lesson {folder} is already in the catalog");
        }

        let snapshot = self
            .fetcher
            .fetch(upstream)
            .with_context(|| format!("Failed to fetch {upstream}"))?;

        let infra = &self.options.infra;
        self.fs
            .create_dir_all(&infra.backup_root(&root))
            .with_context(|| format!("Failed to create {}", root.display()))?;
        replace_content(&self.fs, &root, snapshot.root(), infra)
            .with_context(|| format!("Failed to lay down {folder}"))?;

        let now = (self.clock)();
        let date = now.format(DATE_FORMAT).to_string();
        let text = info::render(
            &InfoFields {
                folder: &folder,
                number: number.trim(),
                source_repo: upstream,
                date: &date,
                description,
            },
            self.rules.sources(),
        );
        self.fs
            .write(&infra.info_path(&root), text.as_bytes())
            .context("Failed to write lesson info file")?;

        let lesson = Lesson {
            folder: folder.clone(),
            name: name.trim().to_string(),
            number: number.trim().to_string(),
            source_repo: upstream.to_string(),
            added_date: date.clone(),
            last_synced: date,
            description: description.to_string(),
            module: Lesson::module_of(number.trim()),
            has_custom_changes: false,
        };
        catalog.lessons.push(lesson.clone());
        catalog.touch(now);
        catalog
            .save(&self.fs, &self.options.catalog_path)
            .context("Failed to save lesson catalog")?;

        tracing::info!("Added lesson {} from {}", folder, upstream);
        Ok(lesson)
    }

    /// Everything a sync would back up right now; refreshes `has_custom_changes`
    pub fn protected_paths(&self, catalog: &mut LessonCatalog, id: &str) -> Result<Vec<Entry>> {
        let root = self
            .existing_root(id)
            .ok_or_else(|| anyhow!("Lesson {id} does not exist"))?;
        let entries = backup::collect_protected(&self.fs, &root, &self.rules, &self.options.infra)?;

        if let Some(lesson) = catalog.get_mut(id) {
            let custom = !entries.is_empty();
            if lesson.has_custom_changes != custom {
                lesson.has_custom_changes = custom;
                catalog
                    .save(&self.fs, &self.options.catalog_path)
                    .context("Failed to save lesson catalog")?;
            }
        }
        Ok(entries)
    }

    /// Lay the newest (or the named) backup set back into a lesson
    pub fn restore_latest(&self, id: &str, name: Option<&str>) -> Result<(BackupSet, usize)> {
        let root = self
            .existing_root(id)
            .ok_or_else(|| anyhow!("Lesson {id} does not exist"))?;
        if name.is_some_and(|name| !is_valid_id(name)) {
            bail!("Invalid backup name");
        }
        let dir = backup::find_backup_dir(&self.fs, &root, &self.options.infra, name)
            .context("Failed to read backups")?
            .ok_or_else(|| match name {
                Some(name) => anyhow!("Backup {name} not found for {id}"),
                None => anyhow!("No backups found for {id}"),
            })?;
        let (backup, restored) = restore_from_dir(&self.fs, &root, &dir)?;
        tracing::info!("Restored {} entries of {} into {}", restored, backup.name(), id);
        Ok((backup, restored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{EntryKind, FailOp, MemoryFs};
    use crate::sync::error::FetchError;
    use crate::sync::fetch::Snapshot;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LESSONS: &str = "/work/lessons";
    const CATALOG: &str = "/work/lessons-metadata.json";

    /// Serves upstreams from a table by writing snapshots into the shared tree
    struct TableFetcher {
        fs: MemoryFs,
        upstreams: HashMap<String, Vec<(&'static str, &'static str)>>,
        fetched: AtomicUsize,
    }

    impl TableFetcher {
        fn new(fs: &MemoryFs) -> Self {
            Self {
                fs: fs.clone(),
                upstreams: HashMap::new(),
                fetched: AtomicUsize::new(0),
            }
        }

        fn serve(mut self, upstream: &str, files: &[(&'static str, &'static str)]) -> Self {
            self.upstreams.insert(upstream.to_string(), files.to_vec());
            self
        }
    }

    impl SnapshotFetcher for TableFetcher {
        fn fetch(&self, upstream: &str) -> Result<Snapshot, FetchError> {
            let files = self.upstreams.get(upstream).ok_or_else(|| FetchError::Unreachable {
                reference: upstream.to_string(),
                message: "no such repository".to_string(),
            })?;
            let n = self.fetched.fetch_add(1, Ordering::SeqCst);
            let root = PathBuf::from(format!("/snapshots/{n}"));
            self.fs.add_dir(&root);
            for (path, body) in files {
                self.fs.add_file(root.join(path), body);
            }
            Ok(Snapshot::at(root))
        }
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 1).unwrap()
    }

    fn options() -> SyncOptions {
        SyncOptions {
            lessons_root: PathBuf::from(LESSONS),
            catalog_path: PathBuf::from(CATALOG),
            infra: Infrastructure::default(),
            keep_backups: None,
        }
    }

    fn manager(fs: &MemoryFs, fetcher: TableFetcher, rules: &[&str]) -> SyncManager<MemoryFs, TableFetcher> {
        SyncManager::new(fs.clone(), fetcher, options(), PreservationRules::new(rules).unwrap())
            .with_clock(fixed_clock)
    }

    fn catalog_with(entries: &[(&str, &str, &str)]) -> LessonCatalog {
        LessonCatalog {
            lessons: entries
                .iter()
                .map(|(folder, upstream, module)| Lesson {
                    folder: folder.to_string(),
                    source_repo: upstream.to_string(),
                    module: module.to_string(),
                    last_synced: "2025-01-01".to_string(),
                    ..Lesson::default()
                })
                .collect(),
            ..LessonCatalog::default()
        }
    }

    fn lesson(id: &str) -> String {
        format!("{LESSONS}/{id}")
    }

    /// Lesson content with the backup directory left out
    fn content(fs: &MemoryFs, id: &str) -> Vec<(PathBuf, EntryKind, Option<Vec<u8>>)> {
        fs.tree(lesson(id))
            .into_iter()
            .filter(|(path, _, _)| !path.starts_with(".custom-changes"))
            .collect()
    }

    #[test]
    fn test_local_copy_survives_while_original_is_refreshed() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        fs.add_file(format!("{}/notebook.local.ipynb", lesson("lesson1_1")), "mine");
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &["*.local.*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::Done, "{:?}", report.errors);
        assert_eq!(report.restored, 1);
        assert_eq!(fs.contents(format!("{}/notebook.ipynb", lesson("lesson1_1"))), Some(b"new".to_vec()));
        assert_eq!(
            fs.contents(format!("{}/notebook.local.ipynb", lesson("lesson1_1"))),
            Some(b"mine".to_vec())
        );
    }

    #[test]
    fn test_directory_matched_by_name_rule_survives_with_contents() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        fs.add_file(format!("{}/my-project/work.py", lesson("lesson1_1")), "mine");
        fs.add_file(format!("{}/my-project/data/run.csv", lesson("lesson1_1")), "1,2");
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &["my-*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::Done, "{:?}", report.errors);
        assert_eq!(report.restored, 4);
        assert_eq!(fs.contents(format!("{}/notebook.ipynb", lesson("lesson1_1"))), Some(b"new".to_vec()));
        assert_eq!(
            fs.contents(format!("{}/my-project/work.py", lesson("lesson1_1"))),
            Some(b"mine".to_vec())
        );
        assert_eq!(
            fs.contents(format!("{}/my-project/data/run.csv", lesson("lesson1_1"))),
            Some(b"1,2".to_vec())
        );
        assert!(catalog.get("lesson1_1").unwrap().has_custom_changes);
    }

    #[test]
    fn test_failed_fetch_in_a_batch_leaves_that_lesson_untouched() {
        let fs = MemoryFs::new();
        for id in ["lesson1_1", "lesson1_2", "lesson1_3"] {
            fs.add_file(format!("{}/notebook.ipynb", lesson(id)), "old");
            fs.add_file(format!("{}/my-notes.md", lesson(id)), "notes");
        }
        let fetcher = TableFetcher::new(&fs)
            .serve("up/1", &[("notebook.ipynb", "new")])
            .serve("up/3", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &["my-*"]);
        let mut catalog = catalog_with(&[
            ("lesson1_1", "up/1", "1"),
            ("lesson1_2", "up/missing", "1"),
            ("lesson1_3", "up/3", "1"),
        ]);
        let before = content(&fs, "lesson1_2");

        let batch = manager.sync_all(&mut catalog).unwrap();

        assert_eq!(
            batch.states(),
            vec![TerminalState::Done, TerminalState::Failed, TerminalState::Done]
        );
        assert!(batch.has_failures());
        assert_eq!(content(&fs, "lesson1_2"), before);
        assert!(matches!(batch.reports[1].errors[0], SyncError::Fetch(FetchError::Unreachable { .. })));
        assert_eq!(catalog.get("lesson1_2").unwrap().last_synced, "2025-01-01");
    }

    #[test]
    fn test_second_sync_of_unchanged_upstream_changes_nothing() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        fs.add_file(format!("{}/custom-work/answer.py", lesson("lesson1_1")), "print(42)");
        let fetcher = TableFetcher::new(&fs)
            .serve("up/1", &[("notebook.ipynb", "new"), ("data/a.csv", "1,2")]);
        let manager = manager(&fs, fetcher, &["custom-*/"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        assert_eq!(manager.sync_lesson(&mut catalog, "lesson1_1").state, TerminalState::Done);
        let first = content(&fs, "lesson1_1");
        assert_eq!(manager.sync_lesson(&mut catalog, "lesson1_1").state, TerminalState::Done);

        assert_eq!(content(&fs, "lesson1_1"), first);
        assert_eq!(
            fs.contents(format!("{}/custom-work/answer.py", lesson("lesson1_1"))),
            Some(b"print(42)".to_vec())
        );
    }

    #[test]
    fn test_blocked_delete_ends_failed_partial_with_protected_files_restored() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/locked.txt", lesson("lesson1_1")), "locked");
        fs.add_file(format!("{}/my-notes.md", lesson("lesson1_1")), "notes");
        fs.fail_on(FailOp::Remove, format!("{}/locked.txt", lesson("lesson1_1")));
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("my-notes.md", "upstream notes")]);
        let manager = manager(&fs, fetcher, &["my-*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::FailedPartial);
        assert!(matches!(report.errors[0], SyncError::Replace(_)));
        assert_eq!(fs.contents(format!("{}/my-notes.md", lesson("lesson1_1"))), Some(b"notes".to_vec()));
        assert_eq!(catalog.get("lesson1_1").unwrap().last_synced, "2025-01-01");
    }

    #[test]
    fn test_backup_failure_aborts_before_any_change() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        fs.add_file(format!("{}/my-notes.md", lesson("lesson1_1")), "notes");
        fs.fail_on(FailOp::Read, format!("{}/my-notes.md", lesson("lesson1_1")));
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &["my-*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);
        let before = content(&fs, "lesson1_1");

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::Failed);
        assert!(matches!(report.errors[0], SyncError::Backup(_)));
        assert_eq!(content(&fs, "lesson1_1"), before);
        assert_eq!(manager.fetcher.fetched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_done_records_sync_date_in_catalog_and_info_file() {
        let fs = MemoryFs::new();
        let root = lesson("lesson1_1");
        fs.add_file(format!("{root}/notebook.local.ipynb"), "mine");
        fs.add_file(
            format!("{root}/LESSON_INFO.md"),
            "# lesson1_1\n- **Source Repository**: up/1\n- **Last Synced**: 2025-01-01\n",
        );
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &["*.local.*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::Done);
        assert!(report.errors.is_empty());
        let saved = LessonCatalog::load(&fs, Path::new(CATALOG)).unwrap();
        let entry = saved.get("lesson1_1").unwrap();
        assert_eq!(entry.last_synced, "2025-03-14");
        assert!(entry.has_custom_changes);
        assert_eq!(saved.last_updated, "2025-03-14T09:26:01Z");
        assert_eq!(
            fs.contents(format!("{root}/LESSON_INFO.md")),
            Some(b"# lesson1_1\n- **Source Repository**: up/1\n- **Last Synced**: 2025-03-14\n".to_vec())
        );
    }

    #[test]
    fn test_info_file_supplies_upstream_for_uncatalogued_lessons() {
        let fs = MemoryFs::new();
        fs.add_file(
            format!("{}/LESSON_INFO.md", lesson("lesson9_1")),
            "- **Source Repository**: up/9\n",
        );
        let fetcher = TableFetcher::new(&fs).serve("up/9", &[("README.md", "hi")]);
        let manager = manager(&fs, fetcher, &[]);
        let mut catalog = LessonCatalog::default();

        let report = manager.sync_lesson(&mut catalog, "lesson9_1");

        assert_eq!(report.state, TerminalState::Done);
        assert_eq!(fs.contents(format!("{}/README.md", lesson("lesson9_1"))), Some(b"hi".to_vec()));
        assert!(!fs.exists(Path::new(CATALOG)));
    }

    #[test]
    fn test_missing_upstream_fails_without_a_backup() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        let manager = manager(&fs, TableFetcher::new(&fs), &["*.local.*"]);
        let mut catalog = LessonCatalog::default();

        let report = manager.sync_lesson(&mut catalog, "lesson1_1");

        assert_eq!(report.state, TerminalState::Failed);
        assert!(matches!(report.errors[0], SyncError::MissingUpstream(_)));
        assert!(report.backup.is_none());
        assert!(!fs.exists(Path::new(&format!("{}/.custom-changes", lesson("lesson1_1")))));
    }

    #[test]
    fn test_unknown_or_escaping_lesson_ids_are_not_found() {
        let fs = MemoryFs::new();
        fs.add_dir(LESSONS);
        let manager = manager(&fs, TableFetcher::new(&fs), &[]);
        let mut catalog = LessonCatalog::default();

        for id in ["lesson404", "..", "../lessons", ""] {
            let report = manager.sync_lesson(&mut catalog, id);
            assert_eq!(report.state, TerminalState::Failed);
            assert!(matches!(report.errors[0], SyncError::LessonNotFound(_)));
        }
    }

    #[test]
    fn test_module_batch_follows_listing_order_and_reports_missing_folders() {
        let fs = MemoryFs::new();
        for id in ["lesson2_2", "lesson2_1", "lesson3_1"] {
            fs.add_file(format!("{}/notebook.ipynb", lesson(id)), "old");
        }
        let fetcher = TableFetcher::new(&fs).serve("up/x", &[("notebook.ipynb", "new")]);
        let manager = manager(&fs, fetcher, &[]);
        let mut catalog = catalog_with(&[
            ("lesson2_2", "up/x", "2"),
            ("lesson2_9", "up/x", "2"),
            ("lesson2_1", "up/x", "2"),
            ("lesson3_1", "up/x", "3"),
        ]);

        let batch = manager.sync_module(&mut catalog, "2").unwrap();

        let order: Vec<_> = batch.reports.iter().map(|r| r.lesson.as_str()).collect();
        assert_eq!(order, vec!["lesson2_1", "lesson2_2", "lesson2_9"]);
        assert_eq!(
            batch.states(),
            vec![TerminalState::Done, TerminalState::Done, TerminalState::Failed]
        );
        assert_eq!(fs.contents(format!("{}/notebook.ipynb", lesson("lesson3_1"))), Some(b"old".to_vec()));
        assert!(manager.sync_module(&mut catalog, "7").is_err());
    }

    #[test]
    fn test_retention_prunes_old_backup_sets() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/my-notes.md", lesson("lesson1_1")), "notes");
        let fetcher = TableFetcher::new(&fs).serve("up/1", &[("notebook.ipynb", "new")]);
        let mut options = options();
        options.keep_backups = Some(1);
        let manager = SyncManager::new(fs.clone(), fetcher, options, PreservationRules::new(["my-*"]).unwrap())
            .with_clock(fixed_clock);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        for _ in 0..3 {
            assert_eq!(manager.sync_lesson(&mut catalog, "lesson1_1").state, TerminalState::Done);
        }

        let backups = fs.list_dir(Path::new(&format!("{}/.custom-changes", lesson("lesson1_1")))).unwrap();
        assert_eq!(
            backups,
            vec![PathBuf::from(format!("{}/.custom-changes/backup-20250314-092601-2", lesson("lesson1_1")))]
        );
    }

    #[test]
    fn test_add_lesson_lays_down_content_and_registers_it() {
        let fs = MemoryFs::new();
        fs.add_dir(LESSONS);
        let fetcher = TableFetcher::new(&fs).serve("up/new", &[("notebook.ipynb", "{}")]);
        let manager = manager(&fs, fetcher, &["*.local.*"]);
        let mut catalog = LessonCatalog::default();

        let added = manager
            .add_lesson(&mut catalog, "up/new", "4_2", "pandas", "Dataframes")
            .unwrap();

        assert_eq!(added.folder, "lesson4_2_pandas");
        assert_eq!(added.module, "4");
        assert_eq!(added.added_date, "2025-03-14");
        let root = lesson("lesson4_2_pandas");
        assert_eq!(fs.contents(format!("{root}/notebook.ipynb")), Some(b"{}".to_vec()));
        assert!(fs.is_dir(Path::new(&format!("{root}/.custom-changes"))));
        let info_text = fs.read_to_string(Path::new(&format!("{root}/LESSON_INFO.md"))).unwrap();
        assert_eq!(info::source_repository(&info_text).as_deref(), Some("up/new"));
        let saved = LessonCatalog::load(&fs, Path::new(CATALOG)).unwrap();
        assert_eq!(saved.lessons, vec![added]);

        let again = manager.add_lesson(&mut catalog, "up/new", "4_2", "pandas", "");
        assert!(again.is_err());
    }

    #[test]
    fn test_protected_paths_refresh_custom_flag() {
        let fs = MemoryFs::new();
        fs.add_file(format!("{}/notebook.ipynb", lesson("lesson1_1")), "old");
        fs.add_file(format!("{}/week1/my-notes.md", lesson("lesson1_1")), "notes");
        let manager = manager(&fs, TableFetcher::new(&fs), &["my-*"]);
        let mut catalog = catalog_with(&[("lesson1_1", "up/1", "1")]);

        let entries = manager.protected_paths(&mut catalog, "lesson1_1").unwrap();

        let paths: Vec<_> = entries.iter().map(|entry| entry.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("week1/my-notes.md")]);
        assert!(catalog.get("lesson1_1").unwrap().has_custom_changes);
        assert!(LessonCatalog::load(&fs, Path::new(CATALOG)).unwrap().lessons[0].has_custom_changes);
    }

    #[test]
    fn test_restore_latest_brings_back_deleted_work() {
        let fs = MemoryFs::new();
        let root = lesson("lesson1_1");
        fs.add_file(format!("{root}/.custom-changes/backup-20250101-000000/my-notes.md"), "old notes");
        fs.add_file(format!("{root}/.custom-changes/backup-20250314-092601/my-notes.md"), "notes");
        let manager = manager(&fs, TableFetcher::new(&fs), &["my-*"]);

        let (backup, restored) = manager.restore_latest("lesson1_1", None).unwrap();
        assert_eq!(backup.name(), "backup-20250314-092601");
        assert_eq!(restored, 1);
        assert_eq!(fs.contents(format!("{root}/my-notes.md")), Some(b"notes".to_vec()));

        manager
            .restore_latest("lesson1_1", Some("backup-20250101-000000"))
            .unwrap();
        assert_eq!(fs.contents(format!("{root}/my-notes.md")), Some(b"old notes".to_vec()));

        assert!(manager.restore_latest("lesson1_1", Some("backup-missing")).is_err());
        assert!(manager.restore_latest("lesson1_1", Some("../..")).is_err());
    }
}
