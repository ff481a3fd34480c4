use anyhow::{Result, bail};
use clap::{ArgGroup, Args};

use crate::cli::{Output, Workspace};
use crate::sync::TerminalState;

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["lessons", "module", "all"])))]
pub struct SyncArgs {
    /// Lesson folders to sync
    pub lessons: Vec<String>,

    /// Sync every lesson of a module
    #[arg(short, long)]
    pub module: Option<String>,

    /// Sync every lesson folder
    #[arg(short, long)]
    pub all: bool,
}

pub async fn execute(args: SyncArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let workspace = Workspace::load(custom_config)?;

    // git2 and the filesystem calls block, keep them off the runtime thread
    let report = tokio::task::spawn_blocking(move || {
        let Workspace {
            mut catalog,
            manager,
            ..
        } = workspace;
        if args.all {
            manager.sync_all(&mut catalog)
        } else if let Some(module) = &args.module {
            manager.sync_module(&mut catalog, module)
        } else {
            Ok(manager.sync_lessons(&mut catalog, args.lessons.iter()))
        }
    })
    .await??;

    for lesson in &report.reports {
        output.lesson_state(&lesson.lesson, lesson.state);
        for error in &lesson.errors {
            output.indent(&error.to_string());
        }
        if let Some(backup) = &lesson.backup {
            output.verbose(&format!(
                "Backup {} ({} entries restored)",
                backup.display(),
                lesson.restored
            ));
        }
    }

    let total = report.reports.len();
    let failed = total - report.count(TerminalState::Done);
    if report.has_failures() {
        bail!("{failed} of {total} lessons failed to sync");
    }
    output.success(&format!("Synced {total} lessons"));
    Ok(())
}
