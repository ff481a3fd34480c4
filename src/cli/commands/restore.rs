use anyhow::Result;
use clap::Args;

use crate::cli::{Output, Workspace};

#[derive(Args)]
pub struct RestoreArgs {
    /// Lesson folder to restore into
    pub lesson: String,

    /// Backup set to restore instead of the newest one
    #[arg(short, long, value_name = "NAME")]
    pub backup: Option<String>,
}

pub async fn execute(args: RestoreArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let workspace = Workspace::load(custom_config)?;

    let (backup, restored) = workspace
        .manager
        .restore_latest(&args.lesson, args.backup.as_deref())?;

    output.success(&format!(
        "Restored {restored} entries from {} into {}",
        backup.name(),
        args.lesson
    ));
    for entry in &backup.entries {
        output.verbose(&entry.path.display().to_string());
    }
    Ok(())
}
