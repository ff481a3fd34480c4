use anyhow::Result;
use clap::Args;

use crate::cli::{Output, Workspace};

#[derive(Args)]
pub struct AddArgs {
    /// Upstream repository, optionally pinned with `#REF`
    pub upstream: String,

    /// Lesson number, e.g. `3_12` (module 3)
    pub number: String,

    /// Short lesson name used in the folder name
    pub name: String,

    /// One-line description for the catalog and info file
    #[arg(short, long, default_value = "")]
    pub description: String,
}

pub async fn execute(args: AddArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let Workspace {
        mut catalog,
        manager,
        ..
    } = Workspace::load(custom_config)?;

    output.info(&format!("Fetching {}...", args.upstream));
    let lesson = tokio::task::spawn_blocking(move || {
        manager.add_lesson(
            &mut catalog,
            &args.upstream,
            &args.number,
            &args.name,
            &args.description,
        )
    })
    .await??;

    output.success(&format!("Added lesson {}", lesson.folder));
    output.key_value("Module:", &lesson.module, false);
    output.key_value("Source:", &lesson.source_repo, false);
    output.key_value("Added:", &lesson.added_date, false);
    Ok(())
}
