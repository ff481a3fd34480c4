use anyhow::Result;
use clap::Args;

use crate::cli::{Output, Workspace};
use crate::lessons::Lesson;

#[derive(Args)]
pub struct ListArgs {
    /// Only list lessons of this module
    #[arg(short, long)]
    pub module: Option<String>,
}

fn describe(lesson: &Lesson, on_disk: bool) -> String {
    let mut line = lesson.folder.clone();
    if !lesson.last_synced.is_empty() {
        line.push_str(&format!(" (synced {})", lesson.last_synced));
    }
    if lesson.has_custom_changes {
        line.push_str(" [custom]");
    }
    if !on_disk {
        line.push_str(" [missing]");
    }
    line
}

pub async fn execute(args: ListArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let workspace = Workspace::load(custom_config)?;
    let catalog = &workspace.catalog;
    let folders = workspace.manager.lesson_ids()?;

    let modules: Vec<&str> = match &args.module {
        Some(module) => vec![module.as_str()],
        None => catalog.modules(),
    };

    let mut shown = 0;
    for module in modules {
        let lessons: Vec<&Lesson> = catalog.in_module(module).collect();
        if lessons.is_empty() {
            continue;
        }
        output.section_header(&format!("Module {module}"));
        for lesson in lessons {
            output.list_item(&describe(lesson, folders.contains(&lesson.folder)));
            if !lesson.description.is_empty() {
                output.indent(&lesson.description);
            }
            shown += 1;
        }
    }

    if args.module.is_none() {
        let untracked: Vec<&String> = folders
            .iter()
            .filter(|folder| catalog.get(folder).is_none())
            .collect();
        if !untracked.is_empty() {
            output.section_header("Not in catalog");
            for folder in untracked {
                output.list_item(folder);
            }
        }
    }

    if shown == 0 {
        output.info("No lessons found");
    }
    Ok(())
}
