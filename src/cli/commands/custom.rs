use anyhow::Result;
use clap::Args;

use crate::cli::{Output, Workspace};

#[derive(Args)]
pub struct CustomArgs {
    /// Lesson to inspect; every lesson folder when omitted
    pub lesson: Option<String>,
}

pub async fn execute(args: CustomArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    let Workspace {
        mut catalog,
        manager,
        ..
    } = Workspace::load(custom_config)?;

    let lessons = match args.lesson {
        Some(lesson) => vec![lesson],
        None => manager.lesson_ids()?,
    };

    let mut total = 0;
    for lesson in &lessons {
        let entries = manager.protected_paths(&mut catalog, lesson)?;
        if entries.is_empty() {
            output.verbose(&format!("{lesson}: no custom changes"));
            continue;
        }
        output.section_header(lesson);
        for entry in &entries {
            let mut path = entry.path.display().to_string();
            if entry.kind.is_dir() {
                path.push('/');
            }
            output.list_item(&path);
        }
        total += entries.len();
    }

    if total == 0 {
        output.info("No custom changes found");
    } else {
        output.blank_line();
        output.summary_stats("Preserved entries:", total);
    }
    Ok(())
}
