use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::{Output, Workspace};
use crate::config::{ConfigFormat, LessonSyncConfig};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Display current merged configuration
    Show {
        /// Output format: json, toml, yaml
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Validate the configuration and the catalog's preservation rules
    Validate,
}

pub async fn execute(args: ConfigArgs, custom_config: Option<&str>, output: &Output) -> Result<()> {
    match args.command {
        ConfigCommand::Show { format } => {
            let format = ConfigFormat::parse(&format)?;
            let config = LessonSyncConfig::load(custom_config)?;
            println!("{}", config.export_config(format)?);
        }
        ConfigCommand::Validate => {
            let workspace = Workspace::load(custom_config)?;
            let settings = &workspace.settings;
            output.success("Configuration is valid");
            output.key_value("Lessons root:", &settings.lessons.root.display().to_string(), false);
            output.key_value("Catalog:", &settings.lessons.metadata.display().to_string(), false);
            output.key_value(
                "Preservation rules:",
                &workspace.manager.rules().len().to_string(),
                true,
            );
            output.key_value(
                "Catalogued lessons:",
                &workspace.catalog.lessons.len().to_string(),
                false,
            );
        }
    }
    Ok(())
}
