use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use super::Output;

pub mod add;
pub mod config;
pub mod custom;
pub mod list;
pub mod restore;
pub mod sync;
pub mod version;

#[derive(Parser)]
#[command(
    name = "lessonsync",
    version = crate::VERSION,
    about = "Sync course lessons from upstream repositories without losing student work",
    long_about = "lessonsync refreshes lesson folders from their upstream git repositories. \
                  Files matching the preservation rules are backed up before every sync \
                  and laid back down afterwards."
)]
pub struct Cli {
    /// Run as if started in <DIR> instead of current working directory
    #[arg(short = 'C', long = "directory", global = true)]
    pub directory: Option<String>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync lessons from their upstream repositories
    Sync(sync::SyncArgs),
    /// Fetch a new lesson and add it to the catalog
    Add(add::AddArgs),
    /// List catalogued lessons
    List(list::ListArgs),
    /// Show the files a sync would preserve
    Custom(custom::CustomArgs),
    /// Restore a lesson's newest (or a named) backup
    Restore(restore::RestoreArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Show version information
    Version(version::VersionArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Change directory if specified
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        setup_logging(self.verbose, self.quiet);

        let output = Output::new(self.verbose > 0, self.quiet);
        let config = self.config.as_deref();

        match self.command {
            Some(Commands::Sync(args)) => sync::execute(args, config, &output).await,
            Some(Commands::Add(args)) => add::execute(args, config, &output).await,
            Some(Commands::List(args)) => list::execute(args, config, &output).await,
            Some(Commands::Custom(args)) => custom::execute(args, config, &output).await,
            Some(Commands::Restore(args)) => restore::execute(args, config, &output).await,
            Some(Commands::Config(args)) => config::execute(args, config, &output).await,
            Some(Commands::Version(args)) => version::execute(args).await,
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info,globset=warn"),
            2 => tracing_subscriber::EnvFilter::new("debug,globset=warn"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
