//! Command-line interface for lessonsync
//!
//! Argument parsing with clap, one module per command under [`commands`], and
//! the styled [`Output`] helper every command prints through.

pub mod commands;
mod output;
mod workspace;

pub use commands::Cli;
pub use output::Output;
pub use workspace::Workspace;
