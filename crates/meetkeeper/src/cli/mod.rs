//! Command-line interface for meetkeeper.
//!
//! This module provides the CLI structure for the `meetkeeper` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, MeetingArg, MeetingCommand, NotesCommand, NotesFormat, StatusCommand,
    TasksCommand, ThemeCommand,
};

/// meetkeeper - Meeting notes that keep themselves saved
///
/// Keeps meetings, agendas, Markdown notes and tasks in a local database,
/// saving notes continuously and suggesting action items from them.
#[derive(Debug, Parser)]
#[command(name = "meetkeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, list and select meetings
    #[command(subcommand)]
    Meeting(MeetingCommand),

    /// Show, import or watch meeting notes
    #[command(subcommand)]
    Notes(NotesCommand),

    /// Manage tasks and suggestions
    #[command(subcommand)]
    Tasks(TasksCommand),

    /// Show or set the display theme
    Theme(ThemeCommand),

    /// Show store and configuration status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
