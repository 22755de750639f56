//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::meeting::Theme;

/// Selects the meeting a command applies to.
#[derive(Debug, Clone, Default, Args)]
pub struct MeetingArg {
    /// Meeting id or unique id prefix (defaults to the current meeting)
    #[arg(short, long, value_name = "ID")]
    pub meeting: Option<String>,
}

/// Meeting management commands.
#[derive(Debug, Subcommand)]
pub enum MeetingCommand {
    /// Create a meeting and make it current
    New {
        /// Meeting title
        title: String,

        /// Agenda item (repeatable)
        #[arg(short, long = "agenda", value_name = "ITEM")]
        agenda: Vec<String>,

        /// Don't make the new meeting current
        #[arg(long)]
        no_select: bool,
    },

    /// List meetings, newest first
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a meeting with its agenda and tasks
    Show {
        #[command(flatten)]
        target: MeetingArg,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Make a meeting current
    Use {
        /// Meeting id or unique id prefix
        id: String,
    },

    /// Delete a meeting with its notes and tasks
    Delete {
        /// Meeting id or unique id prefix
        id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or replace a meeting's agenda
    Agenda {
        /// New agenda items; prints the agenda when omitted
        items: Vec<String>,

        #[command(flatten)]
        target: MeetingArg,
    },
}

/// Notes commands.
#[derive(Debug, Subcommand)]
pub enum NotesCommand {
    /// Print a meeting's notes
    Show {
        #[command(flatten)]
        target: MeetingArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: NotesFormat,
    },

    /// Save a Markdown file as a meeting's notes
    Import {
        /// Markdown file to read
        file: PathBuf,

        #[command(flatten)]
        target: MeetingArg,
    },

    /// Keep a meeting's notes in sync with a Markdown file until Ctrl-C
    Watch {
        /// Markdown file to watch
        file: PathBuf,

        #[command(flatten)]
        target: MeetingArg,
    },
}

/// Task commands.
#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// List a meeting's tasks
    List {
        #[command(flatten)]
        target: MeetingArg,

        /// Only show open tasks
        #[arg(long)]
        open: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a task by hand
    Add {
        /// What needs doing
        title: String,

        #[command(flatten)]
        target: MeetingArg,
    },

    /// Mark a task completed
    Done {
        /// Task id
        id: i64,

        /// Mark the task open again instead
        #[arg(long)]
        reopen: bool,
    },

    /// Suggest tasks from a meeting's notes
    Extract {
        #[command(flatten)]
        target: MeetingArg,

        /// Scan this file instead of the stored notes
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Accept a suggestion as a task
    Accept {
        /// Suggestion text
        text: String,

        #[command(flatten)]
        target: MeetingArg,
    },
}

/// Theme command arguments.
#[derive(Debug, Args)]
pub struct ThemeCommand {
    /// New theme; prints the current theme when omitted
    #[arg(value_enum)]
    pub value: Option<Theme>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// How `notes show` prints notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NotesFormat {
    /// Markdown as the editor sees it
    #[default]
    Markdown,
    /// One line per block with its kind
    Blocks,
    /// JSON block list
    Json,
}
