//! CLI argument definitions using clap derive macros.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Print completed downloads that match a filter rule.
///
/// `autoprint run` reads download events as JSON lines on stdin and prints
/// every completed file accepted by the configured prefix/extension filter.
#[derive(Parser, Debug)]
#[command(name = "autoprint")]
#[command(author, version, about)]
pub struct Args {
    /// Runtime configuration file (default: ./autoprint.{yaml,toml,json} if present)
    #[arg(short = 'c', long)]
    pub config: Option<Utf8PathBuf>,

    /// Data directory holding Settings.yaml and History.yaml
    #[arg(short = 'd', long)]
    pub data_dir: Option<Utf8PathBuf>,

    /// Increase output verbosity (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Watch the download feed on stdin and print matching files (default)
    Run,

    /// Show recorded print attempts, newest first
    History {
        /// Show at most this many records
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Delete all recorded print attempts
    ClearHistory,

    /// Inspect or change the user settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Change one or more settings
    Set(SetArgs),
}

#[derive(clap::Args, Debug, Default, PartialEq)]
pub struct SetArgs {
    /// Turn auto-printing on or off
    #[arg(long)]
    pub enabled: Option<bool>,

    /// Only print files whose name starts with this (case-insensitive); "" clears it
    #[arg(long)]
    pub prefix: Option<String>,

    /// Only print files with this extension (e.g. pdf); "" clears it
    #[arg(long)]
    pub extension: Option<String>,

    /// Show notifications after each attempt
    #[arg(long)]
    pub notifications: Option<bool>,

    /// Number of history records to keep
    #[arg(long)]
    pub max_history: Option<usize>,
}

impl SetArgs {
    pub fn is_empty(&self) -> bool {
        *self == SetArgs::default()
    }
}
