//! Command-line interface for talktrack.
//!
//! This module provides the CLI structure for the `talktrack` binary; the
//! handlers live in the binary itself.

mod commands;
pub mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    ConfigCommand, FavoriteCommand, FavoritesCommand, ServeCommand, StoreCommand, TalksCommand,
};

/// talktrack - Conference talks with local favorites
///
/// Serves a talk list over HTTP, fetches it from a server and keeps the list
/// and your favorites in a local store so they survive restarts and outages.
#[derive(Debug, Parser)]
#[command(name = "talktrack")]
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

    /// Keep state in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the talks server
    Serve(ServeCommand),

    /// Fetch and list talks
    Talks(TalksCommand),

    /// Toggle attendance for a talk
    Favorite(FavoriteCommand),

    /// List the talks you are attending
    Favorites(FavoritesCommand),

    /// Inspect or reset the local store
    #[command(subcommand)]
    Store(StoreCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
