//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Serve command arguments. Unset options fall back to configuration.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// JSON file served at /talks
    #[arg(short, long, value_name = "FILE")]
    pub talks_file: Option<PathBuf>,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,
}

/// Talks command arguments.
#[derive(Debug, Args)]
pub struct TalksCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Only show talks you are attending
    #[arg(short, long)]
    pub favorites_only: bool,

    /// Show the stored list without contacting the server
    #[arg(long)]
    pub offline: bool,
}

/// Favorite command arguments.
#[derive(Debug, Args)]
pub struct FavoriteCommand {
    /// Title of the talk, exactly as listed
    pub title: String,
}

/// Favorites command arguments.
#[derive(Debug, Args)]
pub struct FavoritesCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Local store commands.
#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Show store statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List stored keys
    Keys,

    /// Remove every stored value
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
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
