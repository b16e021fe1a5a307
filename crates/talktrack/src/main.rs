//! `talktrack` - CLI for the talks server and the local talk list
//!
//! This binary runs the talks server and lets you browse talks and manage
//! favorites from the terminal.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use talktrack::cli::render::{self, TalkView};
use talktrack::cli::{Cli, Command, ConfigCommand, ServeCommand, StoreCommand, TalksCommand};
use talktrack::{
    init_logging, Config, FetchOutcome, KeyValueStore, MemoryStore, RemoteTalksClient,
    SqliteStore, StoreContext, TalkRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd).await,
        Command::Talks(talks_cmd) => {
            let repo = open_repository(&config, cli.ephemeral)?;
            let client = RemoteTalksClient::from_config(&config.client);
            handle_talks(&repo, &client, &talks_cmd).await
        }
        Command::Favorite(favorite_cmd) => {
            let repo = open_repository(&config, cli.ephemeral)?;
            handle_favorite(&repo, &favorite_cmd.title).await
        }
        Command::Favorites(favorites_cmd) => {
            let repo = open_repository(&config, cli.ephemeral)?;
            handle_favorites(&repo, favorites_cmd.json).await
        }
        Command::Store(store_cmd) => {
            let store = open_store(&config, cli.ephemeral)?;
            handle_store(store.as_ref(), &config, store_cmd).await
        }
        Command::Config(config_cmd) => handle_config(&config, cli.config, config_cmd),
    }
}

fn open_store(config: &Config, ephemeral: bool) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = config.database_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_repository(config: &Config, ephemeral: bool) -> anyhow::Result<TalkRepository> {
    let store = open_store(config, ephemeral)?;
    let context = StoreContext::with_policy(store, config.storage.hydration_policy);
    let client = RemoteTalksClient::from_config(&config.client);
    Ok(TalkRepository::new(&context, Arc::new(client))?)
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if let Some(talks_file) = cmd.talks_file {
        config.server.talks_file = talks_file;
    }
    config.server.cors |= cmd.cors;
    config.validate()?;

    talktrack::server::serve(&config.server).await?;
    Ok(())
}

async fn handle_talks(
    repo: &TalkRepository,
    client: &RemoteTalksClient,
    cmd: &TalksCommand,
) -> anyhow::Result<()> {
    if let Err(e) = repo.hydrated().await {
        warn!("{}", e);
    }

    if !cmd.offline {
        if let FetchOutcome::Failed { reason } = repo.mount().await? {
            let status = client.server_status().await;
            eprintln!(
                "warning: could not refresh talks from {} ({status}: {reason}); showing the saved list",
                client.base_url()
            );
        }
    }

    let talks = if cmd.favorites_only {
        repo.favorite_talks()
    } else {
        repo.talks()
    };
    let views: Vec<TalkView<'_>> = talks
        .iter()
        .map(|talk| TalkView {
            talk,
            attending: repo.is_favorite(&talk.title),
        })
        .collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        print!("{}", render::talk_list(&views));
    }
    Ok(())
}

async fn handle_favorite(repo: &TalkRepository, title: &str) -> anyhow::Result<()> {
    if let Err(e) = repo.hydrated().await {
        warn!("{}", e);
    }

    let known = repo.talks().iter().any(|talk| talk.title == title);
    repo.toggle_favorite(title).await?;

    if repo.is_favorite(title) {
        println!("Attending: {title}");
        if !known {
            println!("  (not in the saved talk list; run `talktrack talks` to refresh)");
        }
    } else {
        println!("Not attending: {title}");
    }
    Ok(())
}

async fn handle_favorites(repo: &TalkRepository, json: bool) -> anyhow::Result<()> {
    if let Err(e) = repo.hydrated().await {
        warn!("{}", e);
    }

    let names = repo.favorite_names();
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        println!("No favorites yet.");
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

async fn handle_store(
    store: &dyn KeyValueStore,
    config: &Config,
    cmd: StoreCommand,
) -> anyhow::Result<()> {
    match cmd {
        StoreCommand::Stats { json } => {
            let stats = store.stats().await?;
            let last_write = stats
                .last_write
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
            if json {
                let value = serde_json::json!({
                    "database_path": config.database_path(),
                    "entries": stats.entries,
                    "value_bytes": stats.value_bytes,
                    "db_size_bytes": stats.db_size_bytes,
                    "last_write": stats.last_write,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("talktrack store");
                println!("---------------");
                println!("Database:      {}", config.database_path().display());
                println!("Entries:       {}", stats.entries);
                println!("Value bytes:   {}", stats.value_bytes);
                println!("File size:     {}", stats.db_size_bytes);
                println!("Last write:    {last_write}");
            }
        }
        StoreCommand::Keys => {
            for key in store.keys().await? {
                println!("{key}");
            }
        }
        StoreCommand::Clear { yes } => {
            if yes {
                let removed = store.clear().await?;
                println!("Removed {removed} stored entries.");
            } else {
                println!("This will remove the saved talk list and all favorites.");
                println!("Use --yes to confirm.");
            }
        }
    }
    Ok(())
}

fn handle_config(
    config: &Config,
    config_path: Option<PathBuf>,
    cmd: ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Client]");
                println!("  Base URL:           {}", config.client.base_url);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  Hydration policy:   {:?}",
                    config.storage.hydration_policy
                );
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.listen_addr());
                println!(
                    "  Talks file:         {}",
                    config.server.talks_file.display()
                );
                println!("  CORS:               {}", config.server.cors);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::resolve_path(config_path).display());
        }
        ConfigCommand::Validate { file } => {
            let path = Config::resolve_path(file.or(config_path));
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
