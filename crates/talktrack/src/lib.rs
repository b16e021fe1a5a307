//! `talktrack` - Conference talks with locally persisted favorites
//!
//! This library provides a talks server, a client for it, and a repository
//! that keeps the last fetched talk list and the user's favorites in a local
//! key-value store through write-through reactive bindings.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod binding;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod repository;
pub mod server;
pub mod store;
pub mod talk;

pub use binding::{HydrationPolicy, StorageBinding, StoreContext};
pub use client::{RemoteTalksClient, ServerStatus};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use repository::{FetchOutcome, TalkRepository, TalkSource};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StorageKeys, StoreStats};
pub use talk::Talk;
