//! Persisted key-value store.
//!
//! Bindings keep their source of record here: one opaque JSON text blob per
//! string key, no transactions, no schema for values. Two implementations are
//! provided:
//! - [`SqliteStore`], a durable store in a single `SQLite` file
//! - [`MemoryStore`], a process-local map for tests and ephemeral runs

pub mod migrations;
pub mod schema;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use sqlite::SqliteStore;

/// Store keys used by the talk repository.
#[derive(Debug, Clone, Copy)]
pub struct StorageKeys;

impl StorageKeys {
    /// Key holding the JSON-serialized talk list.
    pub const TALKS: &'static str = "@TALKS";
    /// Key holding the JSON-serialized favorite title list.
    pub const FAVORITE_NAMES: &'static str = "@favorites";
}

/// An asynchronous, string-keyed, durable store.
///
/// Every operation is an independent suspension point; nothing is locked or
/// transacted across calls.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`, or `None` if the slot is empty.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Returns `true` if something was removed.
    async fn remove_item(&self, key: &str) -> Result<bool>;

    /// All keys currently stored, sorted.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every key. Returns the number of removed entries.
    async fn clear(&self) -> Result<usize>;

    /// Summary statistics about the store contents.
    async fn stats(&self) -> Result<StoreStats>;
}

/// Statistics about a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys stored.
    pub entries: usize,
    /// Combined size of all stored values in bytes.
    pub value_bytes: u64,
    /// Time of the most recent write, if any.
    pub last_write: Option<DateTime<Utc>>,
    /// Size of the backing file in bytes (0 when not file-backed).
    pub db_size_bytes: u64,
}

/// In-memory store.
///
/// Values do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`.
    #[must_use]
    pub fn with_items<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let now = Utc::now();
        let items = entries
            .into_iter()
            .map(|(k, v)| (k.into(), (v.into(), now)))
            .collect();
        Self {
            items: Mutex::new(items),
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, (String, DateTime<Utc>)>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items().get(key).map(|(value, _)| value.clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items()
            .insert(key.to_string(), (value.to_string(), Utc::now()));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<bool> {
        Ok(self.items().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<usize> {
        let mut items = self.items();
        let removed = items.len();
        items.clear();
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let items = self.items();
        Ok(StoreStats {
            entries: items.len(),
            value_bytes: items.values().map(|(v, _)| v.len() as u64).sum(),
            last_write: items.values().map(|(_, at)| *at).max(),
            db_size_bytes: 0,
        })
    }
}
