//! `SQLite`-backed key-value store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{migrations, KeyValueStore, StoreStats};
use crate::error::{Error, Result};

const MEMORY_PATH: &str = ":memory:";

/// Durable key-value store in a single `SQLite` file.
///
/// The connection lives behind a mutex and every operation runs on the
/// blocking thread pool, so callers on the async runtime never block.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Store opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(MEMORY_PATH),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(MEMORY_PATH),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row("SELECT value FROM items WHERE key = ?1", [&key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r"
                INSERT INTO items (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                ",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            debug!("Wrote {} bytes to {}", value.len(), key);
            Ok(())
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let affected = conn.execute("DELETE FROM items WHERE key = ?1", [key])?;
            Ok(affected > 0)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM items ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn clear(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM items", [])?;
            if affected > 0 {
                info!("Cleared {} stored entries", affected);
            }
            Ok(affected)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        let path = self.path.clone();
        self.with_conn(move |conn| {
            let (entries, value_bytes, last_write): (i64, i64, Option<String>) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0), MAX(updated_at) FROM items",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let last_write = last_write
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            let db_size_bytes = if path.as_os_str() == MEMORY_PATH {
                0
            } else {
                std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
            };

            Ok(StoreStats {
                entries: usize::try_from(entries).unwrap_or(0),
                value_bytes: u64::try_from(value_bytes).unwrap_or(0),
                last_write,
                db_size_bytes,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = create_test_store();
        assert_eq!(store.get_item("@TALKS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = create_test_store();
        store.set_item("@favorites", r#"["Talk A"]"#).await.unwrap();

        let value = store.get_item("@favorites").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"["Talk A"]"#));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = create_test_store();
        store.set_item("@favorites", "[]").await.unwrap();
        store.set_item("@favorites", r#"["B"]"#).await.unwrap();

        assert_eq!(
            store.get_item("@favorites").await.unwrap().as_deref(),
            Some(r#"["B"]"#)
        );
        assert_eq!(store.keys().await.unwrap(), vec!["@favorites"]);
    }

    #[tokio::test]
    async fn test_unicode_value() {
        let store = create_test_store();
        store.set_item("k", r#"["Grüße 世界 🌍"]"#).await.unwrap();
        assert_eq!(
            store.get_item("k").await.unwrap().as_deref(),
            Some(r#"["Grüße 世界 🌍"]"#)
        );
    }

    #[tokio::test]
    async fn test_remove_item() {
        let store = create_test_store();
        store.set_item("k", "1").await.unwrap();

        assert!(store.remove_item("k").await.unwrap());
        assert!(!store.remove_item("k").await.unwrap());
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let store = create_test_store();
        store.set_item("@favorites", "[]").await.unwrap();
        store.set_item("@TALKS", "[]").await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["@TALKS", "@favorites"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = create_test_store();
        store.set_item("a", "1").await.unwrap();
        store.set_item("b", "2").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = create_test_store();
        let empty = store.stats().await.unwrap();
        assert_eq!(empty.entries, 0);
        assert_eq!(empty.value_bytes, 0);
        assert!(empty.last_write.is_none());

        store.set_item("a", "abc").await.unwrap();
        store.set_item("b", "ü").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.value_bytes, 5);
        assert!(stats.last_write.is_some());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("store.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.set_item("@favorites", r#"["Talk A"]"#).await.unwrap();
            assert_eq!(store.path(), db_path);
            assert!(store.stats().await.unwrap().db_size_bytes > 0);
        }

        let reopened = SqliteStore::open(&db_path).unwrap();
        assert_eq!(
            reopened.get_item("@favorites").await.unwrap().as_deref(),
            Some(r#"["Talk A"]"#)
        );
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper/store.db");

        let _store = SqliteStore::open(&nested).unwrap();
        assert!(nested.exists());
    }
}
