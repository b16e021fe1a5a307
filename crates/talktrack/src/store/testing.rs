//! Store doubles for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{KeyValueStore, MemoryStore, StoreStats};
use crate::error::{Error, Result};

/// Store whose reads are held until released.
///
/// A read snapshots the current value when it is issued, then waits for
/// [`GatedStore::release`] before returning that snapshot.
#[derive(Debug, Default)]
pub struct GatedStore {
    pub inner: MemoryStore,
    read_started: Notify,
    gate: Notify,
}

impl GatedStore {
    pub fn with_items<K: Into<String>, V: Into<String>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            inner: MemoryStore::with_items(entries),
            ..Self::default()
        }
    }

    /// Wait until a read has taken its snapshot.
    pub async fn read_issued(&self) {
        self.read_started.notified().await;
    }

    /// Let one pending (or the next) read complete.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl KeyValueStore for GatedStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let snapshot = self.inner.get_item(key).await?;
        self.read_started.notify_one();
        self.gate.notified().await;
        Ok(snapshot)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<bool> {
        self.inner.remove_item(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn clear(&self) -> Result<usize> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

/// Memory store that counts reads and can be told to fail.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    reads: AtomicUsize,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl CountingStore {
    pub fn with_items<K: Into<String>, V: Into<String>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            inner: MemoryStore::with_items(entries),
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(Error::internal("store unavailable"));
        }
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes {
            return Err(Error::internal("disk full"));
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<bool> {
        self.inner.remove_item(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn clear(&self) -> Result<usize> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}
