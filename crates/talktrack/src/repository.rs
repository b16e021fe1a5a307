//! The talk list and the user's favorites.
//!
//! [`TalkRepository`] owns two bindings: the last known talk list under
//! [`StorageKeys::TALKS`] and the favorite titles under
//! [`StorageKeys::FAVORITE_NAMES`]. When mounted it asks its [`TalkSource`]
//! for a fresh list exactly once and replaces the stored list on success.
//! On failure the stored list stays on screen.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binding::{StorageBinding, StoreContext};
use crate::error::Result;
use crate::store::StorageKeys;
use crate::talk::Talk;

/// Where fresh talk lists come from.
#[async_trait]
pub trait TalkSource: Send + Sync + fmt::Debug {
    /// Fetch the current talk list.
    async fn fetch_talks(&self) -> Result<Vec<Talk>>;
}

/// Result of the one-time remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetched list replaced the stored one.
    Loaded {
        /// Number of talks received.
        count: usize,
    },
    /// The fetch failed; the talk list was left untouched.
    Failed {
        /// Why the fetch failed.
        reason: String,
    },
}

impl FetchOutcome {
    /// Whether the fetch succeeded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

/// Talk list and favorites, shared by every clone.
#[derive(Debug, Clone)]
pub struct TalkRepository {
    talks: StorageBinding<Vec<Talk>>,
    favorites: StorageBinding<Vec<String>>,
    source: Arc<dyn TalkSource>,
    fetched: Arc<OnceCell<FetchOutcome>>,
}

impl TalkRepository {
    /// Bind the talk and favorite keys in `context`.
    ///
    /// Both bindings start hydrating right away; nothing is fetched until
    /// [`mount`](Self::mount) or [`load_remote`](Self::load_remote).
    ///
    /// # Errors
    ///
    /// Returns an error if either key is already bound to another type.
    pub fn new(context: &StoreContext, source: Arc<dyn TalkSource>) -> Result<Self> {
        Ok(Self {
            talks: context.bind(StorageKeys::TALKS, Vec::new())?,
            favorites: context.bind(StorageKeys::FAVORITE_NAMES, Vec::new())?,
            source,
            fetched: Arc::new(OnceCell::new()),
        })
    }

    /// Start the remote fetch in the background.
    ///
    /// Mounting more than once never fetches twice; every handle resolves
    /// to the outcome of the single fetch.
    pub fn mount(&self) -> JoinHandle<FetchOutcome> {
        let repo = self.clone();
        tokio::spawn(async move { repo.load_remote().await.clone() })
    }

    /// Fetch the talk list once and apply it.
    ///
    /// Later calls return the outcome of the first fetch without contacting
    /// the source again.
    pub async fn load_remote(&self) -> &FetchOutcome {
        self.fetched.get_or_init(|| self.fetch_and_apply()).await
    }

    async fn fetch_and_apply(&self) -> FetchOutcome {
        let talks = match self.source.fetch_talks().await {
            Ok(talks) => talks,
            Err(e) => {
                warn!("Keeping stored talks, fetch failed: {}", e);
                return FetchOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        // A stored list arriving after the fetched one would replace it.
        if let Err(e) = self.talks.hydrated().await {
            debug!("Stored talks unavailable: {}", e);
        }

        let count = talks.len();
        if let Err(e) = self.talks.set(talks).await {
            warn!("Fetched {} talks but could not store them: {}", count, e);
        }
        info!(count, "Loaded talks");
        FetchOutcome::Loaded { count }
    }

    /// Wait until both bindings have read the store.
    ///
    /// # Errors
    ///
    /// Returns the first hydration failure. Both values stay usable.
    pub async fn hydrated(&self) -> Result<()> {
        let talks = self.talks.hydrated().await;
        let favorites = self.favorites.hydrated().await;
        talks.and(favorites)
    }

    /// The current talk list.
    #[must_use]
    pub fn talks(&self) -> Vec<Talk> {
        self.talks.get()
    }

    /// Observe the talk list.
    #[must_use]
    pub fn subscribe_talks(&self) -> watch::Receiver<Vec<Talk>> {
        self.talks.subscribe()
    }

    /// The favorite titles, in the order they were added.
    #[must_use]
    pub fn favorite_names(&self) -> Vec<String> {
        self.favorites.get()
    }

    /// Observe the favorite titles.
    #[must_use]
    pub fn subscribe_favorites(&self) -> watch::Receiver<Vec<String>> {
        self.favorites.subscribe()
    }

    /// Whether `name` is a favorite.
    #[must_use]
    pub fn is_favorite(&self, name: &str) -> bool {
        self.favorites.with(|names| names.iter().any(|n| n == name))
    }

    /// Talks whose title is a favorite, in talk-list order.
    #[must_use]
    pub fn favorite_talks(&self) -> Vec<Talk> {
        self.favorites.with(|names| {
            self.talks
                .get()
                .into_iter()
                .filter(|talk| names.contains(&talk.title))
                .collect()
        })
    }

    /// Add `name` to the favorites, or remove every copy of it if present.
    ///
    /// The change is visible immediately; the returned future writes it to
    /// the store.
    pub fn toggle_favorite(&self, name: &str) -> impl Future<Output = Result<()>> + Send + 'static {
        let name = name.to_string();
        self.favorites.update(move |names| toggled(names, &name))
    }
}

fn toggled(names: &[String], name: &str) -> Vec<String> {
    if names.iter().any(|n| n == name) {
        names.iter().filter(|n| *n != name).cloned().collect()
    } else {
        let mut next = names.to_vec();
        next.push(name.to_string());
        next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;
    use crate::store::testing::GatedStore;
    use crate::store::{KeyValueStore, MemoryStore};

    #[derive(Debug, Default)]
    struct StubSource {
        talks: Option<Vec<Talk>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn returning(talks: Vec<Talk>) -> Arc<Self> {
            Arc::new(Self {
                talks: Some(talks),
                ..Self::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TalkSource for StubSource {
        async fn fetch_talks(&self) -> Result<Vec<Talk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.talks.clone().ok_or(Error::HttpStatus {
                url: "http://test/talks".to_string(),
                status: 500,
            })
        }
    }

    fn talk(title: &str) -> Talk {
        Talk {
            title: title.to_string(),
            subtitle: format!("About {title}"),
            start_time: "2024-05-01T09:00:00Z".to_string(),
            end_time: "2024-05-01T09:45:00Z".to_string(),
            duration: 45.0,
        }
    }

    fn repository(store: Arc<dyn KeyValueStore>, source: Arc<StubSource>) -> TalkRepository {
        TalkRepository::new(&StoreContext::new(store), source).unwrap()
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let store = Arc::new(MemoryStore::new());
        let repo = repository(store.clone(), StubSource::failing());
        repo.hydrated().await.unwrap();

        assert!(!repo.is_favorite("Talk A"));
        repo.toggle_favorite("Talk A").await.unwrap();
        assert!(repo.is_favorite("Talk A"));
        assert_eq!(
            store.get_item(StorageKeys::FAVORITE_NAMES).await.unwrap().as_deref(),
            Some(r#"["Talk A"]"#)
        );

        repo.toggle_favorite("Talk A").await.unwrap();
        assert!(!repo.is_favorite("Talk A"));
        assert_eq!(
            store.get_item(StorageKeys::FAVORITE_NAMES).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_toggle_visible_before_write_completes() {
        let repo = repository(Arc::new(MemoryStore::new()), StubSource::failing());
        repo.hydrated().await.unwrap();

        let write = repo.toggle_favorite("Talk B");
        assert!(repo.is_favorite("Talk B"));
        write.await.unwrap();
    }

    #[tokio::test]
    async fn test_back_to_back_toggles_cancel_out() {
        let store = Arc::new(MemoryStore::new());
        let repo = repository(store.clone(), StubSource::failing());
        repo.hydrated().await.unwrap();

        let first = repo.toggle_favorite("Talk A");
        let second = repo.toggle_favorite("Talk A");
        let (a, b) = tokio::join!(first, second);
        a.unwrap();
        b.unwrap();

        assert!(repo.favorite_names().is_empty());
        assert_eq!(
            store.get_item(StorageKeys::FAVORITE_NAMES).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_favorites_keep_insertion_order_without_duplicates() {
        let repo = repository(Arc::new(MemoryStore::new()), StubSource::failing());
        repo.hydrated().await.unwrap();

        for name in ["B", "A", "C", "A"] {
            repo.toggle_favorite(name).await.unwrap();
        }
        assert_eq!(repo.favorite_names(), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_toggle_removes_every_copy() {
        let store = Arc::new(MemoryStore::with_items([(
            StorageKeys::FAVORITE_NAMES,
            r#"["A","B","A"]"#,
        )]));
        let repo = repository(store, StubSource::failing());
        repo.hydrated().await.unwrap();

        repo.toggle_favorite("A").await.unwrap();
        assert_eq!(repo.favorite_names(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_stored_favorites_are_hydrated() {
        let store = Arc::new(MemoryStore::with_items([(
            StorageKeys::FAVORITE_NAMES,
            r#"["Talk A"]"#,
        )]));
        let repo = repository(store, StubSource::failing());
        repo.hydrated().await.unwrap();

        assert!(repo.is_favorite("Talk A"));
        assert!(!repo.is_favorite("Talk B"));
    }

    #[tokio::test]
    async fn test_mount_fetches_once_and_stores_list() {
        let store = Arc::new(MemoryStore::new());
        let source = StubSource::returning(vec![talk("Talk A"), talk("Talk B")]);
        let repo = repository(store.clone(), source.clone());

        let first = repo.mount();
        let second = repo.clone().mount();
        assert_eq!(first.await.unwrap(), FetchOutcome::Loaded { count: 2 });
        assert_eq!(second.await.unwrap(), FetchOutcome::Loaded { count: 2 });
        assert_eq!(repo.load_remote().await, &FetchOutcome::Loaded { count: 2 });
        assert_eq!(source.calls(), 1);

        assert_eq!(repo.talks(), vec![talk("Talk A"), talk("Talk B")]);
        let stored = store.get_item(StorageKeys::TALKS).await.unwrap().unwrap();
        let stored: Vec<Talk> = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored, repo.talks());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stored_talks() {
        crate::logging::init_test_logging();
        let stored = serde_json::to_string(&vec![talk("Old")]).unwrap();
        let store = Arc::new(MemoryStore::with_items([(StorageKeys::TALKS, stored.clone())]));
        let source = StubSource::failing();
        let repo = repository(store.clone(), source.clone());
        repo.hydrated().await.unwrap();

        let outcome = repo.load_remote().await;
        assert!(!outcome.is_loaded());
        assert!(matches!(outcome, FetchOutcome::Failed { reason } if reason.contains("500")));
        assert_eq!(repo.talks(), vec![talk("Old")]);
        assert_eq!(
            store.get_item(StorageKeys::TALKS).await.unwrap(),
            Some(stored)
        );

        repo.load_remote().await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_a_success() {
        let stored = serde_json::to_string(&vec![talk("Old")]).unwrap();
        let store = Arc::new(MemoryStore::with_items([(StorageKeys::TALKS, stored)]));
        let repo = repository(store, StubSource::returning(vec![]));

        assert_eq!(repo.load_remote().await, &FetchOutcome::Loaded { count: 0 });
        assert!(repo.talks().is_empty());
    }

    #[tokio::test]
    async fn test_fetched_list_not_replaced_by_late_hydration() {
        let stored = serde_json::to_string(&vec![talk("Old")]).unwrap();
        let store = Arc::new(GatedStore::with_items([(StorageKeys::TALKS, stored)]));
        let repo = repository(store.clone(), StubSource::returning(vec![talk("New")]));

        // Talks and favorites each issue one read.
        store.read_issued().await;
        let mounted = repo.mount();
        store.release();
        store.release();

        assert_eq!(mounted.await.unwrap(), FetchOutcome::Loaded { count: 1 });
        assert_eq!(repo.talks(), vec![talk("New")]);
    }

    #[tokio::test]
    async fn test_subscribers_see_fetched_list() {
        let repo = repository(
            Arc::new(MemoryStore::new()),
            StubSource::returning(vec![talk("Talk A")]),
        );
        let mut rx = repo.subscribe_talks();

        repo.load_remote().await;
        rx.wait_for(|talks| !talks.is_empty()).await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_favorite_subscribers_see_toggles() {
        let repo = repository(Arc::new(MemoryStore::new()), StubSource::failing());
        repo.hydrated().await.unwrap();
        let mut rx = repo.subscribe_favorites();

        repo.toggle_favorite("Talk A").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), vec!["Talk A".to_string()]);

        repo.toggle_favorite("Talk A").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn test_favorite_talks_in_list_order() {
        let repo = repository(
            Arc::new(MemoryStore::new()),
            StubSource::returning(vec![talk("A"), talk("B"), talk("C")]),
        );
        repo.load_remote().await;
        repo.toggle_favorite("C").await.unwrap();
        repo.toggle_favorite("A").await.unwrap();

        let titles: Vec<String> = repo.favorite_talks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_repositories_on_one_context_share_favorites() {
        let context = StoreContext::new(Arc::new(MemoryStore::new()));
        let first = TalkRepository::new(&context, StubSource::failing()).unwrap();
        let second = TalkRepository::new(&context, StubSource::failing()).unwrap();

        first.toggle_favorite("Shared").await.unwrap();
        assert!(second.is_favorite("Shared"));
    }

    #[test]
    fn test_toggled() {
        let names = vec!["a".to_string()];
        assert_eq!(toggled(&names, "b"), vec!["a", "b"]);
        assert!(toggled(&names, "a").is_empty());
    }
}
