//! Reactive values backed by the key-value store.
//!
//! A [`StorageBinding`] ties one store key to an in-memory value. The value is
//! usable immediately (it starts at a default), is loaded from the store in the
//! background, and every update is written straight back to the store.
//!
//! Each binding moves through three phases:
//!
//! ```text
//! Uninitialized --activate()--> Hydrating --store read done--> Ready
//! ```
//!
//! Updates are accepted in every phase. What happens when the store read
//! finishes after a local update is decided by [`HydrationPolicy`].
//!
//! [`StoreContext`] owns the store handle and hands out one binding per key,
//! so every consumer of a key shares the same value and the key is read once.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// Resolution of the race between hydration and local updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationPolicy {
    /// The stored value replaces the in-memory value even if it was updated
    /// while the read was in flight. The local update is still written to the
    /// store, so memory and store disagree until the next update.
    #[default]
    StoreWins,
    /// If the value was updated locally before the read finished, the stored
    /// value is discarded.
    LocalWins,
}

/// Lifecycle phase of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, store not yet read.
    Uninitialized,
    /// Store read in flight.
    Hydrating,
    /// Store read finished (successfully or not).
    Ready,
}

/// Values that can be bound to a store key.
pub trait Bindable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Bindable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

struct Inner<T> {
    key: String,
    store: Arc<dyn KeyValueStore>,
    policy: HydrationPolicy,
    value: watch::Sender<T>,
    phase: watch::Sender<Phase>,
    /// Set by every local update.
    touched: AtomicBool,
    hydration_error: Mutex<Option<String>>,
    /// Serializes in-memory updates and the hydration swap.
    update_lock: Mutex<()>,
    /// Serializes store writes for this key.
    write_lock: tokio::sync::Mutex<()>,
}

/// A store key bound to an in-memory, observable value.
///
/// Cloning is cheap; clones share the same value.
pub struct StorageBinding<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StorageBinding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for StorageBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBinding")
            .field("key", &self.inner.key)
            .field("phase", &*self.inner.phase.borrow())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Bindable> StorageBinding<T> {
    /// Create an uninitialized binding. Nothing is read until [`activate`].
    ///
    /// [`activate`]: StorageBinding::activate
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        default: T,
        policy: HydrationPolicy,
    ) -> Self {
        let (value, _) = watch::channel(default);
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                key: key.into(),
                store,
                policy,
                value,
                phase,
                touched: AtomicBool::new(false),
                hydration_error: Mutex::new(None),
                update_lock: Mutex::new(()),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a binding and start hydrating it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn bind(store: Arc<dyn KeyValueStore>, key: impl Into<String>, default: T) -> Self {
        let binding = Self::new(store, key, default, HydrationPolicy::default());
        binding.activate();
        binding
    }

    /// Start the background store read. Only the first call has an effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn activate(&self) {
        let started = self.inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Uninitialized {
                *phase = Phase::Hydrating;
                true
            } else {
                false
            }
        });
        if started {
            debug!(key = %self.inner.key, "Hydrating binding");
            tokio::spawn(Arc::clone(&self.inner).hydrate());
        }
    }

    /// The store key this binding is attached to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// A copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Inspect the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Observe the value. The receiver sees hydration and every update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.value.subscribe()
    }

    /// Wait until hydration has finished, activating the binding if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hydration`] if the store could not be read or the
    /// stored text did not parse. The binding is still usable and holds its
    /// default value.
    pub async fn hydrated(&self) -> Result<()> {
        self.activate();
        let mut phase = self.inner.phase.subscribe();
        phase
            .wait_for(|p| *p == Phase::Ready)
            .await
            .map_err(|_| Error::internal("binding phase channel closed"))?;

        let failure = self
            .inner
            .hydration_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(message) => Err(Error::hydration(&self.inner.key, message)),
            None => Ok(()),
        }
    }

    /// Replace the value and write it to the store.
    ///
    /// The in-memory value changes before this returns; the returned future
    /// performs the write and resolves once the store has answered.
    pub fn set(&self, value: T) -> impl Future<Output = Result<()>> + Send + 'static {
        self.update(move |_| value)
    }

    /// Replace the value with `f(current)` and write it to the store.
    ///
    /// `f` sees the freshest value, including updates whose writes are still
    /// pending, so back-to-back updates never lose each other. It runs outside
    /// the value lock and may read this binding, but must not call `set` or
    /// `update` on it.
    pub fn update<F>(&self, f: F) -> impl Future<Output = Result<()>> + Send + 'static
    where
        F: FnOnce(&T) -> T,
    {
        {
            let _guard = self
                .inner
                .update_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let next = f(&self.get());
            self.inner.touched.store(true, Ordering::SeqCst);
            self.inner.value.send_replace(next);
        }
        let inner = Arc::clone(&self.inner);
        async move { inner.persist().await }
    }
}

impl<T: Bindable> Inner<T> {
    async fn hydrate(self: Arc<Self>) {
        match self.store.get_item(&self.key).await {
            Ok(Some(text)) => match serde_json::from_str::<T>(&text) {
                Ok(stored) => self.apply_stored(stored),
                Err(e) => self.fail_hydration(format!("stored value does not parse: {e}")),
            },
            Ok(None) => debug!(key = %self.key, "Nothing stored, keeping default"),
            Err(e) => self.fail_hydration(e.to_string()),
        }
        self.phase.send_replace(Phase::Ready);
    }

    fn apply_stored(&self, stored: T) {
        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let applied = self.value.send_if_modified(|current| {
            if self.policy == HydrationPolicy::LocalWins && self.touched.load(Ordering::SeqCst) {
                false
            } else {
                *current = stored;
                true
            }
        });
        if applied {
            debug!(key = %self.key, "Hydrated from store");
        } else {
            debug!(key = %self.key, "Local update during hydration, discarding stored value");
        }
    }

    fn fail_hydration(&self, message: String) {
        warn!(key = %self.key, "Hydration failed: {}", message);
        *self
            .hydration_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    /// Write the value current at the time the write lock is acquired.
    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let text = {
            let current = self.value.borrow();
            serde_json::to_string(&*current)?
        };
        match self.store.set_item(&self.key, &text).await {
            Ok(()) => {
                debug!(key = %self.key, bytes = text.len(), "Persisted binding");
                Ok(())
            }
            Err(e) => {
                error!(key = %self.key, "Failed to persist binding: {}", e);
                Err(e)
            }
        }
    }
}

type BindingMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Owner of the store handle, handing out one binding per key.
#[derive(Clone)]
pub struct StoreContext {
    store: Arc<dyn KeyValueStore>,
    policy: HydrationPolicy,
    bindings: Arc<Mutex<BindingMap>>,
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.bindings().keys().cloned().collect();
        f.debug_struct("StoreContext")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("bound_keys", &keys)
            .finish()
    }
}

impl StoreContext {
    /// Create a context using the default hydration policy.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(store, HydrationPolicy::default())
    }

    /// Create a context whose bindings use `policy`.
    #[must_use]
    pub fn with_policy(store: Arc<dyn KeyValueStore>, policy: HydrationPolicy) -> Self {
        Self {
            store,
            policy,
            bindings: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The hydration policy applied to new bindings.
    #[must_use]
    pub fn policy(&self) -> HydrationPolicy {
        self.policy
    }

    /// Get the binding for `key`, creating and activating it on first use.
    ///
    /// `default` is ignored when the key is already bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindingType`] if `key` is already bound to another type.
    ///
    /// # Panics
    ///
    /// Panics if a new binding is created outside a Tokio runtime.
    pub fn bind<T: Bindable>(&self, key: &str, default: T) -> Result<StorageBinding<T>> {
        let mut bindings = self.bindings();
        if let Some(existing) = bindings.get(key) {
            return existing
                .downcast_ref::<StorageBinding<T>>()
                .cloned()
                .ok_or_else(|| Error::BindingType {
                    key: key.to_string(),
                });
        }

        let binding = StorageBinding::new(Arc::clone(&self.store), key, default, self.policy);
        binding.activate();
        bindings.insert(key.to_string(), Arc::new(binding.clone()));
        Ok(binding)
    }

    fn bindings(&self) -> std::sync::MutexGuard<'_, BindingMap> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
