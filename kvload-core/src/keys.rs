//! Sources of keys for the operations a strategy generates.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::lifecycle::Lifecycle;

/// Which [`KeyProvider`] a strategy draws its keys from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// `prefix` followed by an increasing counter.
    Sequential,
    /// `prefix` followed by a random UUID.
    Random,
    /// The keys of the configured key store, replayed once.
    Stored,
}

/// A thread-safe supply of keys.
pub trait KeyProvider: Lifecycle + fmt::Debug {
    /// Returns the next key, or `None` once the supply is exhausted.
    fn next_key(&self) -> Result<Option<String>>;
}

/// Builds the provider for `source`.
pub fn provider(
    source: KeySource,
    prefix: &str,
    key_store: Option<&Arc<dyn KeyStore>>,
) -> Result<Box<dyn KeyProvider>> {
    Ok(match source {
        KeySource::Sequential => Box::new(SequentialKeys::new(prefix)),
        KeySource::Random => Box::new(RandomKeys::new(prefix)),
        KeySource::Stored => {
            let store = key_store.ok_or_else(|| {
                Error::Config("stored keys require a configured key store".into())
            })?;
            Box::new(StoredKeys::new(Arc::clone(store)))
        }
    })
}

#[derive(Debug, Default)]
struct Started(AtomicBool);

impl Started {
    fn set(&self, started: bool) -> Result<()> {
        self.0.store(started, Ordering::Release);
        Ok(())
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Unbounded keys of the form `{prefix}{n}`, unique across threads.
#[derive(Debug)]
pub struct SequentialKeys {
    prefix: String,
    next: AtomicU64,
    started: Started,
}

impl SequentialKeys {
    /// Creates a provider starting at `{prefix}0`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
            started: Started::default(),
        }
    }
}

impl Lifecycle for SequentialKeys {
    fn start(&self) -> Result<()> {
        self.started.set(true)
    }

    fn stop(&self) -> Result<()> {
        self.started.set(false)
    }

    fn is_started(&self) -> bool {
        self.started.get()
    }
}

impl KeyProvider for SequentialKeys {
    fn next_key(&self) -> Result<Option<String>> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(Some(format!("{}{n}", self.prefix)))
    }
}

/// Unbounded keys of the form `{prefix}{uuid}`.
#[derive(Debug)]
pub struct RandomKeys {
    prefix: String,
    started: Started,
}

impl RandomKeys {
    /// Creates a provider of random keys.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            started: Started::default(),
        }
    }
}

impl Lifecycle for RandomKeys {
    fn start(&self) -> Result<()> {
        self.started.set(true)
    }

    fn stop(&self) -> Result<()> {
        self.started.set(false)
    }

    fn is_started(&self) -> bool {
        self.started.get()
    }
}

impl KeyProvider for RandomKeys {
    fn next_key(&self) -> Result<Option<String>> {
        Ok(Some(format!("{}{}", self.prefix, Uuid::new_v4())))
    }
}

/// Replays the keys of a [`KeyStore`], as found when the provider starts.
///
/// Each key is handed out exactly once across all threads.
#[derive(Debug)]
pub struct StoredKeys {
    store: Arc<dyn KeyStore>,
    keys: RwLock<Option<Vec<String>>>,
    cursor: AtomicUsize,
}

impl StoredKeys {
    /// Creates a provider over the keys of `store`.
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            keys: RwLock::new(None),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Lifecycle for StoredKeys {
    fn start(&self) -> Result<()> {
        let mut keys = self.keys.write().unwrap();
        if keys.is_none() {
            let snapshot: Vec<String> = self.store.keys()?.into_iter().collect();
            info!(count = snapshot.len(), "loaded keys from key store");
            self.cursor.store(0, Ordering::Relaxed);
            *keys = Some(snapshot);
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.keys.write().unwrap() = None;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.keys.read().unwrap().is_some()
    }
}

impl KeyProvider for StoredKeys {
    fn next_key(&self) -> Result<Option<String>> {
        let keys = self.keys.read().unwrap();
        let Some(keys) = keys.as_ref() else {
            return Err(Error::Lifecycle("stored key provider is not started".into()));
        };

        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(keys.get(index).cloned())
    }
}
