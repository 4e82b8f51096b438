use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{KeyStore, StoredValue, validate_key};
use crate::error::Result;
use crate::lifecycle::Lifecycle;

/// A [`KeyStore`] that lives for the duration of the process.
///
/// There is no spill to disk; memory grows with the number of distinct keys.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    store_values: bool,
    started: AtomicBool,
}

impl MemoryKeyStore {
    /// Creates an empty store that keeps only keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also keeps written payloads.
    pub fn with_values(mut self, store_values: bool) -> Self {
        self.store_values = store_values;
        self
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if no key has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lifecycle for MemoryKeyStore {
    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl KeyStore for MemoryKeyStore {
    fn store(&self, key: &str, value: &StoredValue) -> Result<()> {
        validate_key(key)?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<StoredValue>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }

    fn store_values(&self) -> bool {
        self.store_values
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Error;

    #[test]
    fn stores_and_lists_keys() {
        let store = MemoryKeyStore::new();
        store.start().unwrap();

        store.store("b", &StoredValue::NotStored).unwrap();
        store
            .store("a", &StoredValue::Bytes(Bytes::from_static(b"v")))
            .unwrap();

        assert_eq!(store.keys().unwrap(), BTreeSet::from(["a".into(), "b".into()]));
        assert_eq!(
            store.retrieve("a").unwrap(),
            Some(StoredValue::Bytes(Bytes::from_static(b"v")))
        );
        assert_eq!(store.retrieve("missing").unwrap(), None);
    }

    #[test]
    fn rejects_newline_keys_without_storing() {
        let store = MemoryKeyStore::new();
        let err = store.store("a\n", &StoredValue::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(store.is_empty());
    }
}
