//! In-memory key/value store.

use super::lock;
use crate::error::CacheError;
use crate::providers::KeyValueStore;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory [`KeyValueStore`] with write-failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
    fail_sets: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only `set` fail; `remove` keeps working.
    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Seed a raw value, bypassing failure injection.
    pub fn insert(&self, key: &str, value: &str) {
        lock(&self.entries).insert(key.to_string(), value.to_string());
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Raw value for a key.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn check_writable(&self) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("write failure injected".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, CacheError>> {
        let value = lock(&self.entries).get(key).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_writable()?;
            if self.fail_sets.load(Ordering::SeqCst) {
                return Err(CacheError::Unavailable("set failure injected".to_string()));
            }
            lock(&self.entries).insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), CacheError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_writable()?;
            lock(&self.entries).remove(&key);
            Ok(())
        })
    }
}
