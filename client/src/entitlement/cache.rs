//! Persisted copy of the last known entitlement.
//!
//! Every operation is best-effort: failures are logged and never returned.
//! A failed save also drops the user's older entry, so it shows up as a cache
//! miss on the next load. A corrupt entry is cleared and treated as a miss.

use super::EntitlementRecord;
use crate::providers::KeyValueStore;
use crate::types::UserId;
use std::sync::Arc;

const NAMESPACE: &str = "subscription";

/// Cache of [`EntitlementRecord`]s keyed by user.
#[derive(Clone)]
pub struct EntitlementCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for EntitlementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementCache").finish_non_exhaustive()
    }
}

impl EntitlementCache {
    /// Wrap a key/value store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(user: &UserId) -> String {
        format!("{NAMESPACE}/{user}")
    }

    /// Last saved record, or `None` on a miss, read failure, or corrupt entry.
    pub async fn load(&self, user: &UserId) -> Option<EntitlementRecord> {
        let key = Self::key(user);
        let blob = match self.store.get(&key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(%user, %error, "Entitlement cache read failed");
                return None;
            },
        };

        match serde_json::from_str(&blob) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(%user, %error, "Corrupt entitlement cache entry; clearing");
                self.clear(user).await;
                None
            },
        }
    }

    /// Persist a record.
    pub async fn save(&self, user: &UserId, record: &EntitlementRecord) {
        let blob = match serde_json::to_string(record) {
            Ok(blob) => blob,
            Err(error) => {
                tracing::warn!(%user, %error, "Could not encode entitlement for cache");
                self.clear(user).await;
                return;
            },
        };

        if let Err(error) = self.store.set(&Self::key(user), blob).await {
            tracing::warn!(%user, %error, "Entitlement cache write failed; dropping old entry");
            // An older entry must not outlive the record that replaced it.
            self.clear(user).await;
        }
    }

    /// Remove the user's entry.
    pub async fn clear(&self, user: &UserId) {
        if let Err(error) = self.store.remove(&Self::key(user)).await {
            tracing::warn!(%user, %error, "Entitlement cache clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::InMemoryKeyValueStore;

    fn pending() -> EntitlementRecord {
        EntitlementRecord::Pending {
            vehicle_class: None,
            plan_id: Some("weekly".into()),
            reference_number: "R123".into(),
            submitted_at: None,
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let cache = EntitlementCache::new(Arc::new(InMemoryKeyValueStore::new()));
        let user = UserId::new("u1");

        cache.save(&user, &pending()).await;
        assert_eq!(cache.load(&user).await, Some(pending()));

        cache.clear(&user).await;
        assert_eq!(cache.load(&user).await, None);
    }

    #[tokio::test]
    async fn failed_save_is_a_miss() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.fail_writes(true);
        let cache = EntitlementCache::new(store);
        let user = UserId::new("u1");

        cache.save(&user, &pending()).await;
        assert_eq!(cache.load(&user).await, None);
    }

    #[tokio::test]
    async fn failed_save_drops_the_older_entry() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let cache = EntitlementCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        let user = UserId::new("u1");
        cache.save(&user, &pending()).await;

        store.fail_sets(true);
        let downgraded = EntitlementRecord::Pending {
            vehicle_class: None,
            plan_id: None,
            reference_number: "R999".into(),
            submitted_at: None,
        };
        cache.save(&user, &downgraded).await;

        assert_eq!(cache.load(&user).await, None);
        assert!(!store.contains("subscription/u1"));
    }

    #[tokio::test]
    async fn corrupt_entry_is_cleared() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.insert("subscription/u1", "{not json");
        let cache = EntitlementCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);

        assert_eq!(cache.load(&UserId::new("u1")).await, None);
        assert!(!store.contains("subscription/u1"));
    }

    #[tokio::test]
    async fn entries_are_per_user() {
        let cache = EntitlementCache::new(Arc::new(InMemoryKeyValueStore::new()));
        cache.save(&UserId::new("a"), &pending()).await;
        assert_eq!(cache.load(&UserId::new("b")).await, None);
    }
}
