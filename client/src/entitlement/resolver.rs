//! Reconciles the remote subscription record, the cache, and the
//! new-registration signal into one [`EntitlementRecord`].
//!
//! Resolution order:
//!
//! 1. New registration: clear the cache and return `NONE`. Nothing else is
//!    consulted, so a fresh account never inherits a previous account's cache.
//! 2. Remote fetch, bounded by `fetch_timeout`. A classified result (including
//!    "not found" and invalid payloads, both `NONE`) is authoritative and is
//!    written through to the cache.
//! 3. On timeout or transient failure, a well-formed cached record.
//! 4. Otherwise `NONE`.
//!
//! The resolver never returns an error: the "no subscription" outcomes are
//! ordinary values.

use super::{CreateSubscription, EntitlementCache, EntitlementRecord, classify};
use crate::error::TrackerError;
use crate::providers::SubscriptionApi;
use crate::types::UserId;
use ridesync_core::Clock;
use ridesync_runtime::fallback::FallbackChain;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where a resolved entitlement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntitlementSource {
    /// Classified remote record
    Remote,
    /// Cached record (remote unavailable)
    Cache,
    /// Neither remote nor cache asserted anything
    Default,
    /// New account; cache cleared
    NewRegistration,
    /// Operator/staff role, resolver bypassed
    RoleOverride,
}

impl EntitlementSource {
    /// Lowercase label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Cache => "cache",
            Self::Default => "default",
            Self::NewRegistration => "new_registration",
            Self::RoleOverride => "role_override",
        }
    }

    fn from_label(label: &str) -> Self {
        match label {
            "remote" => Self::Remote,
            "cache" => Self::Cache,
            _ => Self::Default,
        }
    }
}

impl fmt::Display for EntitlementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved record and its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The entitlement
    pub record: EntitlementRecord,
    /// Where it came from
    pub source: EntitlementSource,
}

/// Entitlement resolver.
#[derive(Clone)]
pub struct EntitlementResolver {
    api: Arc<dyn SubscriptionApi>,
    cache: EntitlementCache,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
}

impl fmt::Debug for EntitlementResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitlementResolver")
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl EntitlementResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        api: Arc<dyn SubscriptionApi>,
        cache: EntitlementCache,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            clock,
            fetch_timeout,
        }
    }

    /// The cache this resolver writes through to
    #[must_use]
    pub const fn cache(&self) -> &EntitlementCache {
        &self.cache
    }

    /// Resolve the user's entitlement.
    pub async fn resolve(&self, user: &UserId, is_new_registration: bool) -> EntitlementRecord {
        self.resolve_with_source(user, is_new_registration)
            .await
            .record
    }

    /// Resolve the user's entitlement and report which source won.
    #[tracing::instrument(skip(self), fields(user = %user))]
    pub async fn resolve_with_source(&self, user: &UserId, is_new_registration: bool) -> Resolution {
        if is_new_registration {
            self.cache.clear(user).await;
            tracing::info!("New registration; entitlement reset");
            return Resolution {
                record: EntitlementRecord::None,
                source: EntitlementSource::NewRegistration,
            };
        }

        let now = self.clock.now();
        let resolved = FallbackChain::new()
            .source_with_timeout(
                "remote",
                self.fetch_timeout,
                TrackerError::Timeout,
                self.fetch_remote(user, now),
            )
            .source("cache", self.load_cached(user, now))
            .resolve_or("default", EntitlementRecord::None)
            .await;

        let source = EntitlementSource::from_label(resolved.source);
        let record = resolved.value;

        if source == EntitlementSource::Remote {
            self.write_through(user, &record).await;
        }

        tracing::info!(kind = record.kind().as_str(), %source, "Entitlement resolved");
        Resolution { record, source }
    }

    /// Submit a subscription and return the resulting entitlement.
    ///
    /// The created record is classified like a read and written to the cache.
    ///
    /// # Errors
    ///
    /// Returns the remote failure, [`TrackerError::Timeout`] when the call
    /// exceeds the fetch budget, or [`TrackerError::Invalid`] when the created
    /// record asserts no entitlement. The cache is untouched on error.
    #[tracing::instrument(skip(self, request), fields(user = %user))]
    pub async fn submit(
        &self,
        user: &UserId,
        request: CreateSubscription,
    ) -> Result<EntitlementRecord, TrackerError> {
        let remote = tokio::time::timeout(
            self.fetch_timeout,
            self.api.create_subscription(user, request),
        )
        .await
        .map_err(|_| TrackerError::Timeout)??;

        let record = classify(&remote, self.clock.now());
        if record == EntitlementRecord::None {
            return Err(TrackerError::Invalid(
                "created subscription asserts no entitlement".to_string(),
            ));
        }

        self.write_through(user, &record).await;
        tracing::info!(kind = record.kind().as_str(), "Subscription submitted");
        Ok(record)
    }

    async fn write_through(&self, user: &UserId, record: &EntitlementRecord) {
        match record {
            EntitlementRecord::None => self.cache.clear(user).await,
            _ => self.cache.save(user, record).await,
        }
    }

    async fn fetch_remote(
        &self,
        user: &UserId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<EntitlementRecord, TrackerError> {
        match self.api.fetch_subscription(user).await {
            Ok(remote) => Ok(classify(&remote, now)),
            Err(error) if error.is_not_found_like() => {
                if matches!(error, TrackerError::Invalid(_)) {
                    tracing::warn!(%error, "Invalid subscription payload; treating as none");
                } else {
                    tracing::debug!("No subscription on record");
                }
                Ok(EntitlementRecord::None)
            },
            Err(error) => Err(error),
        }
    }

    async fn load_cached(
        &self,
        user: &UserId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<EntitlementRecord, TrackerError> {
        match self.cache.load(user).await {
            Some(EntitlementRecord::None) | None => Err(TrackerError::NotFound),
            Some(record) if record.is_well_formed(now) => Ok(record),
            Some(record) => {
                tracing::debug!(kind = record.kind().as_str(), "Cached entitlement no longer valid");
                Err(TrackerError::Invalid("stale cached entitlement".to_string()))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entitlement::{PaymentDetails, SubscriptionRecord};
    use crate::mocks::{InMemoryKeyValueStore, MockSubscriptionApi};
    use chrono::Duration as ChronoDuration;
    use ridesync_testing::{ManualClock, test_clock};

    struct Fixture {
        api: Arc<MockSubscriptionApi>,
        store: Arc<InMemoryKeyValueStore>,
        clock: Arc<ManualClock>,
        resolver: EntitlementResolver,
    }

    fn fixture() -> Fixture {
        let api = Arc::new(MockSubscriptionApi::new());
        let store = Arc::new(InMemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let resolver = EntitlementResolver::new(
            Arc::clone(&api) as Arc<dyn SubscriptionApi>,
            EntitlementCache::new(Arc::clone(&store) as Arc<dyn crate::providers::KeyValueStore>),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_millis(50),
        );
        Fixture {
            api,
            store,
            clock,
            resolver,
        }
    }

    fn user() -> UserId {
        UserId::new("u1")
    }

    fn pending_record() -> EntitlementRecord {
        EntitlementRecord::Pending {
            vehicle_class: None,
            plan_id: None,
            reference_number: "R123".into(),
            submitted_at: None,
        }
    }

    fn verified_remote(clock: &ManualClock) -> SubscriptionRecord {
        SubscriptionRecord {
            verified: Some(true),
            plan_id: Some("monthly".into()),
            expiry_date: Some(clock.now() + ChronoDuration::days(30)),
            ..SubscriptionRecord::default()
        }
    }

    #[tokio::test]
    async fn remote_verified_is_persisted() {
        let f = fixture();
        f.api.respond_with(Ok(verified_remote(&f.clock)));

        let resolution = f.resolver.resolve_with_source(&user(), false).await;

        assert!(resolution.record.is_active(f.clock.now()));
        assert_eq!(resolution.source, EntitlementSource::Remote);
        assert_eq!(f.resolver.cache().load(&user()).await, Some(resolution.record));
    }

    #[tokio::test]
    async fn not_found_clears_cache() {
        let f = fixture();
        f.resolver.cache().save(&user(), &pending_record()).await;
        f.api.respond_with(Err(TrackerError::NotFound));

        let resolution = f.resolver.resolve_with_source(&user(), false).await;

        assert_eq!(resolution.record, EntitlementRecord::None);
        assert_eq!(resolution.source, EntitlementSource::Remote);
        assert!(!f.store.contains("subscription/u1"));
    }

    #[tokio::test]
    async fn transient_failure_falls_back_to_cache() {
        let f = fixture();
        f.resolver.cache().save(&user(), &pending_record()).await;
        f.api
            .respond_with(Err(TrackerError::Transient("502 bad gateway".into())));

        let resolution = f.resolver.resolve_with_source(&user(), false).await;

        assert_eq!(resolution.record, pending_record());
        assert_eq!(resolution.source, EntitlementSource::Cache);
    }

    #[tokio::test]
    async fn timeout_without_cache_is_none() {
        let f = fixture();
        f.api.respond_with(Ok(verified_remote(&f.clock)));
        f.api.set_latency(Duration::from_secs(5));

        let started = std::time::Instant::now();
        let resolution = f.resolver.resolve_with_source(&user(), false).await;

        assert_eq!(resolution.record, EntitlementRecord::None);
        assert_eq!(resolution.source, EntitlementSource::Default);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn expired_cached_verified_is_not_trusted() {
        let f = fixture();
        f.api.respond_with(Ok(verified_remote(&f.clock)));
        let verified = f.resolver.resolve(&user(), false).await;
        assert!(verified.is_active(f.clock.now()));

        f.clock.advance(ChronoDuration::days(31));
        f.api.respond_with(Err(TrackerError::Timeout));

        assert_eq!(f.resolver.resolve(&user(), false).await, EntitlementRecord::None);
    }

    #[tokio::test]
    async fn new_registration_ignores_everything() {
        let f = fixture();
        f.resolver.cache().save(&user(), &pending_record()).await;
        f.api.respond_with(Ok(verified_remote(&f.clock)));

        let resolution = f.resolver.resolve_with_source(&user(), true).await;

        assert_eq!(resolution.record, EntitlementRecord::None);
        assert_eq!(resolution.source, EntitlementSource::NewRegistration);
        assert_eq!(f.api.fetch_count(), 0);
        assert!(!f.store.contains("subscription/u1"));
    }

    #[tokio::test]
    async fn submit_persists_pending() {
        let f = fixture();
        f.api.create_responds_with(Ok(SubscriptionRecord {
            pending: Some(true),
            payment_details: Some(PaymentDetails {
                reference_number: Some("R777".into()),
                payment_date: None,
            }),
            ..SubscriptionRecord::default()
        }));

        let record = f
            .resolver
            .submit(
                &user(),
                CreateSubscription {
                    plan_id: "weekly".into(),
                    vehicle_type: "jeep".into(),
                    reference_number: "R777".into(),
                    payment_method: "gcash".into(),
                    discount: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(&record, EntitlementRecord::Pending { reference_number, .. } if reference_number == "R777"));
        assert_eq!(f.resolver.cache().load(&user()).await, Some(record));
    }

    #[tokio::test]
    async fn failed_submit_leaves_cache_untouched() {
        let f = fixture();
        f.resolver.cache().save(&user(), &pending_record()).await;
        f.api
            .create_responds_with(Err(TrackerError::Transient("503".into())));

        let request = CreateSubscription {
            plan_id: "weekly".into(),
            vehicle_type: "jeep".into(),
            reference_number: "R1".into(),
            payment_method: "card".into(),
            discount: None,
        };
        assert!(f.resolver.submit(&user(), request).await.is_err());
        assert_eq!(f.resolver.cache().load(&user()).await, Some(pending_record()));
    }
}
