//! Mock subscription API.

use super::lock;
use crate::entitlement::{CreateSubscription, SubscriptionRecord};
use crate::error::{Result, TrackerError};
use crate::providers::SubscriptionApi;
use crate::types::UserId;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct Script {
    fetch: Result<SubscriptionRecord>,
    create: Result<SubscriptionRecord>,
    latency: Duration,
    created: Vec<(UserId, CreateSubscription)>,
}

/// Scripted [`SubscriptionApi`].
///
/// Answers `NotFound` until told otherwise.
#[derive(Debug, Clone)]
pub struct MockSubscriptionApi {
    script: Arc<Mutex<Script>>,
    fetches: Arc<AtomicUsize>,
}

impl Default for MockSubscriptionApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSubscriptionApi {
    /// Create a mock with no subscription on record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                fetch: Err(TrackerError::NotFound),
                create: Err(TrackerError::Transient("no create response scripted".into())),
                latency: Duration::ZERO,
                created: Vec::new(),
            })),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every fetch with `response`.
    pub fn respond_with(&self, response: Result<SubscriptionRecord>) {
        lock(&self.script).fetch = response;
    }

    /// Answer every create with `response`.
    pub fn create_responds_with(&self, response: Result<SubscriptionRecord>) {
        lock(&self.script).create = response;
    }

    /// Delay every answer.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = latency;
    }

    /// Number of fetches made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Every create request received, in order.
    #[must_use]
    pub fn created(&self) -> Vec<(UserId, CreateSubscription)> {
        lock(&self.script).created.clone()
    }
}

impl SubscriptionApi for MockSubscriptionApi {
    fn fetch_subscription(&self, _user: &UserId) -> BoxFuture<'_, Result<SubscriptionRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (response, latency) = {
            let script = lock(&self.script);
            (script.fetch.clone(), script.latency)
        };

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            response
        })
    }

    fn create_subscription(
        &self,
        user: &UserId,
        request: CreateSubscription,
    ) -> BoxFuture<'_, Result<SubscriptionRecord>> {
        let (response, latency) = {
            let mut script = lock(&self.script);
            script.created.push((user.clone(), request));
            (script.create.clone(), script.latency)
        };

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            response
        })
    }
}
