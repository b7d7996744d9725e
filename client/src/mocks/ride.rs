//! Mock ride API.

use super::lock;
use crate::error::Result;
use crate::providers::{RideApi, RideRequest};
use crate::types::RideId;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct Script {
    submit: Result<()>,
    latency: Duration,
    submitted: Vec<RideRequest>,
    cancelled: Vec<RideId>,
}

/// Scripted [`RideApi`]; accepts every request by default.
#[derive(Debug, Clone)]
pub struct MockRideApi {
    script: Arc<Mutex<Script>>,
}

impl Default for MockRideApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRideApi {
    /// Create a mock that accepts every submission.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                submit: Ok(()),
                latency: Duration::ZERO,
                submitted: Vec::new(),
                cancelled: Vec::new(),
            })),
        }
    }

    /// Answer every submission with `response`.
    pub fn respond_with(&self, response: Result<()>) {
        lock(&self.script).submit = response;
    }

    /// Delay every submission.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = latency;
    }

    /// Submissions received, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<RideRequest> {
        lock(&self.script).submitted.clone()
    }

    /// Cancellations received, in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<RideId> {
        lock(&self.script).cancelled.clone()
    }
}

impl RideApi for MockRideApi {
    fn submit_ride(&self, request: RideRequest) -> BoxFuture<'_, Result<()>> {
        let (response, latency) = {
            let mut script = lock(&self.script);
            script.submitted.push(request);
            (script.submit.clone(), script.latency)
        };

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            response
        })
    }

    fn cancel_ride(&self, ride_id: &RideId) -> BoxFuture<'_, Result<()>> {
        lock(&self.script).cancelled.push(ride_id.clone());
        Box::pin(async { Ok(()) })
    }
}
