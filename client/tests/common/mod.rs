//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ridesync_client::entitlement::SubscriptionRecord;
use ridesync_client::mocks::{
    InMemoryKeyValueStore, MockRideApi, MockSubscriptionApi, MockTransport, MockVehicleSource,
};
use ridesync_client::realtime::Frame;
use ridesync_client::types::{Coordinates, Destination, UserProfile, UserRole, VehicleClass};
use ridesync_client::{Collaborators, TrackerClient, TrackerConfig, TrackerState};
use ridesync_core::Clock;
use ridesync_runtime::retry::RetryPolicy;
use ridesync_testing::{SequentialIdGenerator, test_clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A client wired to mocks, plus handles to script them.
pub struct Harness {
    pub client: TrackerClient,
    pub subscriptions: MockSubscriptionApi,
    pub rides: MockRideApi,
    pub vehicles: MockVehicleSource,
    pub transport: MockTransport,
    pub store: InMemoryKeyValueStore,
}

/// Short timeouts so failure paths finish quickly.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig::default()
        .with_entitlement_fetch_timeout(Duration::from_millis(200))
        .with_ride_request_timeout(Duration::from_millis(200))
        .with_quiescent_delay(Duration::from_millis(50))
        .with_reconnect(
            RetryPolicy::builder()
                .unbounded()
                .initial_delay(Duration::from_millis(5))
                .max_delay(Duration::from_millis(20))
                .jitter(false)
                .build(),
        )
}

pub fn harness() -> Harness {
    harness_with(fast_config(), |collaborators| collaborators)
}

/// Build a harness; `customize` may add a dataset or swap collaborators.
pub fn harness_with<F>(config: TrackerConfig, customize: F) -> Harness
where
    F: FnOnce(Collaborators) -> Collaborators,
{
    let subscriptions = MockSubscriptionApi::new();
    let rides = MockRideApi::new();
    let vehicles = MockVehicleSource::new();
    let transport = MockTransport::new();
    let store = InMemoryKeyValueStore::new();

    let collaborators = Collaborators::new(
        Arc::new(subscriptions.clone()),
        Arc::new(rides.clone()),
        Arc::new(vehicles.clone()),
        Arc::new(transport.clone()),
        Arc::new(store.clone()),
    )
    .with_clock(Arc::new(test_clock()))
    .with_ids(Arc::new(SequentialIdGenerator::new("ride")));
    let collaborators = customize(collaborators);

    Harness {
        client: TrackerClient::new(config, collaborators),
        subscriptions,
        rides,
        vehicles,
        transport,
        store,
    }
}

pub fn now() -> DateTime<Utc> {
    test_clock().now()
}

pub fn passenger() -> UserProfile {
    UserProfile::new("u-1", UserRole::Passenger)
}

pub fn verified_remote() -> SubscriptionRecord {
    SubscriptionRecord {
        verified: Some(true),
        vehicle_type: Some("jeep".into()),
        plan_id: Some("monthly".into()),
        expiry_date: Some(now() + ChronoDuration::days(30)),
        ..SubscriptionRecord::default()
    }
}

pub fn terminal() -> Destination {
    Destination::new("Central Terminal", Coordinates::new(14.5995, 120.9842))
}

pub fn jeep() -> VehicleClass {
    VehicleClass::new("jeep")
}

/// Wait until `condition` holds for the published state.
pub async fn wait_for_state<F>(states: &mut watch::Receiver<TrackerState>, condition: F) -> TrackerState
where
    F: Fn(&TrackerState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let state = states.borrow_and_update();
                if condition(&state) {
                    return state.clone();
                }
            }
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap()
}

/// Push a frame once the realtime connection is up.
pub async fn deliver(transport: &MockTransport, frame: Frame) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !transport.push(frame.clone()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
