//! A ride driven end to end through the client and the realtime channel.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{deliver, harness, jeep, now, passenger, terminal, verified_remote, wait_for_state};
use ridesync_client::error::TrackerError;
use ridesync_client::realtime::Frame;
use ridesync_client::types::{Coordinates, DriverId, RideId};
use ridesync_client::{RideRequestError, RideStatus};
use serde_json::json;

fn frame(event: &str, data: serde_json::Value) -> Frame {
    Frame {
        event: event.to_string(),
        data,
    }
}

#[tokio::test]
async fn ride_runs_from_request_to_quiescent_reset() {
    let h = harness();
    h.subscriptions.respond_with(Ok(verified_remote()));

    let record = h.client.start_session(passenger(), "token", false).await.unwrap();
    assert!(record.is_active(now()));

    let ride_id = h.client.request_ride(terminal(), jeep()).await.unwrap();
    assert_eq!(ride_id, RideId::new("ride-1"));
    assert_eq!(h.client.ride().await.status, RideStatus::Waiting);
    assert_eq!(h.rides.submitted().len(), 1);

    let mut states = h.client.subscribe();

    deliver(
        &h.transport,
        frame("driver_assigned", json!({ "rideId": "ride-1", "driverId": "D9" })),
    )
    .await;
    let state = wait_for_state(&mut states, |s| s.ride.status == RideStatus::Assigned).await;
    assert_eq!(state.ride.assigned_driver_id, Some(DriverId::new("D9")));

    deliver(
        &h.transport,
        frame(
            "driver_location",
            json!({ "rideId": "ride-1", "driverId": "D9", "coordinates": { "lat": 14.6, "lng": 121.0 }, "eta": 4 }),
        ),
    )
    .await;
    let state = wait_for_state(&mut states, |s| {
        s.ride
            .vehicle_snapshot
            .as_ref()
            .is_some_and(|v| v.coordinates.is_some())
    })
    .await;
    let snapshot = state.ride.vehicle_snapshot.unwrap();
    assert_eq!(snapshot.coordinates, Some(Coordinates::new(14.6, 121.0)));
    assert_eq!(snapshot.eta, Some(4));

    deliver(
        &h.transport,
        frame("ride_status_update", json!({ "rideId": "ride-1", "status": "picked_up" })),
    )
    .await;
    wait_for_state(&mut states, |s| s.ride.status == RideStatus::PickedUp).await;

    deliver(
        &h.transport,
        frame("ride_status_update", json!({ "rideId": "ride-1", "status": "completed" })),
    )
    .await;
    wait_for_state(&mut states, |s| s.ride.status == RideStatus::Completed).await;

    let state = wait_for_state(&mut states, |s| s.ride.status == RideStatus::None).await;
    assert_eq!(state.ride.id, None);
    assert_eq!(state.ride.assigned_driver_id, None);
}

#[tokio::test]
async fn ride_request_without_subscription_is_refused() {
    let h = harness();

    let record = h.client.start_session(passenger(), "token", false).await.unwrap();
    assert_eq!(record, ridesync_client::EntitlementRecord::None);

    let error = h.client.request_ride(terminal(), jeep()).await.unwrap_err();
    assert_eq!(error, RideRequestError::NotEntitled);
    assert_eq!(h.client.ride().await.status, RideStatus::None);
    assert!(h.rides.submitted().is_empty());
}

#[tokio::test]
async fn failed_submission_reverts_to_idle() {
    let h = harness();
    h.subscriptions.respond_with(Ok(verified_remote()));
    h.rides
        .respond_with(Err(TrackerError::Transient("dispatch unavailable".into())));
    h.client.start_session(passenger(), "token", false).await.unwrap();

    let error = h.client.request_ride(terminal(), jeep()).await.unwrap_err();
    assert!(matches!(
        error,
        RideRequestError::SubmissionFailed { retryable: true, .. }
    ));

    let ride = h.client.ride().await;
    assert_eq!(ride.status, RideStatus::None);
    assert_eq!(ride.last_error, Some(error));

    // The user may retry straight away.
    h.rides.respond_with(Ok(()));
    let ride_id = h.client.request_ride(terminal(), jeep()).await.unwrap();
    assert_eq!(ride_id, RideId::new("ride-2"));
}

#[tokio::test]
async fn second_request_while_active_is_refused() {
    let h = harness();
    h.subscriptions.respond_with(Ok(verified_remote()));
    h.client.start_session(passenger(), "token", false).await.unwrap();

    h.client.request_ride(terminal(), jeep()).await.unwrap();
    let error = h.client.request_ride(terminal(), jeep()).await.unwrap_err();

    assert_eq!(error, RideRequestError::RideInProgress);
    assert_eq!(h.client.ride().await.id, Some(RideId::new("ride-1")));
}

#[tokio::test]
async fn cancel_while_waiting_reaches_the_backend() {
    let h = harness();
    h.subscriptions.respond_with(Ok(verified_remote()));
    h.client.start_session(passenger(), "token", false).await.unwrap();
    h.client.request_ride(terminal(), jeep()).await.unwrap();

    let mut states = h.client.subscribe();
    h.client.cancel_ride().await.unwrap();

    let state = wait_for_state(&mut states, |s| s.ride.status == RideStatus::Cancelled).await;
    assert!(state.ride.cancel_reason.is_some());

    wait_for_state(&mut states, |s| s.ride.status == RideStatus::None).await;
    assert_eq!(h.rides.cancelled(), vec![RideId::new("ride-1")]);
}

#[tokio::test]
async fn server_cancellation_carries_its_reason() {
    let h = harness();
    h.subscriptions.respond_with(Ok(verified_remote()));
    h.client.start_session(passenger(), "token", false).await.unwrap();
    h.client.request_ride(terminal(), jeep()).await.unwrap();

    let mut states = h.client.subscribe();
    deliver(
        &h.transport,
        frame(
            "ride_status_update",
            json!({ "rideId": "ride-1", "status": "cancelled", "reason": "No drivers nearby" }),
        ),
    )
    .await;

    let state = wait_for_state(&mut states, |s| s.ride.status == RideStatus::Cancelled).await;
    assert_eq!(state.ride.cancel_reason.as_deref(), Some("No drivers nearby"));
    assert!(h.rides.cancelled().is_empty());
}
