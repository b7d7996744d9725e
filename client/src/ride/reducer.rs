//! Ride session reducer.

use super::{RideAction, RideEnvironment, RideSession, RideStatus};
use crate::error::RideRequestError;
use crate::providers::RideRequest;
use crate::realtime::{DriverAssigned, DriverLocation, RemoteRideStatus, RideStatusUpdate};
use crate::types::{Destination, RideId, VehicleClass, VehicleId, VehicleSnapshot};
use ridesync_core::effect::Effect;
use ridesync_core::reducer::Reducer;
use ridesync_core::{SmallVec, async_effect, delay, smallvec};
use ridesync_runtime::retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;
use std::time::Duration;

type Effects = SmallVec<[Effect<RideAction>; 4]>;

/// Reason recorded when the passenger cancels.
pub const PASSENGER_CANCEL_REASON: &str = "Cancelled by passenger";

/// Backoff for forwarding a passenger cancel to the backend.
const CANCEL_RETRY: RetryPolicy = RetryPolicy::builder()
    .max_retries(2)
    .initial_delay(Duration::from_millis(250))
    .build();

/// Ride session reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RideReducer;

impl RideReducer {
    fn enter(state: &mut RideSession, to: RideStatus) {
        tracing::info!(
            ride_id = ?state.id,
            from = %state.status,
            to = %to,
            "Ride transition"
        );
        metrics::counter!("ride.transitions", "to" => to.as_str()).increment(1);
        state.status = to;
    }

    fn none() -> Effects {
        smallvec![Effect::None]
    }

    fn reject(error: RideRequestError) -> Effects {
        tracing::info!(%error, "Ride request rejected");
        smallvec![async_effect! {
            Some(RideAction::RideRequestRejected { error })
        }]
    }

    fn quiescence(ride_id: RideId, env: &RideEnvironment) -> Effect<RideAction> {
        delay! {
            duration: env.quiescent_delay,
            action: RideAction::QuiescenceElapsed { ride_id }
        }
    }

    fn request_ride(
        state: &mut RideSession,
        destination: Destination,
        vehicle_class: VehicleClass,
        env: &RideEnvironment,
    ) -> Effects {
        if state.status != RideStatus::None {
            return Self::reject(RideRequestError::RideInProgress);
        }
        if let Err(reason) = destination.validate() {
            return Self::reject(RideRequestError::InvalidDestination(reason));
        }

        let ride_id = RideId::new(env.ids.next_id());
        *state = RideSession {
            id: Some(ride_id.clone()),
            destination: Some(destination.clone()),
            vehicle_class: Some(vehicle_class.clone()),
            ..RideSession::default()
        };
        Self::enter(state, RideStatus::Waiting);

        let rides = Arc::clone(&env.rides);
        let timeout = env.request_timeout;
        let request = RideRequest {
            ride_id: ride_id.clone(),
            destination,
            vehicle_class,
        };

        smallvec![async_effect! {
            let outcome = tokio::time::timeout(timeout, rides.submit_ride(request)).await;
            let reason = match outcome {
                Ok(Ok(())) => return Some(RideAction::RideRequestConfirmed { ride_id }),
                Ok(Err(error)) => error.to_string(),
                Err(_) => "ride request timed out".to_string(),
            };
            Some(RideAction::RideRequestFailed {
                ride_id,
                error: RideRequestError::SubmissionFailed {
                    reason,
                    retryable: true,
                },
            })
        }]
    }

    fn cancel_ride(state: &mut RideSession, env: &RideEnvironment) -> Effects {
        let (RideStatus::Waiting, Some(ride_id)) = (state.status, state.id.clone()) else {
            tracing::debug!(status = %state.status, "Nothing to cancel");
            return Self::none();
        };

        state.cancel_reason = Some(PASSENGER_CANCEL_REASON.to_string());
        Self::enter(state, RideStatus::Cancelled);

        let rides = Arc::clone(&env.rides);
        let cancelled = ride_id.clone();
        smallvec![
            async_effect! {
                let forwarded = retry_with_backoff(&CANCEL_RETRY, || rides.cancel_ride(&cancelled)).await;
                if let Err(error) = forwarded {
                    tracing::warn!(ride_id = %cancelled, %error, "Backend cancel failed");
                }
                None
            },
            Self::quiescence(ride_id, env),
        ]
    }

    fn driver_assigned(state: &mut RideSession, event: DriverAssigned) -> Effects {
        match state.status {
            RideStatus::Waiting => {
                state.vehicle_snapshot = Some(event.vehicle_snapshot());
                state.assigned_driver_id = Some(event.driver_id);
                Self::enter(state, RideStatus::Assigned);
            },
            RideStatus::Assigned if state.assigned_driver_id.as_ref() == Some(&event.driver_id) => {
                tracing::debug!(driver_id = %event.driver_id, "Duplicate driver assignment");
            },
            RideStatus::Assigned => {
                tracing::info!(driver_id = %event.driver_id, "Driver reassigned");
                state.vehicle_snapshot = Some(event.vehicle_snapshot());
                state.assigned_driver_id = Some(event.driver_id);
            },
            status => {
                tracing::debug!(%status, "Ignoring driver assignment");
            },
        }
        Self::none()
    }

    fn status_updated(
        state: &mut RideSession,
        event: RideStatusUpdate,
        env: &RideEnvironment,
    ) -> Effects {
        match (event.status, state.status) {
            (RemoteRideStatus::PickedUp, RideStatus::Assigned) => {
                Self::enter(state, RideStatus::PickedUp);
                Self::none()
            },
            (RemoteRideStatus::Completed, RideStatus::Assigned | RideStatus::PickedUp) => {
                Self::enter(state, RideStatus::Completed);
                smallvec![Self::quiescence(event.ride_id, env)]
            },
            (
                RemoteRideStatus::Cancelled,
                RideStatus::Waiting | RideStatus::Assigned | RideStatus::PickedUp,
            ) => {
                state.cancel_reason = Some(event.reason.unwrap_or_else(|| "Cancelled".to_string()));
                Self::enter(state, RideStatus::Cancelled);
                smallvec![Self::quiescence(event.ride_id, env)]
            },
            (remote, status) => {
                tracing::debug!(?remote, %status, "Ignoring ride status update");
                Self::none()
            },
        }
    }

    fn driver_moved(state: &mut RideSession, event: DriverLocation) -> Effects {
        if !state.status.has_driver() {
            tracing::debug!(status = %state.status, "Ignoring driver location");
            return Self::none();
        }
        if event
            .driver_id
            .as_ref()
            .is_some_and(|driver| state.assigned_driver_id.as_ref() != Some(driver))
        {
            tracing::debug!("Ignoring location from unassigned driver");
            return Self::none();
        }
        if !event.coordinates.is_valid() {
            tracing::warn!(coordinates = ?event.coordinates, "Ignoring invalid driver location");
            return Self::none();
        }

        let previous = state.vehicle_snapshot.take().unwrap_or_else(|| {
            let driver = state.assigned_driver_id.as_ref().map_or("", |d| d.as_str());
            VehicleSnapshot::placeholder(VehicleId::new(driver))
        });
        state.vehicle_snapshot = Some(VehicleSnapshot {
            coordinates: Some(event.coordinates),
            eta: event.eta.or(previous.eta),
            ..previous
        });
        Self::none()
    }
}

impl Reducer for RideReducer {
    type State = RideSession;
    type Action = RideAction;
    type Environment = RideEnvironment;

    fn reduce(
        &self,
        state: &mut RideSession,
        action: RideAction,
        env: &RideEnvironment,
    ) -> Effects {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Commands
            // ═══════════════════════════════════════════════════════════════
            RideAction::RequestRide {
                destination,
                vehicle_class,
            } => Self::request_ride(state, destination, vehicle_class, env),

            RideAction::CancelRide => Self::cancel_ride(state, env),

            RideAction::Reset => {
                if state.status != RideStatus::None {
                    Self::enter(state, RideStatus::None);
                }
                *state = RideSession::default();
                Self::none()
            },

            // ═══════════════════════════════════════════════════════════════
            // Results
            // ═══════════════════════════════════════════════════════════════
            RideAction::RideRequestConfirmed { ride_id } => {
                tracing::debug!(%ride_id, active = state.is_active(&ride_id), "Ride request confirmed");
                Self::none()
            },

            RideAction::RideRequestFailed { ride_id, error } => {
                if state.is_active(&ride_id) && state.status == RideStatus::Waiting {
                    tracing::warn!(%ride_id, %error, "Ride request failed; reverting");
                    Self::enter(state, RideStatus::None);
                    *state = RideSession {
                        last_error: Some(error),
                        ..RideSession::default()
                    };
                } else {
                    tracing::debug!(%ride_id, "Ignoring failure for inactive ride");
                }
                Self::none()
            },

            RideAction::RideRequestRejected { error } => {
                state.last_error = Some(error);
                Self::none()
            },

            RideAction::QuiescenceElapsed { ride_id } => {
                if state.is_active(&ride_id) && state.status.is_terminal() {
                    Self::enter(state, RideStatus::None);
                    *state = RideSession::default();
                }
                Self::none()
            },

            // ═══════════════════════════════════════════════════════════════
            // Realtime events (ignored unless they target the active ride)
            // ═══════════════════════════════════════════════════════════════
            RideAction::DriverAssigned(event) if state.is_active(&event.ride_id) => {
                Self::driver_assigned(state, event)
            },
            RideAction::StatusUpdated(event) if state.is_active(&event.ride_id) => {
                Self::status_updated(state, event, env)
            },
            RideAction::DriverLocationUpdated(event) if state.is_active(&event.ride_id) => {
                Self::driver_moved(state, event)
            },
            RideAction::DriverAssigned(_)
            | RideAction::StatusUpdated(_)
            | RideAction::DriverLocationUpdated(_) => {
                tracing::debug!(active = ?state.id, "Ignoring stale ride event");
                Self::none()
            },
        }
    }
}
