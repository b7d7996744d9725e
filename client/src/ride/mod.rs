//! Ride session state machine.
//!
//! ```text
//!            requestRide                driver_assigned
//!   NONE ───────────────▶ WAITING ──────────────────────▶ ASSIGNED
//!    ▲                     │  │                              │   │
//!    │      submit failed  │  │ cancel / cancelled           │   │ picked_up
//!    ├─────────────────────┘  ▼                              │   ▼
//!    │                    CANCELLED ◀──── cancelled ─────────┴─ PICKED_UP
//!    │                        │                              │   │
//!    │   quiescent delay      │          completed           ▼   ▼
//!    └────────────────────────┴──────────────────────────── COMPLETED
//! ```
//!
//! Events for any ride other than the active one are ignored, and repeated
//! events are no-ops, so redelivery after a reconnect is harmless.

pub mod reducer;

use crate::error::RideRequestError;
use crate::providers::RideApi;
use crate::realtime::{DriverAssigned, DriverLocation, RideStatusUpdate};
use crate::types::{Destination, DriverId, RideId, VehicleClass, VehicleSnapshot};
use ridesync_core::IdGenerator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use reducer::RideReducer;

/// Lifecycle status of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    /// No active ride
    #[default]
    None,
    /// Requested, waiting for a driver
    Waiting,
    /// Driver on the way
    Assigned,
    /// Passenger on board
    PickedUp,
    /// Finished
    Completed,
    /// Cancelled
    Cancelled,
}

impl RideStatus {
    /// `COMPLETED` or `CANCELLED`
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// `ASSIGNED` or `PICKED_UP`
    #[must_use]
    pub const fn has_driver(self) -> bool {
        matches!(self, Self::Assigned | Self::PickedUp)
    }

    /// Uppercase label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Waiting => "WAITING",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user's one active ride.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideSession {
    /// Ride id (`None` while idle)
    pub id: Option<RideId>,
    /// Lifecycle status
    pub status: RideStatus,
    /// Requested destination
    pub destination: Option<Destination>,
    /// Requested vehicle class
    pub vehicle_class: Option<VehicleClass>,
    /// Assigned driver
    pub assigned_driver_id: Option<DriverId>,
    /// Assigned vehicle as last reported
    pub vehicle_snapshot: Option<VehicleSnapshot>,
    /// Why the ride was cancelled
    pub cancel_reason: Option<String>,
    /// Last failed request, kept until the next request
    pub last_error: Option<RideRequestError>,
}

impl RideSession {
    /// Whether `ride_id` is the active ride
    #[must_use]
    pub fn is_active(&self, ride_id: &RideId) -> bool {
        self.status != RideStatus::None && self.id.as_ref() == Some(ride_id)
    }
}

/// Inputs to the ride state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RideAction {
    // Commands
    /// User asks for a ride
    RequestRide {
        /// Where to
        destination: Destination,
        /// Vehicle class
        vehicle_class: VehicleClass,
    },
    /// User cancels while waiting
    CancelRide,
    /// Drop the session unconditionally (sign-out)
    Reset,

    // Results
    /// Backend accepted the request
    RideRequestConfirmed {
        /// The submitted ride
        ride_id: RideId,
    },
    /// Backend rejected the request, or it timed out
    RideRequestFailed {
        /// The submitted ride
        ride_id: RideId,
        /// Why
        error: RideRequestError,
    },
    /// Request refused before submission
    RideRequestRejected {
        /// Why
        error: RideRequestError,
    },
    /// Quiescent delay after a terminal state has elapsed
    QuiescenceElapsed {
        /// The ride that reached the terminal state
        ride_id: RideId,
    },

    // Events
    /// `driver_assigned`
    DriverAssigned(DriverAssigned),
    /// `ride_status_update`
    StatusUpdated(RideStatusUpdate),
    /// `driver_location`
    DriverLocationUpdated(DriverLocation),
}

/// Dependencies of [`RideReducer`].
#[derive(Clone)]
pub struct RideEnvironment {
    /// Ride endpoints
    pub rides: Arc<dyn RideApi>,
    /// Ride id source
    pub ids: Arc<dyn IdGenerator>,
    /// Budget for submitting a request
    pub request_timeout: Duration,
    /// How long terminal states stay visible
    pub quiescent_delay: Duration,
}

impl fmt::Debug for RideEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RideEnvironment")
            .field("request_timeout", &self.request_timeout)
            .field("quiescent_delay", &self.quiescent_delay)
            .finish_non_exhaustive()
    }
}

/// Ride ids as random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
