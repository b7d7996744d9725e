//! Realtime event channel.
//!
//! Frames arrive as `{ "event": <name>, "data": { ... } }`. The channel decodes
//! them into [`ChannelEvent`]s and fans them out to per-kind listeners. Socket
//! callbacks are never handed to the state machine directly; events become
//! explicit actions instead.

pub mod channel;

use crate::error::ChannelError;
use crate::types::{Coordinates, DriverId, RideId, UserId, VehicleSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use channel::RealtimeChannel;

/// Raw frame envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    /// Build a frame from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Protocol`] if the payload cannot be encoded.
    pub fn new<T: Serialize>(kind: EventKind, data: &T) -> Result<Self, ChannelError> {
        Ok(Self {
            event: kind.as_str().to_string(),
            data: serde_json::to_value(data).map_err(|e| ChannelError::Protocol(e.to_string()))?,
        })
    }
}

/// Event types carried by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A driver accepted the ride
    DriverAssigned,
    /// Ride progressed (picked up, completed, cancelled)
    RideStatusUpdate,
    /// Assigned driver moved
    DriverLocation,
    /// Nearby vehicles changed
    VehicleUpdates,
}

impl EventKind {
    /// Every kind
    pub const ALL: [Self; 4] = [
        Self::DriverAssigned,
        Self::RideStatusUpdate,
        Self::DriverLocation,
        Self::VehicleUpdates,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DriverAssigned => "driver_assigned",
            Self::RideStatusUpdate => "ride_status_update",
            Self::DriverLocation => "driver_location",
            Self::VehicleUpdates => "vehicle_updates",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ChannelError::Protocol(format!("unknown event: {s}")))
    }
}

/// `driver_assigned` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAssigned {
    /// Ride the driver was assigned to
    pub ride_id: RideId,
    /// Assigned driver
    pub driver_id: DriverId,
    /// Vehicle details, if sent
    #[serde(default)]
    pub vehicle: Option<VehicleSnapshot>,
}

impl DriverAssigned {
    /// The vehicle snapshot to show, with placeholders for anything not sent
    #[must_use]
    pub fn vehicle_snapshot(&self) -> VehicleSnapshot {
        self.vehicle.clone().unwrap_or_else(|| {
            VehicleSnapshot::placeholder(crate::types::VehicleId::new(self.driver_id.as_str()))
        })
    }
}

/// Status carried by `ride_status_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRideStatus {
    /// Passenger is on board
    PickedUp,
    /// Ride finished
    Completed,
    /// Ride cancelled by driver, dispatch, or server
    Cancelled,
    /// Anything else (e.g. `"arriving"`); ignored by the state machine
    #[serde(other)]
    Other,
}

/// `ride_status_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStatusUpdate {
    /// Ride the update is for
    pub ride_id: RideId,
    /// New status
    pub status: RemoteRideStatus,
    /// Cancellation reason, if any
    #[serde(default)]
    pub reason: Option<String>,
}

/// `driver_location` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    /// Ride the driver is serving
    pub ride_id: RideId,
    /// Reporting driver, if sent
    #[serde(default)]
    pub driver_id: Option<DriverId>,
    /// New position
    pub coordinates: Coordinates,
    /// Updated ETA in minutes, if sent
    #[serde(default)]
    pub eta: Option<u32>,
}

/// `vehicle_updates` payload; its arrival is what matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdates {
    /// Area the update concerns, if sent
    #[serde(default)]
    pub area: Option<String>,
}

/// A decoded realtime event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// `driver_assigned`
    DriverAssigned(DriverAssigned),
    /// `ride_status_update`
    RideStatusUpdate(RideStatusUpdate),
    /// `driver_location`
    DriverLocation(DriverLocation),
    /// `vehicle_updates`
    VehicleUpdates(VehicleUpdates),
}

impl ChannelEvent {
    /// Event kind
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::DriverAssigned(_) => EventKind::DriverAssigned,
            Self::RideStatusUpdate(_) => EventKind::RideStatusUpdate,
            Self::DriverLocation(_) => EventKind::DriverLocation,
            Self::VehicleUpdates(_) => EventKind::VehicleUpdates,
        }
    }

    /// Decode a frame.
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Protocol`] when a known event has a malformed payload.
    pub fn decode(frame: Frame) -> Result<Option<Self>, ChannelError> {
        let Ok(kind) = frame.event.parse::<EventKind>() else {
            return Ok(None);
        };

        let protocol = |e: serde_json::Error| ChannelError::Protocol(format!("{kind}: {e}"));
        let event = match kind {
            EventKind::DriverAssigned => {
                Self::DriverAssigned(serde_json::from_value(frame.data).map_err(protocol)?)
            },
            EventKind::RideStatusUpdate => {
                Self::RideStatusUpdate(serde_json::from_value(frame.data).map_err(protocol)?)
            },
            EventKind::DriverLocation => {
                Self::DriverLocation(serde_json::from_value(frame.data).map_err(protocol)?)
            },
            EventKind::VehicleUpdates => {
                let data = if frame.data.is_null() {
                    VehicleUpdates::default()
                } else {
                    serde_json::from_value(frame.data).map_err(protocol)?
                };
                Self::VehicleUpdates(data)
            },
        };
        Ok(Some(event))
    }
}

/// Who the connection is for.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    /// Account id
    pub user_id: UserId,
    /// Bearer token
    pub token: String,
}

impl fmt::Debug for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelIdentity")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Connection state published for UI indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected and not trying
    #[default]
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Receiving events
    Connected,
    /// Connection lost; waiting to retry
    Reconnecting {
        /// Consecutive failed attempts
        attempt: usize,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_driver_assigned_without_vehicle() {
        let frame = Frame {
            event: "driver_assigned".into(),
            data: json!({ "rideId": "r1", "driverId": "D9" }),
        };

        let Some(ChannelEvent::DriverAssigned(event)) = ChannelEvent::decode(frame).unwrap() else {
            unreachable!()
        };
        assert_eq!(event.driver_id, DriverId::new("D9"));
        let snapshot = event.vehicle_snapshot();
        assert_eq!(snapshot.id.as_str(), "D9");
        assert_eq!(snapshot.coordinates, None);
    }

    #[test]
    fn unknown_status_is_other() {
        let frame = Frame {
            event: "ride_status_update".into(),
            data: json!({ "rideId": "r1", "status": "arriving" }),
        };
        assert!(matches!(
            ChannelEvent::decode(frame).unwrap(),
            Some(ChannelEvent::RideStatusUpdate(RideStatusUpdate {
                status: RemoteRideStatus::Other,
                ..
            }))
        ));
    }

    #[test]
    fn unknown_events_are_skipped() {
        let frame = Frame {
            event: "chat_message".into(),
            data: json!({}),
        };
        assert_eq!(ChannelEvent::decode(frame).unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_protocol_error() {
        let frame = Frame {
            event: "driver_location".into(),
            data: json!({ "rideId": "r1" }),
        };
        assert!(matches!(
            ChannelEvent::decode(frame),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let frame: Frame =
            serde_json::from_str(r#"{"event":"vehicle_updates","data":null}"#).unwrap();
        assert!(matches!(
            ChannelEvent::decode(frame).unwrap(),
            Some(ChannelEvent::VehicleUpdates(_))
        ));
    }
}
