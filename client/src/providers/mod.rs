//! Collaborator traits.
//!
//! Every remote or persistent dependency sits behind an object-safe trait so
//! the environment can hold `Arc<dyn ...>` and tests can swap in the in-memory
//! implementations from [`crate::mocks`].

pub mod http;
pub mod websocket;

use crate::entitlement::{CreateSubscription, SubscriptionRecord};
use crate::error::{CacheError, ChannelError, Result};
use crate::realtime::{ChannelIdentity, Frame};
use crate::types::{Coordinates, Destination, RideId, UserId, VehicleClass, VehicleSnapshot};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use http::RestClient;
pub use websocket::WebSocketTransport;

/// Remote subscription endpoints.
pub trait SubscriptionApi: Send + Sync {
    /// Read the authoritative subscription record.
    ///
    /// Returns [`crate::error::TrackerError::NotFound`] for users without one.
    fn fetch_subscription(&self, user: &UserId) -> BoxFuture<'_, Result<SubscriptionRecord>>;

    /// Create a subscription (payment submission).
    fn create_subscription(
        &self,
        user: &UserId,
        request: CreateSubscription,
    ) -> BoxFuture<'_, Result<SubscriptionRecord>>;
}

/// Body of a ride request submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    /// Client-generated ride id
    pub ride_id: RideId,
    /// Where to go
    pub destination: Destination,
    /// Vehicle class requested
    pub vehicle_class: VehicleClass,
}

/// Remote ride endpoints.
pub trait RideApi: Send + Sync {
    /// Submit a ride request.
    fn submit_ride(&self, request: RideRequest) -> BoxFuture<'_, Result<()>>;

    /// Cancel a ride that has not been assigned yet.
    fn cancel_ride(&self, ride_id: &RideId) -> BoxFuture<'_, Result<()>>;
}

/// Source of nearby vehicle positions.
pub trait VehicleSource: Send + Sync {
    /// Vehicles within `radius_km` of `location`.
    fn nearby_vehicles(
        &self,
        location: Coordinates,
        radius_km: f64,
    ) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>>>;
}

/// Namespaced string key/value store holding JSON blobs.
///
/// Must survive process restarts in production.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> BoxFuture<'_, std::result::Result<Option<String>, CacheError>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: String) -> BoxFuture<'_, std::result::Result<(), CacheError>>;

    /// Delete a value; deleting a missing key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'_, std::result::Result<(), CacheError>>;
}

/// Stream of decoded frames from one physical connection.
///
/// The stream ends (or yields an error) when the connection drops.
pub type FrameStream = BoxStream<'static, std::result::Result<Frame, ChannelError>>;

/// Opens realtime connections.
pub trait EventTransport: Send + Sync {
    /// Open one connection for `identity`.
    fn open(&self, identity: &ChannelIdentity) -> BoxFuture<'_, std::result::Result<FrameStream, ChannelError>>;
}
