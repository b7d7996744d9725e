//! Dependencies injected into [`crate::reducer::TrackerReducer`].

use crate::config::TrackerConfig;
use crate::entitlement::{EntitlementCache, EntitlementResolver};
use crate::providers::{EventTransport, KeyValueStore, RideApi, SubscriptionApi, VehicleSource};
use crate::realtime::RealtimeChannel;
use crate::ride::{RideEnvironment, UuidIdGenerator};
use crate::vehicles::{StaticVehicleDataset, VehicleEnvironment};
use ridesync_core::{Clock, IdGenerator, SystemClock};
use std::fmt;
use std::sync::Arc;

/// Environment for the whole client.
#[derive(Clone)]
pub struct TrackerEnvironment {
    /// Entitlement resolution (remote, cache, default)
    pub resolver: Arc<EntitlementResolver>,
    /// Realtime event channel
    pub channel: Arc<RealtimeChannel>,
    /// Ride feature dependencies
    pub ride: RideEnvironment,
    /// Vehicle feed dependencies
    pub vehicles: VehicleEnvironment,
    /// Time source for entitlement checks
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for TrackerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerEnvironment")
            .field("resolver", &self.resolver)
            .field("channel", &self.channel)
            .field("ride", &self.ride)
            .field("vehicles", &self.vehicles)
            .finish_non_exhaustive()
    }
}

/// The external systems a client talks to.
///
/// Production wiring uses the REST, WebSocket, and file adapters; tests plug
/// in [`crate::mocks`].
#[derive(Clone)]
pub struct Collaborators {
    /// Subscription read/create
    pub subscriptions: Arc<dyn SubscriptionApi>,
    /// Ride submit/cancel
    pub rides: Arc<dyn RideApi>,
    /// Nearby vehicle query
    pub vehicles: Arc<dyn VehicleSource>,
    /// Realtime connections
    pub transport: Arc<dyn EventTransport>,
    /// Persistent cache
    pub store: Arc<dyn KeyValueStore>,
    /// Last-resort vehicle list
    pub dataset: Option<StaticVehicleDataset>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Ride id source
    pub ids: Arc<dyn IdGenerator>,
}

impl Collaborators {
    /// Collaborators with the system clock and UUID ride ids.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionApi>,
        rides: Arc<dyn RideApi>,
        vehicles: Arc<dyn VehicleSource>,
        transport: Arc<dyn EventTransport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            subscriptions,
            rides,
            vehicles,
            transport,
            store,
            dataset: None,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
        }
    }

    /// Use a static vehicle dataset as the last fallback
    #[must_use]
    pub fn with_dataset(mut self, dataset: StaticVehicleDataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Use a custom clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom ride id generator
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl TrackerEnvironment {
    /// Wire collaborators according to `config`.
    #[must_use]
    pub fn new(config: &TrackerConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            subscriptions,
            rides,
            vehicles,
            transport,
            store,
            dataset,
            clock,
            ids,
        } = collaborators;

        let resolver = EntitlementResolver::new(
            subscriptions,
            EntitlementCache::new(store),
            Arc::clone(&clock),
            config.entitlement_fetch_timeout,
        );

        Self {
            resolver: Arc::new(resolver),
            channel: Arc::new(RealtimeChannel::new(transport, config.reconnect.clone())),
            ride: RideEnvironment {
                rides,
                ids,
                request_timeout: config.ride_request_timeout,
                quiescent_delay: config.quiescent_delay,
            },
            vehicles: VehicleEnvironment {
                source: vehicles,
                dataset: dataset.map(Arc::new),
                radius_km: config.proximity_radius_km,
                min_movement_meters: config.min_movement_meters,
            },
            clock,
        }
    }
}
