//! UI-facing facade over the store.
//!
//! Every method sends an action and, where the UI needs an answer, waits for
//! the result action. State is observed through [`TrackerClient::subscribe`].

use crate::actions::{AccessToken, TrackerAction};
use crate::config::TrackerConfig;
use crate::entitlement::{CreateSubscription, EntitlementRecord};
use crate::environment::{Collaborators, TrackerEnvironment};
use crate::error::{RideRequestError, TrackerError};
use crate::providers::{RestClient, RideApi, SubscriptionApi, WebSocketTransport};
use crate::realtime::ConnectionStatus;
use crate::reducer::TrackerReducer;
use crate::ride::{RideAction, RideSession};
use crate::state::TrackerState;
use crate::stores::FileKeyValueStore;
use crate::types::{Coordinates, Destination, RideId, UserProfile, VehicleClass};
use crate::vehicles::{RefreshTrigger, StaticVehicleDataset, VehicleAction, VehicleFeedState};
use ridesync_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Slack on top of a remote budget when waiting for the result action.
const RESULT_GRACE: Duration = Duration::from_secs(1);

type TrackerStore = Store<TrackerState, TrackerAction, TrackerEnvironment, TrackerReducer>;

/// Tracking client.
///
/// # Example
///
/// ```no_run
/// use ridesync_client::{TrackerClient, TrackerConfig};
/// use ridesync_client::types::{UserProfile, UserRole};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TrackerClient::from_config(TrackerConfig::from_env()).await?;
/// let entitlement = client
///     .start_session(UserProfile::new("u-1", UserRole::Passenger), "token", false)
///     .await?;
/// println!("{}", entitlement.kind().as_str());
/// # Ok(())
/// # }
/// ```
pub struct TrackerClient {
    store: TrackerStore,
    config: TrackerConfig,
    rest: Option<RestClient>,
}

impl std::fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerClient")
            .field("config", &self.config)
            .field("rest", &self.rest)
            .finish_non_exhaustive()
    }
}

impl TrackerClient {
    /// Create a client over explicit collaborators.
    #[must_use]
    pub fn new(config: TrackerConfig, collaborators: Collaborators) -> Self {
        let env = TrackerEnvironment::new(&config, collaborators);
        Self {
            store: Store::new(TrackerState::default(), TrackerReducer, env),
            config,
            rest: None,
        }
    }

    /// Create a client wired to the configured backend, socket, and cache
    /// directory.
    ///
    /// A static dataset that cannot be loaded is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Invalid`] if the API base URL is unusable.
    pub async fn from_config(config: TrackerConfig) -> Result<Self, TrackerError> {
        let rest = RestClient::new(&config.api_base_url)?;
        let shared = Arc::new(rest.clone());

        let mut collaborators = Collaborators::new(
            Arc::clone(&shared) as Arc<dyn SubscriptionApi>,
            Arc::clone(&shared) as Arc<dyn RideApi>,
            shared,
            Arc::new(WebSocketTransport::new(config.socket_url.clone())),
            Arc::new(FileKeyValueStore::new(config.cache_dir.clone())),
        );

        if let Some(path) = &config.vehicle_dataset {
            match StaticVehicleDataset::load(path).await {
                Ok(dataset) => {
                    tracing::info!(path = %path.display(), vehicles = dataset.len(), "Static vehicle dataset loaded");
                    collaborators = collaborators.with_dataset(dataset);
                },
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Static vehicle dataset unavailable");
                },
            }
        }

        let mut client = Self::new(config, collaborators);
        client.rest = Some(rest);
        Ok(client)
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════

    /// Sign in, connect the realtime channel, and resolve the entitlement.
    ///
    /// Operator and staff accounts are entitled without a remote read.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is shutting down or the
    /// resolution does not finish in time.
    pub async fn start_session(
        &self,
        user: UserProfile,
        token: impl Into<String>,
        is_new_registration: bool,
    ) -> Result<EntitlementRecord, StoreError> {
        let token = AccessToken::new(token);
        if let Some(rest) = &self.rest {
            rest.set_token(Some(token.expose().to_string()));
        }

        self.resolve_and_wait(TrackerAction::StartSession {
            user,
            token,
            is_new_registration,
        })
        .await
    }

    /// Re-read the entitlement for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is shutting down or the
    /// resolution does not finish in time.
    pub async fn refresh_entitlement(&self) -> Result<EntitlementRecord, StoreError> {
        if self.store.state(|s| s.session.is_none()).await {
            return Ok(EntitlementRecord::None);
        }
        self.resolve_and_wait(TrackerAction::RefreshEntitlement).await
    }

    /// Sign out: disconnect the channel and drop all state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn end_session(&self) -> Result<(), StoreError> {
        if let Some(rest) = &self.rest {
            rest.set_token(None);
        }
        self.store.send(TrackerAction::EndSession).await?;
        Ok(())
    }

    async fn resolve_and_wait(&self, action: TrackerAction) -> Result<EntitlementRecord, StoreError> {
        let mut actions = self.store.subscribe_actions();
        let (_, request) = self
            .store
            .send_and_read(action, |s| s.entitlement_request)
            .await?;

        let timeout = self.config.entitlement_fetch_timeout + RESULT_GRACE;
        wait_for(&mut actions, timeout, |action| match action {
            TrackerAction::EntitlementResolved {
                request: resolved,
                resolution,
                ..
            } if *resolved >= request => Some(resolution.record.clone()),
            _ => None,
        })
        .await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Entitlement
    // ═══════════════════════════════════════════════════════════════════

    /// Current entitlement
    pub async fn entitlement(&self) -> EntitlementRecord {
        self.store.state(|s| s.entitlement.clone()).await
    }

    /// Submit a subscription (payment) for the signed-in user.
    ///
    /// On success the returned record also replaces the current entitlement.
    ///
    /// # Errors
    ///
    /// Returns the remote failure; the entitlement is unchanged.
    pub async fn submit_subscription(
        &self,
        request: CreateSubscription,
    ) -> Result<EntitlementRecord, TrackerError> {
        let Some(user_id) = self
            .store
            .state(|s| s.session.as_ref().map(|user| user.id.clone()))
            .await
        else {
            return Err(TrackerError::Invalid("no active session".to_string()));
        };

        let outcome = self
            .store
            .send_and_wait_for(
                TrackerAction::SubmitSubscription { request },
                |action| {
                    matches!(
                        action,
                        TrackerAction::SubscriptionSubmitted { user_id: id, .. }
                            | TrackerAction::SubscriptionFailed { user_id: id, .. }
                            if *id == user_id
                    )
                },
                self.config.entitlement_fetch_timeout + RESULT_GRACE,
            )
            .await;

        match outcome {
            Ok(TrackerAction::SubscriptionSubmitted { record, .. }) => Ok(record),
            Ok(TrackerAction::SubscriptionFailed { error, .. }) => Err(error),
            Ok(_) | Err(StoreError::Timeout) => Err(TrackerError::Timeout),
            Err(error) => Err(TrackerError::Transient(error.to_string())),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ride
    // ═══════════════════════════════════════════════════════════════════

    /// Request a ride.
    ///
    /// Resolves once the backend accepted the request; the session then waits
    /// for a driver.
    ///
    /// # Errors
    ///
    /// Returns the [`RideRequestError`] to show the user. Every variant is
    /// recoverable.
    pub async fn request_ride(
        &self,
        destination: Destination,
        vehicle_class: VehicleClass,
    ) -> Result<RideId, RideRequestError> {
        let outcome = self
            .store
            .send_and_wait_for(
                TrackerAction::Ride(RideAction::RequestRide {
                    destination,
                    vehicle_class,
                }),
                |action| {
                    matches!(
                        action,
                        TrackerAction::Ride(
                            RideAction::RideRequestConfirmed { .. }
                                | RideAction::RideRequestFailed { .. }
                                | RideAction::RideRequestRejected { .. }
                        )
                    )
                },
                self.config.ride_request_timeout + RESULT_GRACE,
            )
            .await;

        match outcome {
            Ok(TrackerAction::Ride(RideAction::RideRequestConfirmed { ride_id })) => Ok(ride_id),
            Ok(TrackerAction::Ride(
                RideAction::RideRequestFailed { error, .. } | RideAction::RideRequestRejected { error },
            )) => Err(error),
            Ok(other) => Err(RideRequestError::SubmissionFailed {
                reason: format!("unexpected result {other:?}"),
                retryable: true,
            }),
            Err(error) => Err(RideRequestError::SubmissionFailed {
                reason: error.to_string(),
                retryable: true,
            }),
        }
    }

    /// Cancel the ride while it is waiting for a driver.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn cancel_ride(&self) -> Result<(), StoreError> {
        self.store.send(TrackerAction::Ride(RideAction::CancelRide)).await?;
        Ok(())
    }

    /// Current ride session
    pub async fn ride(&self) -> RideSession {
        self.store.state(|s| s.ride.clone()).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Vehicles
    // ═══════════════════════════════════════════════════════════════════

    /// Report the user's location; refreshes the feed after meaningful movement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn update_location(&self, location: Coordinates) -> Result<(), StoreError> {
        self.store
            .send(TrackerAction::Vehicles(VehicleAction::LocationChanged(location)))
            .await?;
        Ok(())
    }

    /// Refresh the vehicle feed now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn refresh_vehicles(&self) -> Result<(), StoreError> {
        self.store
            .send(TrackerAction::Vehicles(VehicleAction::Refresh {
                trigger: RefreshTrigger::Manual,
            }))
            .await?;
        Ok(())
    }

    /// Current vehicle feed
    pub async fn vehicles(&self) -> VehicleFeedState {
        self.store.state(|s| s.vehicles.clone()).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Observation
    // ═══════════════════════════════════════════════════════════════════

    /// Snapshot of all state
    pub async fn state(&self) -> TrackerState {
        self.store.state(Clone::clone).await
    }

    /// Latest state, updated after every transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.store.subscribe_state()
    }

    /// Realtime connection status
    #[must_use]
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.store.environment().channel.status()
    }

    /// End the session and wait for in-flight work to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when `timeout` elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        if let Err(error) = self.end_session().await {
            tracing::debug!(%error, "Session already closed");
        }
        self.store.shutdown(timeout).await
    }
}

/// Wait for the first action `select` maps to a value.
async fn wait_for<T>(
    actions: &mut broadcast::Receiver<TrackerAction>,
    timeout: Duration,
    select: impl Fn(&TrackerAction) -> Option<T>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, async {
        loop {
            match actions.recv().await {
                Ok(action) => {
                    if let Some(value) = select(&action) {
                        return Ok(value);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Action observer lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return Err(StoreError::ChannelClosed),
            }
        }
    })
    .await
    .map_err(|_| StoreError::Timeout)?
}
