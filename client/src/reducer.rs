//! Top-level reducer.
//!
//! Owns the session and the entitlement record, gates ride requests on the
//! entitlement, and routes realtime events to the ride and vehicle features.
//! Feature actions are delegated to [`RideReducer`] and [`VehicleFeedReducer`]
//! and their effects lifted back into [`TrackerAction`].

use crate::actions::{AccessToken, TrackerAction};
use crate::entitlement::{EntitlementRecord, EntitlementSource, Resolution};
use crate::environment::TrackerEnvironment;
use crate::error::RideRequestError;
use crate::realtime::{ChannelEvent, ChannelIdentity};
use crate::ride::{RideAction, RideReducer};
use crate::state::TrackerState;
use crate::types::UserProfile;
use crate::vehicles::{RefreshTrigger, VehicleAction, VehicleFeedReducer};
use futures::StreamExt;
use ridesync_core::effect::Effect;
use ridesync_core::reducer::Reducer;
use ridesync_core::{SmallVec, async_effect, smallvec};
use std::sync::Arc;

type Effects = SmallVec<[Effect<TrackerAction>; 4]>;

/// Top-level reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerReducer;

fn lift<A: Send + 'static>(
    effects: SmallVec<[Effect<A>; 4]>,
    into: fn(A) -> TrackerAction,
) -> Effects {
    effects.into_iter().map(|effect| effect.map(into)).collect()
}

impl TrackerReducer {
    fn resolve_entitlement(
        state: &mut TrackerState,
        env: &TrackerEnvironment,
        is_new_registration: bool,
    ) -> Effect<TrackerAction> {
        let Some(user) = &state.session else {
            tracing::debug!("No session; skipping entitlement resolution");
            return Effect::None;
        };
        let user_id = user.id.clone();
        let bypass = user.role.bypasses_entitlement();

        state.entitlement_request += 1;
        let request = state.entitlement_request;

        if bypass {
            let resolution = Resolution {
                record: EntitlementRecord::role_override(env.clock.now()),
                source: EntitlementSource::RoleOverride,
            };
            return async_effect! {
                Some(TrackerAction::EntitlementResolved { user_id, request, resolution })
            };
        }

        let resolver = Arc::clone(&env.resolver);
        async_effect! {
            let resolution = resolver.resolve_with_source(&user_id, is_new_registration).await;
            Some(TrackerAction::EntitlementResolved { user_id, request, resolution })
        }
    }

    /// Rewire the realtime channel for a new identity.
    ///
    /// Runs synchronously inside the reducer so that session start and end
    /// take effect on the channel in the order the actions were sent.
    fn connect_channel(env: &TrackerEnvironment, identity: ChannelIdentity) -> Effect<TrackerAction> {
        env.channel.disconnect();
        let events = env.channel.events();
        env.channel.connect(identity);
        Effect::Stream(Box::pin(events.map(TrackerAction::Channel)))
    }

    fn start_session(
        state: &mut TrackerState,
        user: UserProfile,
        token: &AccessToken,
        is_new_registration: bool,
        env: &TrackerEnvironment,
    ) -> Effects {
        tracing::info!(user = %user.id, role = %user.role, is_new_registration, "Session started");

        let identity = ChannelIdentity {
            user_id: user.id.clone(),
            token: token.expose().to_string(),
        };
        *state = TrackerState {
            session: Some(user),
            entitlement_request: state.entitlement_request,
            vehicles: state.vehicles.cleared(),
            ..TrackerState::default()
        };

        // Rewired in the reducer, not an effect: start and end must reach the
        // channel in send order.
        smallvec![
            Self::resolve_entitlement(state, env, is_new_registration),
            Self::connect_channel(env, identity),
        ]
    }

    fn request_ride(state: &mut TrackerState, action: RideAction, env: &TrackerEnvironment) -> Effects {
        let entitled = state.session.is_some() && state.entitlement.is_active(env.clock.now());
        if !entitled {
            tracing::info!(
                entitlement = state.entitlement.kind().as_str(),
                "Ride request blocked: not entitled"
            );
            return smallvec![async_effect! {
                Some(TrackerAction::Ride(RideAction::RideRequestRejected {
                    error: RideRequestError::NotEntitled,
                }))
            }];
        }

        lift(
            RideReducer.reduce(&mut state.ride, action, &env.ride),
            TrackerAction::Ride,
        )
    }

    fn route_event(state: &mut TrackerState, event: ChannelEvent, env: &TrackerEnvironment) -> Effects {
        if state.session.is_none() {
            tracing::debug!(kind = %event.kind(), "Ignoring event outside a session");
            return smallvec![Effect::None];
        }

        match event {
            ChannelEvent::DriverAssigned(payload) => lift(
                RideReducer.reduce(&mut state.ride, RideAction::DriverAssigned(payload), &env.ride),
                TrackerAction::Ride,
            ),
            ChannelEvent::RideStatusUpdate(payload) => lift(
                RideReducer.reduce(&mut state.ride, RideAction::StatusUpdated(payload), &env.ride),
                TrackerAction::Ride,
            ),
            ChannelEvent::DriverLocation(payload) => lift(
                RideReducer.reduce(
                    &mut state.ride,
                    RideAction::DriverLocationUpdated(payload),
                    &env.ride,
                ),
                TrackerAction::Ride,
            ),
            ChannelEvent::VehicleUpdates(payload) => {
                tracing::debug!(area = ?payload.area, "Vehicle update pushed");
                lift(
                    VehicleFeedReducer.reduce(
                        &mut state.vehicles,
                        VehicleAction::Refresh {
                            trigger: RefreshTrigger::Push,
                        },
                        &env.vehicles,
                    ),
                    TrackerAction::Vehicles,
                )
            },
        }
    }
}

impl Reducer for TrackerReducer {
    type State = TrackerState;
    type Action = TrackerAction;
    type Environment = TrackerEnvironment;

    fn reduce(
        &self,
        state: &mut TrackerState,
        action: TrackerAction,
        env: &TrackerEnvironment,
    ) -> Effects {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Session
            // ═══════════════════════════════════════════════════════════════
            TrackerAction::StartSession {
                user,
                token,
                is_new_registration,
            } => Self::start_session(state, user, &token, is_new_registration, env),

            TrackerAction::EndSession => {
                if let Some(user) = &state.session {
                    tracing::info!(user = %user.id, "Session ended");
                }
                // Synchronous so no event of this session is routed after it ends.
                env.channel.disconnect();
                *state = TrackerState {
                    entitlement_request: state.entitlement_request + 1,
                    vehicles: state.vehicles.cleared(),
                    ..TrackerState::default()
                };
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Entitlement
            // ═══════════════════════════════════════════════════════════════
            TrackerAction::RefreshEntitlement => {
                smallvec![Self::resolve_entitlement(state, env, false)]
            },

            TrackerAction::EntitlementResolved {
                user_id,
                request,
                resolution,
            } => {
                if !state.is_signed_in_as(&user_id) || request != state.entitlement_request {
                    tracing::debug!(
                        user = %user_id,
                        request,
                        latest = state.entitlement_request,
                        "Discarding stale entitlement resolution"
                    );
                    return smallvec![Effect::None];
                }

                let Resolution { record, source } = resolution;
                metrics::counter!(
                    "entitlement.resolved",
                    "kind" => record.kind().as_str(),
                    "source" => source.as_str()
                )
                .increment(1);
                state.entitlement = record;
                smallvec![Effect::None]
            },

            TrackerAction::SubmitSubscription { request } => {
                let Some(user) = &state.session else {
                    tracing::warn!("Subscription submitted without a session");
                    return smallvec![Effect::None];
                };

                let user_id = user.id.clone();
                let resolver = Arc::clone(&env.resolver);
                smallvec![async_effect! {
                    match resolver.submit(&user_id, request).await {
                        Ok(record) => Some(TrackerAction::SubscriptionSubmitted { user_id, record }),
                        Err(error) => Some(TrackerAction::SubscriptionFailed { user_id, error }),
                    }
                }]
            },

            TrackerAction::SubscriptionSubmitted { user_id, record } => {
                if state.is_signed_in_as(&user_id) {
                    tracing::info!(kind = record.kind().as_str(), "Entitlement replaced by submission");
                    // A resolution still in flight predates the submission.
                    state.entitlement_request += 1;
                    state.entitlement = record;
                }
                smallvec![Effect::None]
            },

            TrackerAction::SubscriptionFailed { user_id, error } => {
                tracing::warn!(user = %user_id, %error, "Subscription submission failed");
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Features
            // ═══════════════════════════════════════════════════════════════
            TrackerAction::Ride(action @ RideAction::RequestRide { .. }) => {
                Self::request_ride(state, action, env)
            },

            TrackerAction::Ride(action) => lift(
                RideReducer.reduce(&mut state.ride, action, &env.ride),
                TrackerAction::Ride,
            ),

            TrackerAction::Vehicles(action) => lift(
                VehicleFeedReducer.reduce(&mut state.vehicles, action, &env.vehicles),
                TrackerAction::Vehicles,
            ),

            TrackerAction::Channel(event) => Self::route_event(state, event, env),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::entitlement::{EntitlementCache, EntitlementResolver, SubscriptionRecord};
    use crate::error::TrackerError;
    use crate::mocks::{
        InMemoryKeyValueStore, MockRideApi, MockSubscriptionApi, MockTransport, MockVehicleSource,
    };
    use crate::realtime::{DriverAssigned, RealtimeChannel, VehicleUpdates};
    use crate::ride::{RideEnvironment, RideStatus};
    use crate::types::{Coordinates, Destination, DriverId, RideId, UserRole, VehicleClass};
    use crate::types::{VehicleId, VehicleSnapshot};
    use crate::vehicles::{RefreshOutcome, VehicleEnvironment};
    use chrono::Duration as ChronoDuration;
    use ridesync_core::Clock;
    use ridesync_runtime::retry::RetryPolicy;
    use ridesync_testing::{ReducerTest, SequentialIdGenerator, assertions, drain_effects, test_clock};
    use std::time::Duration;

    struct Fixture {
        env: TrackerEnvironment,
        subscriptions: MockSubscriptionApi,
        transport: MockTransport,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let subscriptions = MockSubscriptionApi::new();
        let transport = MockTransport::new();
        let cache = EntitlementCache::new(Arc::new(InMemoryKeyValueStore::new()));
        let env = TrackerEnvironment {
            resolver: Arc::new(EntitlementResolver::new(
                Arc::new(subscriptions.clone()),
                cache,
                Arc::clone(&clock),
                Duration::from_secs(1),
            )),
            channel: Arc::new(RealtimeChannel::new(
                Arc::new(transport.clone()),
                RetryPolicy::builder().max_retries(0).build(),
            )),
            ride: RideEnvironment {
                rides: Arc::new(MockRideApi::new()),
                ids: Arc::new(SequentialIdGenerator::new("ride")),
                request_timeout: Duration::from_secs(1),
                quiescent_delay: Duration::from_millis(10),
            },
            vehicles: VehicleEnvironment {
                source: Arc::new(MockVehicleSource::new()),
                dataset: None,
                radius_km: 5.0,
                min_movement_meters: 50.0,
            },
            clock,
        };
        Fixture {
            env,
            subscriptions,
            transport,
        }
    }

    fn verified() -> EntitlementRecord {
        EntitlementRecord::Verified {
            vehicle_class: Some(VehicleClass::new("jeep")),
            plan_id: "monthly".into(),
            expiry: test_clock().now() + ChronoDuration::days(30),
            reference_number: None,
            verified_at: test_clock().now(),
        }
    }

    fn signed_in(entitlement: EntitlementRecord) -> TrackerState {
        TrackerState {
            session: Some(UserProfile::new("u-1", UserRole::Passenger)),
            entitlement,
            entitlement_request: 1,
            ..TrackerState::default()
        }
    }

    fn request_ride() -> TrackerAction {
        TrackerAction::Ride(RideAction::RequestRide {
            destination: Destination::new("Terminal", Coordinates::new(14.6, 121.0)),
            vehicle_class: VehicleClass::new("jeep"),
        })
    }

    #[tokio::test]
    async fn start_session_resolves_and_connects() {
        let Fixture {
            env,
            subscriptions,
            transport,
        } = fixture();
        subscriptions.respond_with(Ok(SubscriptionRecord {
            verified: Some(true),
            vehicle_type: Some("jeep".into()),
            plan_id: Some("monthly".into()),
            expiry_date: Some(test_clock().now() + ChronoDuration::days(30)),
            ..SubscriptionRecord::default()
        }));

        let mut state = TrackerState::default();
        let effects = TrackerReducer.reduce(
            &mut state,
            TrackerAction::StartSession {
                user: UserProfile::new("u-1", UserRole::Passenger),
                token: AccessToken::new("tok"),
                is_new_registration: false,
            },
            &env,
        );

        assert_eq!(state.entitlement_request, 1);
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[1], Effect::Stream(_)));

        let mut effects = effects.into_vec();
        effects.truncate(1);
        let produced = drain_effects(effects).await;
        let [TrackerAction::EntitlementResolved { resolution, .. }] = produced.as_slice() else {
            panic!("expected one resolution, got {produced:?}");
        };
        assert_eq!(resolution.source, EntitlementSource::Remote);

        tokio::time::timeout(Duration::from_secs(1), async {
            while transport.open_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(transport.identities()[0].token, "tok");
        env.channel.disconnect();
    }

    #[tokio::test]
    async fn staff_bypasses_the_resolver() {
        let Fixture { env, subscriptions, .. } = fixture();
        let mut state = TrackerState::default();
        let mut effects = TrackerReducer
            .reduce(
                &mut state,
                TrackerAction::StartSession {
                    user: UserProfile::new("ops", UserRole::Staff),
                    token: AccessToken::new("tok"),
                    is_new_registration: false,
                },
                &env,
            )
            .into_vec();
        effects.truncate(1);

        for action in drain_effects(effects).await {
            TrackerReducer.reduce(&mut state, action, &env);
        }

        assert!(state.entitlement.is_active(test_clock().now()));
        assert_eq!(subscriptions.fetch_count(), 0);
        env.channel.disconnect();
    }

    #[test]
    fn stale_resolution_is_discarded() {
        let Fixture { env, .. } = fixture();
        let mut state = signed_in(verified());
        state.entitlement_request = 2;

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(state)
            .when_action(TrackerAction::EntitlementResolved {
                user_id: "u-1".into(),
                request: 1,
                resolution: Resolution {
                    record: EntitlementRecord::None,
                    source: EntitlementSource::Remote,
                },
            })
            .then_state(|state| assert_eq!(state.entitlement, verified()))
            .run();
    }

    #[test]
    fn resolution_for_another_user_is_discarded() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(signed_in(EntitlementRecord::None))
            .when_action(TrackerAction::EntitlementResolved {
                user_id: "someone-else".into(),
                request: 1,
                resolution: Resolution {
                    record: verified(),
                    source: EntitlementSource::Remote,
                },
            })
            .then_state(|state| assert_eq!(state.entitlement, EntitlementRecord::None))
            .run();
    }

    #[tokio::test]
    async fn ride_request_requires_entitlement() {
        let Fixture { env, .. } = fixture();
        let mut state = signed_in(EntitlementRecord::None);

        let effects = TrackerReducer.reduce(&mut state, request_ride(), &env);

        assert_eq!(state.ride.status, RideStatus::None);
        assert_eq!(
            drain_effects(effects).await,
            vec![TrackerAction::Ride(RideAction::RideRequestRejected {
                error: RideRequestError::NotEntitled
            })]
        );
    }

    #[test]
    fn entitled_ride_request_enters_waiting() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(signed_in(verified()))
            .when_action(request_ride())
            .then_state(|state| {
                assert_eq!(state.ride.status, RideStatus::Waiting);
                assert_eq!(state.ride.id, Some(RideId::new("ride-1")));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn events_route_to_the_ride() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(signed_in(verified()))
            .when_action(request_ride())
            .when_action(TrackerAction::Channel(ChannelEvent::DriverAssigned(DriverAssigned {
                ride_id: RideId::new("ride-1"),
                driver_id: DriverId::new("D9"),
                vehicle: None,
            })))
            .then_state(|state| {
                assert_eq!(state.ride.status, RideStatus::Assigned);
                assert_eq!(state.ride.assigned_driver_id, Some(DriverId::new("D9")));
            })
            .run();
    }

    #[test]
    fn events_outside_a_session_are_ignored() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(TrackerState::default())
            .when_action(TrackerAction::Channel(ChannelEvent::VehicleUpdates(
                VehicleUpdates::default(),
            )))
            .then_state(|state| assert_eq!(*state, TrackerState::default()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn vehicle_push_triggers_refresh() {
        let Fixture { env, .. } = fixture();
        let mut state = signed_in(verified());
        state.vehicles.current_location = Some(Coordinates::new(14.6, 121.0));

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(state)
            .when_action(TrackerAction::Channel(ChannelEvent::VehicleUpdates(
                VehicleUpdates::default(),
            )))
            .then_state(|state| assert_eq!(state.vehicles.requested_generation, 1))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn submission_replaces_entitlement_and_invalidates_resolutions() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(signed_in(EntitlementRecord::None))
            .when_action(TrackerAction::SubscriptionSubmitted {
                user_id: "u-1".into(),
                record: verified(),
            })
            .when_action(TrackerAction::EntitlementResolved {
                user_id: "u-1".into(),
                request: 1,
                resolution: Resolution {
                    record: EntitlementRecord::None,
                    source: EntitlementSource::Cache,
                },
            })
            .then_state(|state| {
                assert_eq!(state.entitlement, verified());
                assert_eq!(state.entitlement_request, 2);
            })
            .run();
    }

    #[test]
    fn failed_submission_leaves_entitlement() {
        let Fixture { env, .. } = fixture();

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(signed_in(verified()))
            .when_action(TrackerAction::SubscriptionFailed {
                user_id: "u-1".into(),
                error: TrackerError::Timeout,
            })
            .then_state(|state| assert_eq!(state.entitlement, verified()))
            .run();
    }

    #[test]
    fn end_session_resets_everything() {
        let Fixture { env, .. } = fixture();
        let mut state = signed_in(verified());
        state.ride.status = RideStatus::Waiting;

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(state)
            .when_action(TrackerAction::EndSession)
            .then_state(|state| {
                assert!(state.session.is_none());
                assert_eq!(state.entitlement, EntitlementRecord::None);
                assert_eq!(state.ride.status, RideStatus::None);
                assert_eq!(state.entitlement_request, 2);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn vehicles_from_a_previous_session_never_return() {
        let Fixture { env, .. } = fixture();
        let mut state = signed_in(verified());
        state.vehicles.current_location = Some(Coordinates::new(14.6, 121.0));
        let leftover = VehicleSnapshot {
            id: VehicleId::new("v1"),
            vehicle_type: "jeep".into(),
            name: "Route 4".into(),
            coordinates: None,
            eta: None,
        };

        ReducerTest::new(TrackerReducer)
            .with_env(env)
            .given_state(state)
            .when_action(TrackerAction::Channel(ChannelEvent::VehicleUpdates(
                VehicleUpdates::default(),
            )))
            .when_action(TrackerAction::EndSession)
            .when_action(TrackerAction::Vehicles(VehicleAction::Refreshed {
                generation: 1,
                outcome: RefreshOutcome::Remote(vec![leftover]),
            }))
            .then_state(|state| {
                assert!(state.vehicles.vehicles.is_empty());
                assert_eq!(state.vehicles.source, None);
                assert_eq!(state.vehicles.requested_generation, 1);
            })
            .run();
    }
}
