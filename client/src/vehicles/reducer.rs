//! Vehicle feed reducer.

use super::{
    FeedSource, RefreshOutcome, RefreshTrigger, VehicleAction, VehicleEnvironment, VehicleFeedState,
};
use crate::geo::distance_meters;
use ridesync_core::effect::Effect;
use ridesync_core::reducer::Reducer;
use ridesync_core::{SmallVec, async_effect, smallvec};
use std::sync::Arc;

type Effects = SmallVec<[Effect<VehicleAction>; 4]>;

/// Vehicle feed reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct VehicleFeedReducer;

impl VehicleFeedReducer {
    fn refresh(
        state: &mut VehicleFeedState,
        env: &VehicleEnvironment,
        trigger: RefreshTrigger,
    ) -> Effects {
        let Some(location) = state.current_location else {
            tracing::debug!(?trigger, "No location yet; skipping vehicle refresh");
            return smallvec![Effect::None];
        };

        state.requested_generation += 1;
        state.last_refresh_location = Some(location);
        let generation = state.requested_generation;
        tracing::debug!(?trigger, generation, "Refreshing nearby vehicles");

        let source = Arc::clone(&env.source);
        let dataset = env.dataset.clone();
        let radius_km = env.radius_km;

        smallvec![async_effect! {
            let outcome = match source.nearby_vehicles(location, radius_km).await {
                Ok(vehicles) => RefreshOutcome::Remote(vehicles),
                Err(error) => {
                    tracing::warn!(generation, %error, "Vehicle source failed");
                    RefreshOutcome::Unavailable {
                        fallback: dataset
                            .map(|dataset| dataset.nearby(location, radius_km))
                            .unwrap_or_default(),
                    }
                },
            };
            Some(VehicleAction::Refreshed { generation, outcome })
        }]
    }

    /// Reconcile a refresh outcome with the list shown right now.
    fn apply(state: &mut VehicleFeedState, outcome: RefreshOutcome) {
        let source = match outcome {
            RefreshOutcome::Remote(vehicles) => {
                state.vehicles = vehicles;
                FeedSource::Remote
            },
            RefreshOutcome::Unavailable { fallback } if state.vehicles.is_empty() && !fallback.is_empty() => {
                state.vehicles = fallback;
                FeedSource::Static
            },
            RefreshOutcome::Unavailable { .. } => FeedSource::Previous,
        };

        if source != FeedSource::Remote {
            tracing::info!(
                source = source.as_str(),
                count = state.vehicles.len(),
                "Vehicle source unavailable; using fallback"
            );
        }
        metrics::counter!("vehicles.refresh", "source" => source.as_str()).increment(1);
        state.source = Some(source);
    }
}

impl Reducer for VehicleFeedReducer {
    type State = VehicleFeedState;
    type Action = VehicleAction;
    type Environment = VehicleEnvironment;

    fn reduce(
        &self,
        state: &mut VehicleFeedState,
        action: VehicleAction,
        env: &VehicleEnvironment,
    ) -> Effects {
        match action {
            VehicleAction::LocationChanged(location) => {
                if !location.is_valid() {
                    tracing::warn!(?location, "Ignoring invalid location");
                    return smallvec![Effect::None];
                }

                state.current_location = Some(location);
                let moved = state.last_refresh_location.is_none_or(|last| {
                    distance_meters(last, location) >= env.min_movement_meters
                });

                if moved {
                    Self::refresh(state, env, RefreshTrigger::Movement)
                } else {
                    smallvec![Effect::None]
                }
            },

            VehicleAction::Refresh { trigger } => Self::refresh(state, env, trigger),

            VehicleAction::Refreshed { generation, outcome } => {
                if generation <= state.applied_generation {
                    tracing::debug!(
                        generation,
                        applied = state.applied_generation,
                        "Discarding out-of-order vehicle refresh"
                    );
                    return smallvec![Effect::None];
                }

                Self::apply(state, outcome);
                state.applied_generation = generation;
                smallvec![Effect::None]
            },

            VehicleAction::Reset => {
                *state = state.cleared();
                smallvec![Effect::None]
            },
        }
    }
}
