//! Client state.

use crate::entitlement::EntitlementRecord;
use crate::ride::RideSession;
use crate::types::{UserId, UserProfile};
use crate::vehicles::VehicleFeedState;
use serde::{Deserialize, Serialize};

/// Everything the UI renders, owned by one store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    /// Signed-in user, if any
    pub session: Option<UserProfile>,
    /// Current entitlement; replaced wholesale
    pub entitlement: EntitlementRecord,
    /// Id of the latest entitlement resolution; older results are discarded
    pub entitlement_request: u64,
    /// Ride session
    pub ride: RideSession,
    /// Nearby vehicles
    pub vehicles: VehicleFeedState,
}

impl TrackerState {
    /// Whether `user_id` is the signed-in user.
    #[must_use]
    pub fn is_signed_in_as(&self, user_id: &UserId) -> bool {
        self.session.as_ref().is_some_and(|user| &user.id == user_id)
    }
}
