//! Nearby-vehicle feed.
//!
//! Refreshes are triggered by meaningful movement and by `vehicle_updates`
//! pushes, in any order. Each refresh replaces the list wholesale and carries a
//! generation number so a slow response never overwrites a newer one. When
//! the remote source fails, whatever list is shown at that moment is kept; the
//! static dataset is only used when there is nothing to keep. Generations keep
//! counting across resets, so a refresh issued before sign-out is never
//! applied after it.

pub mod dataset;
pub mod reducer;

use crate::providers::VehicleSource;
use crate::types::{Coordinates, VehicleSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use dataset::StaticVehicleDataset;
pub use reducer::VehicleFeedReducer;

/// Where the current vehicle list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Remote proximity query
    Remote,
    /// Previous list retained after a failure
    Previous,
    /// Bundled static dataset
    Static,
}

impl FeedSource {
    /// Lowercase label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Previous => "previous",
            Self::Static => "static",
        }
    }

}

/// What a refresh produced, before it is reconciled with the shown list.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Remote proximity query answered
    Remote(Vec<VehicleSnapshot>),
    /// Remote failed; nearby entries of the static dataset, possibly empty
    Unavailable {
        /// Static fallback, used only if nothing is shown
        fallback: Vec<VehicleSnapshot>,
    },
}

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Location moved past the movement threshold
    Movement,
    /// `vehicle_updates` push from the realtime channel
    Push,
    /// Explicit request from the UI
    Manual,
}

/// State of the feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleFeedState {
    /// Vehicles currently shown
    pub vehicles: Vec<VehicleSnapshot>,
    /// Latest known user location
    pub current_location: Option<Coordinates>,
    /// Location the last refresh was issued for
    pub last_refresh_location: Option<Coordinates>,
    /// Generation of the most recently issued refresh
    pub requested_generation: u64,
    /// Generation of the list currently shown
    pub applied_generation: u64,
    /// Source of the list currently shown
    pub source: Option<FeedSource>,
}

impl VehicleFeedState {
    /// Empty feed that still rejects every refresh issued so far.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self {
            requested_generation: self.requested_generation,
            applied_generation: self.requested_generation,
            ..Self::default()
        }
    }
}

/// Inputs to the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleAction {
    /// User location changed
    LocationChanged(Coordinates),
    /// Refresh now
    Refresh {
        /// Why
        trigger: RefreshTrigger,
    },
    /// A refresh finished
    Refreshed {
        /// Generation of the refresh
        generation: u64,
        /// What it produced
        outcome: RefreshOutcome,
    },
    /// Drop the list and location (sign-out)
    Reset,
}

/// Dependencies of [`VehicleFeedReducer`].
#[derive(Clone)]
pub struct VehicleEnvironment {
    /// Remote proximity source
    pub source: Arc<dyn VehicleSource>,
    /// Last-resort dataset
    pub dataset: Option<Arc<StaticVehicleDataset>>,
    /// Query radius
    pub radius_km: f64,
    /// Movement that triggers a refresh
    pub min_movement_meters: f64,
}

impl fmt::Debug for VehicleEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleEnvironment")
            .field("radius_km", &self.radius_km)
            .field("min_movement_meters", &self.min_movement_meters)
            .field("has_dataset", &self.dataset.is_some())
            .finish_non_exhaustive()
    }
}
