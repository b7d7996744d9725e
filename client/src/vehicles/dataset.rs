//! Static vehicle dataset used when nothing better is available.

use crate::error::CacheError;
use crate::geo::distance_meters;
use crate::types::{Coordinates, VehicleSnapshot};
use std::path::Path;

/// Fixed list of vehicles loaded from a JSON array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticVehicleDataset {
    vehicles: Vec<VehicleSnapshot>,
}

impl StaticVehicleDataset {
    /// Wrap a list.
    #[must_use]
    pub const fn new(vehicles: Vec<VehicleSnapshot>) -> Self {
        Self { vehicles }
    }

    /// Parse a JSON array of vehicle snapshots.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::new)
    }

    /// Load a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, CacheError> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json(&json)?)
    }

    /// Number of vehicles
    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Returns `true` if the dataset is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Vehicles with a known position within `radius_km` of `location`.
    #[must_use]
    pub fn nearby(&self, location: Coordinates, radius_km: f64) -> Vec<VehicleSnapshot> {
        let radius_meters = radius_km * 1000.0;
        self.vehicles
            .iter()
            .filter(|vehicle| {
                vehicle
                    .coordinates
                    .is_some_and(|at| distance_meters(location, at) <= radius_meters)
            })
            .cloned()
            .collect()
    }
}
