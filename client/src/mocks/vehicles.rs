//! Mock vehicle source.

use super::lock;
use crate::error::{Result, TrackerError};
use crate::providers::VehicleSource;
use crate::types::{Coordinates, VehicleSnapshot};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Script {
    response: Result<Vec<VehicleSnapshot>>,
    queries: Vec<(Coordinates, f64)>,
}

/// Scripted [`VehicleSource`]; fails with `Transient` until told otherwise.
#[derive(Debug, Clone)]
pub struct MockVehicleSource {
    script: Arc<Mutex<Script>>,
}

impl Default for MockVehicleSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVehicleSource {
    /// Create an unreachable source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                response: Err(TrackerError::Transient("no vehicles scripted".into())),
                queries: Vec::new(),
            })),
        }
    }

    /// Answer every query with `response`.
    pub fn respond_with(&self, response: Result<Vec<VehicleSnapshot>>) {
        lock(&self.script).response = response;
    }

    /// Queries received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<(Coordinates, f64)> {
        lock(&self.script).queries.clone()
    }
}

impl VehicleSource for MockVehicleSource {
    fn nearby_vehicles(
        &self,
        location: Coordinates,
        radius_km: f64,
    ) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>>> {
        let response = {
            let mut script = lock(&self.script);
            script.queries.push((location, radius_km));
            script.response.clone()
        };
        Box::pin(async move { response })
    }
}
