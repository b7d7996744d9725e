//! Domain types shared by every feature of the tracking client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Account identifier
    UserId
);
string_id!(
    /// Ride session identifier, generated by the client when a ride is requested
    RideId
);
string_id!(
    /// Driver identifier
    DriverId
);
string_id!(
    /// Vehicle identifier
    VehicleId
);
string_id!(
    /// Vehicle class a subscription covers and a ride requests (e.g. "jeep")
    VehicleClass
);

/// WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    /// Degrees north
    #[serde(alias = "lat")]
    pub latitude: f64,
    /// Degrees east
    #[serde(alias = "lng", alias = "lon")]
    pub longitude: f64,
}

impl Coordinates {
    /// Create a position
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within the latitude/longitude ranges
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Where a passenger wants to go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Display name
    pub name: String,
    /// Drop-off point
    pub coordinates: Coordinates,
}

impl Destination {
    /// Create a destination
    #[must_use]
    pub fn new(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            coordinates,
        }
    }

    /// Check the destination can be submitted.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("destination name is empty".to_string());
        }
        if !self.coordinates.is_valid() {
            return Err(format!(
                "coordinates out of range: {}, {}",
                self.coordinates.latitude, self.coordinates.longitude
            ));
        }
        Ok(())
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Rides vehicles
    #[default]
    Passenger,
    /// Drives a vehicle
    Driver,
    /// Dispatch operator
    Operator,
    /// Back-office staff
    Staff,
}

impl UserRole {
    /// Operator and staff accounts are implicitly entitled.
    #[must_use]
    pub const fn bypasses_entitlement(self) -> bool {
        matches!(self, Self::Operator | Self::Staff)
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passenger => "passenger",
            Self::Driver => "driver",
            Self::Operator => "operator",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passenger" | "user" => Ok(Self::Passenger),
            "driver" => Ok(Self::Driver),
            "operator" => Ok(Self::Operator),
            "staff" | "admin" => Ok(Self::Staff),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Account id
    pub id: UserId,
    /// Account role
    pub role: UserRole,
}

impl UserProfile {
    /// Create a profile
    #[must_use]
    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }
}

/// A vehicle as shown on the map.
///
/// Always replaced as a whole; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    /// Vehicle id
    pub id: VehicleId,
    /// Vehicle class
    #[serde(rename = "type", default = "VehicleSnapshot::unknown_type")]
    pub vehicle_type: String,
    /// Display name
    #[serde(default = "VehicleSnapshot::unnamed")]
    pub name: String,
    /// Last known position, if reported
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Estimated minutes to arrival, if reported
    #[serde(default)]
    pub eta: Option<u32>,
}

impl VehicleSnapshot {
    fn unknown_type() -> String {
        "unknown".to_string()
    }

    fn unnamed() -> String {
        "Vehicle".to_string()
    }

    /// A snapshot with neutral placeholder values for everything but the id
    #[must_use]
    pub fn placeholder(id: VehicleId) -> Self {
        Self {
            id,
            vehicle_type: Self::unknown_type(),
            name: Self::unnamed(),
            coordinates: None,
            eta: None,
        }
    }
}
