//! Configuration for the tracking client.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to the default rather than failing start-up.

use ridesync_runtime::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tracking client configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// REST API base URL (no trailing slash)
    pub api_base_url: String,
    /// Realtime socket URL
    pub socket_url: String,
    /// Directory for the persisted key/value cache
    pub cache_dir: PathBuf,
    /// Optional JSON file with the static vehicle dataset
    pub vehicle_dataset: Option<PathBuf>,
    /// Wall-clock budget for the remote subscription fetch
    ///
    /// Default: 8 seconds
    pub entitlement_fetch_timeout: Duration,
    /// Wall-clock budget for submitting a ride request
    ///
    /// Default: 15 seconds
    pub ride_request_timeout: Duration,
    /// How long a completed/cancelled ride stays visible before reset
    ///
    /// Default: 3 seconds
    pub quiescent_delay: Duration,
    /// Radius for nearby-vehicle queries
    ///
    /// Default: 5 km
    pub proximity_radius_km: f64,
    /// Movement that triggers a vehicle refresh
    ///
    /// Default: 50 m
    pub min_movement_meters: f64,
    /// Reconnect backoff for the realtime channel (unbounded attempts)
    pub reconnect: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            socket_url: "ws://localhost:8080/ws".to_string(),
            cache_dir: PathBuf::from(".ridesync-cache"),
            vehicle_dataset: None,
            entitlement_fetch_timeout: Duration::from_secs(8),
            ride_request_timeout: Duration::from_secs(15),
            quiescent_delay: Duration::from_secs(3),
            proximity_radius_km: 5.0,
            min_movement_meters: 50.0,
            reconnect: default_reconnect_policy(
                Duration::from_millis(500),
                Duration::from_secs(30),
            ),
        }
    }
}

fn default_reconnect_policy(initial: Duration, max: Duration) -> RetryPolicy {
    RetryPolicy::builder()
        .unbounded()
        .initial_delay(initial)
        .max_delay(max)
        .multiplier(2.0)
        .jitter(true)
        .build()
}

impl TrackerConfig {
    /// Load configuration from `RIDESYNC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            parsed::<u64>(&lookup, key).map_or(default, Duration::from_millis)
        };

        let reconnect_initial = millis("RIDESYNC_RECONNECT_INITIAL_MS", Duration::from_millis(500));
        let reconnect_max = millis("RIDESYNC_RECONNECT_MAX_MS", Duration::from_secs(30));

        Self {
            api_base_url: lookup("RIDESYNC_API_URL")
                .map_or(defaults.api_base_url, |url| url.trim_end_matches('/').to_string()),
            socket_url: lookup("RIDESYNC_SOCKET_URL").unwrap_or(defaults.socket_url),
            cache_dir: lookup("RIDESYNC_CACHE_DIR").map_or(defaults.cache_dir, PathBuf::from),
            vehicle_dataset: lookup("RIDESYNC_VEHICLE_DATASET").map(PathBuf::from),
            entitlement_fetch_timeout: millis(
                "RIDESYNC_ENTITLEMENT_TIMEOUT_MS",
                defaults.entitlement_fetch_timeout,
            ),
            ride_request_timeout: millis(
                "RIDESYNC_RIDE_REQUEST_TIMEOUT_MS",
                defaults.ride_request_timeout,
            ),
            quiescent_delay: millis("RIDESYNC_QUIESCENT_DELAY_MS", defaults.quiescent_delay),
            proximity_radius_km: parsed(&lookup, "RIDESYNC_PROXIMITY_RADIUS_KM")
                .unwrap_or(defaults.proximity_radius_km),
            min_movement_meters: parsed(&lookup, "RIDESYNC_MIN_MOVEMENT_M")
                .unwrap_or(defaults.min_movement_meters),
            reconnect: default_reconnect_policy(reconnect_initial, reconnect_max),
        }
    }

    /// Set the REST API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the realtime socket URL.
    #[must_use]
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the static vehicle dataset file.
    #[must_use]
    pub fn with_vehicle_dataset(mut self, path: impl Into<PathBuf>) -> Self {
        self.vehicle_dataset = Some(path.into());
        self
    }

    /// Set the entitlement fetch timeout.
    #[must_use]
    pub const fn with_entitlement_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.entitlement_fetch_timeout = timeout;
        self
    }

    /// Set the ride request timeout.
    #[must_use]
    pub const fn with_ride_request_timeout(mut self, timeout: Duration) -> Self {
        self.ride_request_timeout = timeout;
        self
    }

    /// Set the quiescent delay.
    #[must_use]
    pub const fn with_quiescent_delay(mut self, delay: Duration) -> Self {
        self.quiescent_delay = delay;
        self
    }

    /// Set the nearby-vehicle radius.
    #[must_use]
    pub const fn with_proximity_radius_km(mut self, radius_km: f64) -> Self {
        self.proximity_radius_km = radius_km;
        self
    }

    /// Set the movement threshold.
    #[must_use]
    pub const fn with_min_movement_meters(mut self, meters: f64) -> Self {
        self.min_movement_meters = meters;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
