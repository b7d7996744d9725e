//! # Ridesync Client
//!
//! Reconciliation engine for a ride-hailing tracking client: it decides what
//! the user is entitled to, where their ride is, and which vehicles are nearby,
//! from sources that are slow, flaky, or out of order.
//!
//! ## Features
//!
//! - **Entitlement**: remote record, then local cache, then "none", with
//!   write-through caching and a staff/operator override
//! - **Ride session**: a guarded state machine driven by user intents and
//!   realtime events, tolerant of duplicates and stale ride ids
//! - **Realtime channel**: one connection per session with automatic
//!   reconnect and per-event listeners
//! - **Vehicle feed**: movement- and push-triggered refreshes that never
//!   blank the list on failure
//!
//! ## Architecture
//!
//! All state lives in one store and changes only through [`TrackerReducer`]:
//!
//! ```text
//! Action → Reducer → (State, Effects) → Effect Execution → More Actions
//! ```
//!
//! Remote systems sit behind the traits in [`providers`]; [`mocks`] has
//! in-memory versions of each.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ridesync_client::{TrackerClient, TrackerConfig};
//! use ridesync_client::types::{Destination, UserProfile, UserRole};
//!
//! let client = TrackerClient::from_config(TrackerConfig::from_env()).await?;
//! client
//!     .start_session(UserProfile::new("u-1", UserRole::Passenger), token, false)
//!     .await?;
//!
//! let ride_id = client.request_ride(destination, "jeep".into()).await?;
//! let mut state = client.subscribe();
//! while state.changed().await.is_ok() {
//!     println!("{}", state.borrow().ride.status);
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod actions;
pub mod client;
pub mod config;
pub mod entitlement;
pub mod environment;
pub mod error;
pub mod geo;
pub mod mocks;
pub mod providers;
pub mod realtime;
pub mod reducer;
pub mod ride;
pub mod state;
pub mod stores;
pub mod telemetry;
pub mod types;
pub mod vehicles;

// Re-export main types for convenience
pub use actions::{AccessToken, TrackerAction};
pub use client::TrackerClient;
pub use config::TrackerConfig;
pub use entitlement::{EntitlementRecord, EntitlementResolver, EntitlementSource};
pub use environment::{Collaborators, TrackerEnvironment};
pub use error::{CacheError, ChannelError, RideRequestError, TrackerError};
pub use realtime::{ChannelEvent, ConnectionStatus, RealtimeChannel};
pub use reducer::TrackerReducer;
pub use ride::{RideSession, RideStatus};
pub use state::TrackerState;
pub use vehicles::{FeedSource, VehicleFeedState};
