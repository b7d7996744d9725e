//! Top-level actions.

use crate::entitlement::{CreateSubscription, EntitlementRecord, Resolution};
use crate::error::TrackerError;
use crate::realtime::ChannelEvent;
use crate::ride::RideAction;
use crate::types::{UserId, UserProfile};
use crate::vehicles::VehicleAction;
use std::fmt;

/// Bearer token for the backend; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Every input to [`crate::reducer::TrackerReducer`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerAction {
    // ═══════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════
    /// Sign in: resolve the entitlement and connect the realtime channel
    StartSession {
        /// Who signed in
        user: UserProfile,
        /// Backend credentials
        token: AccessToken,
        /// Account created in this sign-in
        is_new_registration: bool,
    },
    /// Sign out: disconnect and drop all state
    EndSession,

    // ═══════════════════════════════════════════════════════════════════
    // Entitlement
    // ═══════════════════════════════════════════════════════════════════
    /// Re-run entitlement resolution for the signed-in user
    RefreshEntitlement,
    /// A resolution finished
    EntitlementResolved {
        /// User it was resolved for
        user_id: UserId,
        /// Request id it answers
        request: u64,
        /// Result
        resolution: Resolution,
    },
    /// Submit a subscription for the signed-in user
    SubmitSubscription {
        /// Payment details
        request: CreateSubscription,
    },
    /// Submission accepted
    SubscriptionSubmitted {
        /// User it was submitted for
        user_id: UserId,
        /// Classified record
        record: EntitlementRecord,
    },
    /// Submission failed; entitlement unchanged
    SubscriptionFailed {
        /// User it was submitted for
        user_id: UserId,
        /// Why
        error: TrackerError,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Features
    // ═══════════════════════════════════════════════════════════════════
    /// Ride session action
    Ride(RideAction),
    /// Vehicle feed action
    Vehicles(VehicleAction),
    /// Decoded realtime event
    Channel(ChannelEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted() {
        let action = TrackerAction::StartSession {
            user: UserProfile::new("u-1", crate::types::UserRole::Passenger),
            token: AccessToken::new("hunter2"),
            is_new_registration: false,
        };
        let printed = format!("{action:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("u-1"));
    }
}
