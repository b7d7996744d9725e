//! Entitlement: the user's current right to request rides.
//!
//! An [`EntitlementRecord`] is derived from the remote subscription record,
//! the persisted cache, and the "new registration" signal. The record is an
//! enum so `VERIFIED` and `PENDING` can never be true at the same time, and
//! each variant carries only the fields its invariant requires.

pub mod cache;
pub mod resolver;

use crate::types::VehicleClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cache::EntitlementCache;
pub use resolver::{EntitlementResolver, EntitlementSource, Resolution};

/// Entitlement state for one user, always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementRecord {
    /// No subscription, or none that can be trusted
    #[default]
    None,

    /// Payment submitted, awaiting approval
    #[serde(rename_all = "camelCase")]
    Pending {
        /// Vehicle class subscribed to
        vehicle_class: Option<VehicleClass>,
        /// Plan applied for
        plan_id: Option<String>,
        /// Payment reference (never empty)
        reference_number: String,
        /// When the payment was made
        submitted_at: Option<DateTime<Utc>>,
    },

    /// Active subscription
    #[serde(rename_all = "camelCase")]
    Verified {
        /// Vehicle class subscribed to
        vehicle_class: Option<VehicleClass>,
        /// Plan (never empty)
        plan_id: String,
        /// End of the paid period
        expiry: DateTime<Utc>,
        /// Payment reference, if known
        reference_number: Option<String>,
        /// When this client observed the verification
        verified_at: DateTime<Utc>,
    },
}

/// Discriminant of [`EntitlementRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntitlementKind {
    /// No entitlement
    None,
    /// Awaiting approval
    Pending,
    /// Active
    Verified,
}

impl EntitlementKind {
    /// Uppercase label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
        }
    }
}

/// Plan id given to operator and staff accounts.
pub const ROLE_OVERRIDE_PLAN: &str = "role-override";

impl EntitlementRecord {
    /// Discriminant
    #[must_use]
    pub const fn kind(&self) -> EntitlementKind {
        match self {
            Self::None => EntitlementKind::None,
            Self::Pending { .. } => EntitlementKind::Pending,
            Self::Verified { .. } => EntitlementKind::Verified,
        }
    }

    /// Implicit entitlement for operator and staff accounts
    #[must_use]
    pub fn role_override(now: DateTime<Utc>) -> Self {
        Self::Verified {
            vehicle_class: None,
            plan_id: ROLE_OVERRIDE_PLAN.to_string(),
            expiry: DateTime::<Utc>::MAX_UTC,
            reference_number: None,
            verified_at: now,
        }
    }

    /// `VERIFIED` and not yet expired
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Verified { expiry, .. } if *expiry > now)
    }

    /// Whether the record satisfies its invariant at `now`.
    ///
    /// `VERIFIED` needs a plan id and a future expiry; `PENDING` needs a
    /// reference number.
    #[must_use]
    pub fn is_well_formed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::None => true,
            Self::Pending {
                reference_number, ..
            } => !reference_number.trim().is_empty(),
            Self::Verified {
                plan_id, expiry, ..
            } => !plan_id.trim().is_empty() && *expiry > now,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Remote wire format
// ═══════════════════════════════════════════════════════════════════════

/// Subscription record as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    /// Verification flag
    #[serde(default)]
    pub verified: Option<bool>,
    /// Pending flag
    #[serde(default)]
    pub pending: Option<bool>,
    /// Verification details (a second way the backend reports "pending")
    #[serde(default)]
    pub verification: Option<Verification>,
    /// Vehicle class
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
    /// Plan id
    #[serde(default)]
    pub plan_id: Option<String>,
    /// End of the paid period
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    /// Payment details
    #[serde(default)]
    pub payment_details: Option<PaymentDetails>,
}

/// Verification block of [`SubscriptionRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Free-form status, e.g. `"pending"` or `"approved"`
    #[serde(default)]
    pub status: Option<String>,
}

/// Payment block of [`SubscriptionRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Payment reference number
    #[serde(default)]
    pub reference_number: Option<String>,
    /// When the payment was made
    #[serde(default)]
    pub payment_date: Option<DateTime<Utc>>,
}

/// Request body for creating a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscription {
    /// Plan applied for
    pub plan_id: String,
    /// Vehicle class
    #[serde(rename = "type")]
    pub vehicle_type: String,
    /// Payment reference number
    pub reference_number: String,
    /// Payment method, e.g. `"gcash"`
    pub payment_method: String,
    /// Discount code or amount, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl SubscriptionRecord {
    fn reference_number(&self) -> Option<String> {
        non_empty(
            self.payment_details
                .as_ref()
                .and_then(|details| details.reference_number.as_ref()),
        )
    }

    /// `pending` flag or a `"pending"` verification status
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.unwrap_or(false)
            || self
                .verification
                .as_ref()
                .and_then(|v| v.status.as_deref())
                .is_some_and(|status| status.trim().eq_ignore_ascii_case("pending"))
    }
}

/// Classify a remote subscription record.
///
/// Records that do not satisfy the invariant of the kind they claim are
/// classified `NONE`; a positive entitlement is never inferred from an
/// incomplete record.
#[must_use]
pub fn classify(remote: &SubscriptionRecord, now: DateTime<Utc>) -> EntitlementRecord {
    let vehicle_class = non_empty(remote.vehicle_type.as_ref()).map(VehicleClass::new);

    if remote.verified.unwrap_or(false) {
        return match (non_empty(remote.plan_id.as_ref()), remote.expiry_date) {
            (Some(plan_id), Some(expiry)) if expiry > now => EntitlementRecord::Verified {
                vehicle_class,
                plan_id,
                expiry,
                reference_number: remote.reference_number(),
                verified_at: now,
            },
            (plan_id, expiry) => {
                tracing::warn!(
                    has_plan = plan_id.is_some(),
                    expiry = ?expiry,
                    "Verified subscription record is incomplete or expired; treating as none"
                );
                EntitlementRecord::None
            },
        };
    }

    if remote.is_pending() {
        if let Some(reference_number) = remote.reference_number() {
            return EntitlementRecord::Pending {
                vehicle_class,
                plan_id: non_empty(remote.plan_id.as_ref()),
                reference_number,
                submitted_at: remote
                    .payment_details
                    .as_ref()
                    .and_then(|details| details.payment_date),
            };
        }
        tracing::warn!("Pending subscription record has no payment reference; treating as none");
    }

    EntitlementRecord::None
}
