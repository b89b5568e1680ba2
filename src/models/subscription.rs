//! Subscription model for billing state.

use serde::{Deserialize, Serialize};

/// Subscription state mirrored from the payment provider via webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

/// Subscription record stored in Firestore (keyed by owner email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Owner email address
    pub email: String,
    /// Plan identifier from the provider ("pro", "starter", ...)
    pub plan: String,
    pub status: SubscriptionStatus,
    /// End of the current billing period (ISO 8601)
    pub current_period_end: Option<String>,
    pub updated_at: String,
}

impl Subscription {
    /// Whether this subscription currently unlocks premium features.
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
