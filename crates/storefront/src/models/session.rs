//! Session-related types.
//!
//! Types stored in the visitor's session: the cart and checkout progress.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use muscle_shop_core::{OrderNumber, PaymentMethod, SubmissionId};

/// A `Submitting` phase older than this is treated as abandoned.
const SUBMISSION_STALE_AFTER: TimeDelta = TimeDelta::minutes(2);

/// Checkout progress for one visitor.
///
/// `Idle → Submitting → Succeeded | Failed`. A failed submission may be
/// retried, which starts a new `Submitting` phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Submitting {
        submission_id: SubmissionId,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        order_number: OrderNumber,
        payment_method: PaymentMethod,
    },
    Failed {
        message: String,
    },
}

impl CheckoutPhase {
    /// Whether a submission is currently being processed.
    #[must_use]
    pub fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Submitting { started_at, .. } if now - *started_at < SUBMISSION_STALE_AFTER)
    }
}

/// Session keys for storefront data.
pub mod keys {
    /// Key for the visitor's cart.
    pub const CART: &str = "cart";

    /// Key for the visitor's checkout progress.
    pub const CHECKOUT: &str = "checkout";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_only_while_recent() {
        let now = Utc::now();
        let fresh = CheckoutPhase::Submitting {
            submission_id: SubmissionId::random(),
            started_at: now - TimeDelta::seconds(5),
        };
        let stale = CheckoutPhase::Submitting {
            submission_id: SubmissionId::random(),
            started_at: now - TimeDelta::minutes(10),
        };

        assert!(fresh.is_in_flight(now));
        assert!(!stale.is_in_flight(now));
        assert!(!CheckoutPhase::Idle.is_in_flight(now));
    }

    #[test]
    fn test_serialized_with_state_tag() {
        let json = serde_json::to_value(CheckoutPhase::Failed {
            message: "retry".to_owned(),
        })
        .ok();
        assert_eq!(
            json,
            Some(serde_json::json!({ "state": "failed", "message": "retry" }))
        );
    }
}
