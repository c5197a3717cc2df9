//! Status enums for various entities.
//!
//! The shop API encodes these as single-letter codes.

use serde::{Deserialize, Serialize};

/// Order payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    #[serde(rename = "P")]
    Pending,
    #[serde(rename = "C")]
    Complete,
    #[serde(rename = "F")]
    Failed,
}

impl PaymentStatus {
    /// Customer-facing label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Oczekuje na płatność",
            Self::Complete => "Opłacone",
            Self::Failed => "Płatność nieudana",
        }
    }

    /// Only pending orders may be cancelled by the customer.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Customer loyalty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Membership {
    #[default]
    #[serde(rename = "B")]
    Bronze,
    #[serde(rename = "S")]
    Silver,
    #[serde(rename = "G")]
    Gold,
}

impl std::fmt::Display for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bronze => write!(f, "Brązowy"),
            Self::Silver => write!(f, "Srebrny"),
            Self::Gold => write!(f, "Złoty"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_wire_codes() {
        let status: PaymentStatus = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(status, PaymentStatus::Complete);
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Failed).unwrap(),
            "\"F\""
        );
        assert!(serde_json::from_str::<PaymentStatus>("\"X\"").is_err());
    }

    #[test]
    fn test_only_pending_is_cancellable() {
        assert!(PaymentStatus::Pending.is_cancellable());
        assert!(!PaymentStatus::Complete.is_cancellable());
        assert!(!PaymentStatus::Failed.is_cancellable());
    }

    #[test]
    fn test_membership_wire_codes() {
        let tier: Membership = serde_json::from_str("\"G\"").unwrap();
        assert_eq!(tier, Membership::Gold);
        assert_eq!(tier.to_string(), "Złoty");
    }
}
