//! Payment intent state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::money::Money;

/// Externally visible identifier of a PaymentIntent.
///
/// Distinct from the database surrogate key; this is the only id ever
/// handed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentIntentId(Uuid);

impl PaymentIntentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentIntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PaymentIntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PaymentIntentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a payment intent.
///
/// `pending → {processing} → {succeeded | failed | expired}`; the last
/// three are terminal and are never left once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

/// A tracked attempt to move real money into platform credit.
///
/// Amount and currency are immutable after creation; status mutates only
/// through the lifecycle manager's transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub account_id: AccountId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Reference id assigned by the payment gateway
    pub gateway_ref: Option<String>,
    /// Client secret for in-app confirmation flows
    pub client_secret: Option<String>,
    /// Hosted checkout URL, when a checkout session was created
    pub checkout_url: Option<String>,
    pub failure_reason: Option<String>,
    /// Raw payload of the last webhook applied to this intent
    pub last_event: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Creates a fresh pending intent with the given time-to-live.
    pub fn new(account_id: AccountId, amount: Money, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentIntentId::new(),
            account_id,
            amount,
            status: PaymentStatus::Pending,
            gateway_ref: None,
            client_secret: None,
            checkout_url: None,
            failure_reason: None,
            last_event: None,
            created_at: now,
            confirmed_at: None,
            expires_at: now + ttl,
        }
    }

    /// True when the session TTL has elapsed while the intent is still open.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    #[test]
    fn test_terminal_states() {
        assert!(PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }

    #[test]
    fn test_expiry_window() {
        let amount = Money::new(10000, Currency::THB).unwrap();
        let intent = PaymentIntent::new(AccountId::new(), amount, Duration::minutes(30));

        assert!(!intent.is_expired(Utc::now()));
        assert!(intent.is_expired(Utc::now() + Duration::minutes(31)));
    }

    #[test]
    fn test_terminal_intent_never_expires() {
        let amount = Money::new(10000, Currency::THB).unwrap();
        let mut intent = PaymentIntent::new(AccountId::new(), amount, Duration::minutes(30));
        intent.status = PaymentStatus::Succeeded;

        assert!(!intent.is_expired(Utc::now() + Duration::hours(2)));
    }
}
