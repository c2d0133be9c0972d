//! Stored payment method references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// A tokenized payment method attached to an account.
///
/// Only display metadata is stored locally; the token references the
/// real instrument held at the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Gateway token, e.g. `pm_...`
    pub token: String,
    pub account_id: AccountId,
    pub method_type: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
