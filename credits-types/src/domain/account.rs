//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::{Currency, Money};
use crate::error::DomainError;

/// Unique identifier for an Account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random AccountId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AccountId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A platform account holding a spendable credit balance.
///
/// The balance is derived state: at all times it equals the sum of the
/// account's ledger entry amounts since creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,
    /// Display name of the account holder
    pub name: String,
    /// Current credit balance (includes currency information)
    pub balance: Money,
    /// Customer reference at the payment gateway, if one exists
    pub gateway_customer: Option<String>,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with zero balance.
    ///
    /// # Validation
    /// - Name cannot be empty
    pub fn new(name: String, currency: Currency) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Account name cannot be empty".into(),
            ));
        }

        Ok(Self {
            id: AccountId::new(),
            name,
            balance: Money::zero(currency),
            gateway_customer: None,
            created_at: Utc::now(),
        })
    }

    /// Reconstructs an account from database fields.
    pub fn from_parts(
        id: AccountId,
        name: String,
        balance: Money,
        gateway_customer: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            balance,
            gateway_customer,
            created_at,
        }
    }

    /// Returns the currency of this account.
    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }

    /// Checks if the account can cover a funds-checked debit.
    pub fn has_sufficient_funds(&self, amount: &Money) -> bool {
        self.balance.currency() == amount.currency() && self.balance.gte(amount)
    }
}
