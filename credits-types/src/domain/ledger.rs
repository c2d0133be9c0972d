//! Append-only credit ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::payment::PaymentIntentId;

/// Unique identifier for a LedgerEntry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(Uuid);

impl LedgerEntryId {
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

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LedgerEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of balance-changing event a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Settled payment-gateway top-up
    Deposit,
    /// Shop purchase debit
    Purchase,
    /// Incoming peer-to-peer transfer
    TransferIn,
    /// Outgoing peer-to-peer transfer
    TransferOut,
    /// Gateway refund credited back
    Refund,
    /// Manual adjustment by an operator
    AdminAdjust,
    /// Gamification payout (loyalty, spin wheel, daily reward)
    Reward,
}

impl EntryType {
    /// Debit types that must not drive the balance negative.
    /// All other types apply unconditionally.
    pub fn requires_funds(&self) -> bool {
        matches!(self, EntryType::Purchase | EntryType::TransferOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Purchase => "purchase",
            EntryType::TransferIn => "transfer_in",
            EntryType::TransferOut => "transfer_out",
            EntryType::Refund => "refund",
            EntryType::AdminAdjust => "admin_adjust",
            EntryType::Reward => "reward",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryType::Deposit),
            "purchase" => Ok(EntryType::Purchase),
            "transfer_in" => Ok(EntryType::TransferIn),
            "transfer_out" => Ok(EntryType::TransferOut),
            "refund" => Ok(EntryType::Refund),
            "admin_adjust" => Ok(EntryType::AdminAdjust),
            "reward" => Ok(EntryType::Reward),
            other => Err(format!("Unknown entry type: {}", other)),
        }
    }
}

/// One immutable row of the account credit ledger.
///
/// Entries are created once and never mutated or deleted - they are the
/// audit trail. Invariant: `balance_after = balance_before + amount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    /// Signed amount in smallest currency unit: credits positive, debits negative
    pub amount: i64,
    pub entry_type: EntryType,
    pub description: Option<String>,
    pub balance_before: i64,
    pub balance_after: i64,
    /// The payment intent that funded this entry, for deposits/refunds
    pub payment_id: Option<PaymentIntentId>,
    /// The purchase order this entry paid for
    pub order_id: Option<Uuid>,
    /// The opposite leg of a transfer
    pub related_entry_id: Option<LedgerEntryId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when the arithmetic invariant holds for this entry.
    pub fn is_balanced(&self) -> bool {
        self.balance_after == self.balance_before + self.amount
    }
}
