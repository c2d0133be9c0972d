//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountId, Currency, DestinationId, EntryType, ItemId, LedgerEntryId, OrderStatus,
    PaymentIntentId, PaymentStatus,
};

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a new credit account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Name of the account holder
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency: Currency,
}

fn default_currency() -> Currency {
    Currency::THB
}

/// Account state as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    /// Unique account identifier
    pub id: AccountId,
    pub name: String,
    /// Current balance in smallest currency unit
    pub balance: i64,
    pub currency: Currency,
}

/// Current balance of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: i64,
    pub currency: Currency,
    /// Sum of amounts on intents still pending or processing
    pub pending: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to start a top-up payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub account_id: AccountId,
    /// Amount to pay in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    /// When true, a hosted checkout session is created instead of a
    /// bare payment intent
    #[serde(default)]
    pub hosted_checkout: bool,
}

/// Payment intent state as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResponse {
    pub id: PaymentIntentId,
    pub account_id: AccountId,
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request to attach a tokenized payment method to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachMethodRequest {
    pub account_id: AccountId,
    /// Gateway token, e.g. `pm_...`
    pub token: String,
    #[serde(default)]
    pub set_default: bool,
}

/// Stored payment method metadata as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResponse {
    pub token: String,
    pub method_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<i32>,
    pub is_default: bool,
}

/// Result of handling a single webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    /// `applied`, `ignored` or `duplicate`
    pub outcome: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// One row of an account's ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResponse {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    /// Signed amount in smallest currency unit
    pub amount: i64,
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub balance_before: i64,
    pub balance_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentIntentId>,
    pub created_at: DateTime<Utc>,
}

/// Manual balance adjustment by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub account_id: AccountId,
    /// Signed amount; negative values debit the account
    pub amount: i64,
    pub reason: String,
}

/// Gamification credit granted to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRequest {
    pub account_id: AccountId,
    /// Amount to grant in smallest currency unit
    pub amount: i64,
    /// What earned the reward, e.g. `daily_login`
    pub reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transfer DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to move credits between two accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Amount to transfer in smallest currency unit
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Response after a completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    /// Debit entry on the sender's ledger
    pub out_entry_id: LedgerEntryId,
    /// Credit entry on the recipient's ledger
    pub in_entry_id: LedgerEntryId,
    pub from_balance: i64,
    pub to_balance: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shop DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// One line of a purchase basket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Request to buy one or more items in a single atomic charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub account_id: AccountId,
    pub destination_id: DestinationId,
    pub lines: Vec<PurchaseLine>,
    /// In-game recipient identifier; when set, the purchase is a gift
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Response after a committed purchase; delivery runs asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub order_ids: Vec<uuid::Uuid>,
    /// Total charged in smallest currency unit
    pub total: i64,
    pub new_balance: i64,
}

/// Order state as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: uuid::Uuid,
    pub account_id: AccountId,
    pub item_id: ItemId,
    pub destination_id: DestinationId,
    pub quantity: i64,
    pub amount: i64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared
// ─────────────────────────────────────────────────────────────────────────────

/// Cursor-less pagination window for list endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Page {
    /// Clamps the window to sane bounds before it reaches SQL.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 200),
            offset: self.offset.max(0),
        }
    }
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable error code
    pub code: String,
    pub message: String,
}
