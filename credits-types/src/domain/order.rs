//! Purchase orders and fulfillment outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::item::{DestinationId, ItemId};

/// Delivery state of a single purchased line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

/// One line item of a committed purchase, awaiting or past fulfillment.
///
/// Created atomically with its ledger debit; mutated only by the
/// asynchronous dispatch path. The debit is never rolled back on
/// fulfillment failure - a failed order is reconciled separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub account_id: AccountId,
    pub item_id: ItemId,
    pub destination_id: DestinationId,
    pub quantity: i64,
    /// Line total in smallest currency unit
    pub amount: i64,
    /// Gift recipient identifier, when the purchase was a gift
    pub recipient: Option<String>,
    pub status: OrderStatus,
    pub command_sent: Option<String>,
    pub command_response: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of executing one fulfillment command.
///
/// Transport-level errors are folded into `success == false`; callers
/// never need to distinguish them from an in-game rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub response: String,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            error: Some(error.into()),
        }
    }
}
