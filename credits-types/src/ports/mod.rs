//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod fulfillment;
mod gateway;
mod store;

pub use fulfillment::Fulfillment;
pub use gateway::{
    GatewayCheckout, GatewayError, GatewayIntent, GatewayIntentStatus, MethodDetails,
    PaymentGateway,
};
pub use store::{LedgerOp, LedgerStore, PurchaseReceipt, SettleOutcome};
