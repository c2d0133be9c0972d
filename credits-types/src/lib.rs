//! # Credits Types
//!
//! Domain types and port traits for the virtual-goods credits service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Account, LedgerEntry, PaymentIntent, ...)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Account, AccountId, CommandOutcome, Currency, Destination, DestinationId, EntryType,
    EventParseError, GatewayEvent, Item, ItemId, LedgerEntry, LedgerEntryId, Money, OrderStatus,
    PaymentIntent, PaymentIntentId, PaymentMethod, PaymentStatus, PurchaseOrder,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    Fulfillment, GatewayCheckout, GatewayError, GatewayIntent, GatewayIntentStatus, LedgerOp,
    LedgerStore, MethodDetails, PaymentGateway, PurchaseReceipt, SettleOutcome,
};
