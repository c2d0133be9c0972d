//! # Credits Core
//!
//! Application service layer and HTTP adapter for the credits service.
//!
//! ## Architecture
//!
//! - `payments` - payment intent lifecycle and webhook reconciliation
//! - `store` - purchase orchestration and fulfillment dispatch
//! - `credits` - ledger-facing operations (balance, transfer, history)
//! - `inbound` - HTTP adapter (Axum server)
//!
//! Every service is generic over the port traits, so adapters are
//! injected at compile time and tests run against in-memory mocks.

pub mod credits;
pub mod inbound;
pub mod payments;
pub mod store;

#[cfg(test)]
mod service_tests;

pub use credits::CreditsService;
pub use payments::{PaymentConfig, PaymentService};
pub use store::StoreService;
