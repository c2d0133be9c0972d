//! Pure domain types - no IO, no framework dependencies.

mod account;
mod event;
mod item;
mod ledger;
mod method;
mod money;
mod order;
mod payment;

pub use account::{Account, AccountId};
pub use event::{EventParseError, GatewayEvent};
pub use item::{Destination, DestinationId, Item, ItemId};
pub use ledger::{EntryType, LedgerEntry, LedgerEntryId};
pub use method::PaymentMethod;
pub use money::{Currency, Money};
pub use order::{CommandOutcome, OrderStatus, PurchaseOrder};
pub use payment::{PaymentIntent, PaymentIntentId, PaymentStatus};
