//! Shop items and fulfillment destinations.

use serde::{Deserialize, Serialize};

use super::money::Money;

/// Unique identifier for a shop Item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a fulfillment Destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A purchasable virtual good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Stable short code for operator tooling
    pub code: String,
    pub price: Money,
    /// Remote-console command that delivers the item in-game
    pub command: String,
    /// Remaining stock; -1 means unlimited
    pub stock: i64,
    pub is_active: bool,
}

impl Item {
    /// True when the requested quantity can be taken from stock.
    pub fn has_stock(&self, quantity: i64) -> bool {
        self.stock == -1 || self.stock >= quantity
    }
}

/// A game server that purchased goods are delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Remote-console password; never serialized out to clients
    #[serde(skip_serializing)]
    pub password: String,
}
