//! Database row structs and conversions to domain types.
//!
//! SQLite stores UUIDs and timestamps as TEXT; every conversion back to
//! the domain goes through these helpers so parse failures surface as
//! `RepoError::Database` instead of panics.

use sqlx::FromRow;
use uuid::Uuid;

use credits_types::{
    Account, AccountId, Currency, Destination, DestinationId, EntryType, Item, ItemId,
    LedgerEntry, LedgerEntryId, Money, PaymentIntent, PaymentIntentId, PaymentMethod,
    PaymentStatus, PurchaseOrder, RepoError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()))
}

pub fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>, RepoError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepoError::Database(e.to_string()))
}

fn parse_opt_timestamp(
    s: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, RepoError> {
    s.map(|s| parse_timestamp(&s)).transpose()
}

pub fn parse_currency(s: &str) -> Result<Currency, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown currency: {}", s)))
}

fn parse_entry_type(s: &str) -> Result<EntryType, RepoError> {
    s.parse().map_err(RepoError::Database)
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus, RepoError> {
    s.parse().map_err(RepoError::Database)
}

fn parse_order_status(s: &str) -> Result<credits_types::OrderStatus, RepoError> {
    s.parse().map_err(RepoError::Database)
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Account row from database.
#[derive(FromRow)]
pub struct DbAccount {
    pub id: String,
    pub name: String,
    pub balance: i64,
    pub currency: String,
    pub gateway_customer: Option<String>,
    pub created_at: String,
}

impl DbAccount {
    pub fn into_domain(self) -> Result<Account, RepoError> {
        let currency = parse_currency(&self.currency)?;
        let balance = Money::balance(self.balance, currency);

        Ok(Account::from_parts(
            AccountId::from_uuid(parse_uuid(&self.id)?),
            self.name,
            balance,
            self.gateway_customer,
            parse_timestamp(&self.created_at)?,
        ))
    }
}

/// Balance and currency row for funds checks inside transactions.
#[derive(FromRow)]
pub struct DbBalance {
    pub balance: i64,
    pub currency: String,
}

/// Ledger entry row from database.
#[derive(FromRow)]
pub struct DbLedgerEntry {
    pub id: String,
    pub account_id: String,
    pub amount: i64,
    pub entry_type: String,
    pub description: Option<String>,
    pub balance_before: i64,
    pub balance_after: i64,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub related_entry_id: Option<String>,
    pub created_at: String,
}

impl DbLedgerEntry {
    pub fn into_domain(self) -> Result<LedgerEntry, RepoError> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(parse_uuid(&self.id)?),
            account_id: AccountId::from_uuid(parse_uuid(&self.account_id)?),
            amount: self.amount,
            entry_type: parse_entry_type(&self.entry_type)?,
            description: self.description,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            payment_id: self
                .payment_id
                .map(|s| parse_uuid(&s).map(PaymentIntentId::from_uuid))
                .transpose()?,
            order_id: self.order_id.map(|s| parse_uuid(&s)).transpose()?,
            related_entry_id: self
                .related_entry_id
                .map(|s| parse_uuid(&s).map(LedgerEntryId::from_uuid))
                .transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Payment intent row from database.
#[derive(FromRow)]
pub struct DbPayment {
    pub id: String,
    pub account_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub gateway_ref: Option<String>,
    pub client_secret: Option<String>,
    pub checkout_url: Option<String>,
    pub failure_reason: Option<String>,
    pub last_event: Option<String>,
    pub created_at: String,
    pub confirmed_at: Option<String>,
    pub expires_at: String,
}

impl DbPayment {
    pub fn into_domain(self) -> Result<PaymentIntent, RepoError> {
        let currency = parse_currency(&self.currency)?;
        let amount = Money::new(self.amount, currency).map_err(RepoError::Domain)?;
        let last_event = self
            .last_event
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(PaymentIntent {
            id: PaymentIntentId::from_uuid(parse_uuid(&self.id)?),
            account_id: AccountId::from_uuid(parse_uuid(&self.account_id)?),
            amount,
            status: parse_payment_status(&self.status)?,
            gateway_ref: self.gateway_ref,
            client_secret: self.client_secret,
            checkout_url: self.checkout_url,
            failure_reason: self.failure_reason,
            last_event,
            created_at: parse_timestamp(&self.created_at)?,
            confirmed_at: parse_opt_timestamp(self.confirmed_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

/// Payment method row from database.
#[derive(FromRow)]
pub struct DbMethod {
    pub token: String,
    pub account_id: String,
    pub method_type: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: i64,
    pub is_active: i64,
    pub created_at: String,
}

impl DbMethod {
    pub fn into_domain(self) -> Result<PaymentMethod, RepoError> {
        Ok(PaymentMethod {
            token: self.token,
            account_id: AccountId::from_uuid(parse_uuid(&self.account_id)?),
            method_type: self.method_type,
            brand: self.brand,
            last4: self.last4,
            exp_month: self.exp_month,
            exp_year: self.exp_year,
            is_default: self.is_default != 0,
            is_active: self.is_active != 0,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Item row from database.
#[derive(FromRow)]
pub struct DbItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub price: i64,
    pub currency: String,
    pub command: String,
    pub stock: i64,
    pub is_active: i64,
}

impl DbItem {
    pub fn into_domain(self) -> Result<Item, RepoError> {
        let currency = parse_currency(&self.currency)?;
        let price = Money::new(self.price, currency).map_err(RepoError::Domain)?;

        Ok(Item {
            id: ItemId(self.id),
            name: self.name,
            code: self.code,
            price,
            command: self.command,
            stock: self.stock,
            is_active: self.is_active != 0,
        })
    }
}

/// Destination row from database.
#[derive(FromRow)]
pub struct DbDestination {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub password: String,
}

impl DbDestination {
    pub fn into_domain(self) -> Result<Destination, RepoError> {
        let port = u16::try_from(self.port)
            .map_err(|_| RepoError::Database(format!("Invalid port: {}", self.port)))?;

        Ok(Destination {
            id: DestinationId(self.id),
            name: self.name,
            host: self.host,
            port,
            password: self.password,
        })
    }
}

/// Order row from database.
#[derive(FromRow)]
pub struct DbOrder {
    pub id: String,
    pub account_id: String,
    pub item_id: i64,
    pub destination_id: i64,
    pub quantity: i64,
    pub amount: i64,
    pub recipient: Option<String>,
    pub status: String,
    pub command_sent: Option<String>,
    pub command_response: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl DbOrder {
    pub fn into_domain(self) -> Result<PurchaseOrder, RepoError> {
        Ok(PurchaseOrder {
            id: parse_uuid(&self.id)?,
            account_id: AccountId::from_uuid(parse_uuid(&self.account_id)?),
            item_id: ItemId(self.item_id),
            destination_id: DestinationId(self.destination_id),
            quantity: self.quantity,
            amount: self.amount,
            recipient: self.recipient,
            status: parse_order_status(&self.status)?,
            command_sent: self.command_sent,
            command_response: self.command_response,
            failure_reason: self.failure_reason,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: parse_opt_timestamp(self.completed_at)?,
        })
    }
}
