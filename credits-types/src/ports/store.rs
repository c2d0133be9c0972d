//! Ledger store port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (SQLite, InMemory) will implement this trait.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Destination, DestinationId, EntryType, Item, ItemId, LedgerEntry,
    PaymentIntent, PaymentIntentId, PaymentMethod, PaymentStatus, PurchaseOrder,
};
use crate::dto::{CreateAccountRequest, Page, PurchaseLine};
use crate::error::RepoError;

/// A single credit or debit to apply to one account's ledger.
///
/// `amount` is always positive; the direction comes from the method it
/// is passed to. The entry's `balance_before`/`balance_after` pair is
/// filled in by the store inside the same transaction that moves the
/// balance.
#[derive(Debug, Clone)]
pub struct LedgerOp {
    pub account_id: AccountId,
    pub amount: i64,
    pub entry_type: EntryType,
    pub description: Option<String>,
    pub payment_id: Option<PaymentIntentId>,
    pub order_id: Option<Uuid>,
}

/// Result of [`LedgerStore::settle_intent`].
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// The intent transitioned to succeeded and the credit was written.
    Applied(LedgerEntry),
    /// The intent was already in a terminal succeeded state; nothing
    /// was written. Duplicate webhook deliveries end up here.
    AlreadySettled,
}

/// Everything written by one committed purchase.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub orders: Vec<PurchaseOrder>,
    pub debit: LedgerEntry,
    /// Total charged in smallest currency unit
    pub total: i64,
    pub new_balance: i64,
}

/// The main store port for ledger, payment and shop state.
///
/// All operations that modify balances MUST be atomic.
/// Implementations should use database transactions to ensure consistency.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a new account with zero balance.
    async fn create_account(&self, req: CreateAccountRequest) -> Result<Account, RepoError>;

    /// Gets an account by ID.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Lists all accounts.
    async fn list_accounts(&self) -> Result<Vec<Account>, RepoError>;

    /// Stores the gateway customer reference for an account.
    async fn set_gateway_customer(
        &self,
        id: AccountId,
        customer: &str,
    ) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger Operations (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Adds funds to an account and appends the matching entry.
    async fn credit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError>;

    /// Removes funds from an account and appends the matching entry.
    ///
    /// Fails with `DomainError::InsufficientFunds` when the balance
    /// cannot cover the amount; the balance is never driven negative.
    async fn debit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError>;

    /// Moves funds between two accounts, writing a linked out/in entry
    /// pair in one transaction.
    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
        note: Option<String>,
    ) -> Result<(LedgerEntry, LedgerEntry), RepoError>;

    /// Lists ledger entries for an account, newest first, optionally
    /// filtered by entry type.
    async fn list_entries(
        &self,
        account_id: AccountId,
        entry_type: Option<EntryType>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Intent Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persists a freshly created intent.
    async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), RepoError>;

    /// Records the gateway's reference, client secret and checkout URL
    /// once the gateway call has succeeded.
    async fn attach_gateway_ref(
        &self,
        id: PaymentIntentId,
        gateway_ref: &str,
        client_secret: Option<&str>,
        checkout_url: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Gets an intent by its external id.
    async fn get_intent(&self, id: PaymentIntentId) -> Result<Option<PaymentIntent>, RepoError>;

    /// Looks up an intent by the reference the gateway assigned to it.
    async fn find_intent_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<PaymentIntent>, RepoError>;

    /// Counts non-terminal intents created by an account since `cutoff`.
    async fn count_active_intents_since(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, RepoError>;

    /// Sums the amounts of an account's pending/processing intents.
    async fn pending_intent_total(&self, account_id: AccountId) -> Result<i64, RepoError>;

    /// Atomically marks the intent succeeded and credits the account.
    ///
    /// Idempotent: settling an already-succeeded intent is a no-op and
    /// reports [`SettleOutcome::AlreadySettled`]. Settling an intent in
    /// any other terminal state is a conflict.
    async fn settle_intent(
        &self,
        id: PaymentIntentId,
        event: &serde_json::Value,
    ) -> Result<SettleOutcome, RepoError>;

    /// Marks the intent failed with the given reason. Idempotent for
    /// intents already failed; a conflict for succeeded ones.
    async fn fail_intent(
        &self,
        id: PaymentIntentId,
        reason: &str,
        event: &serde_json::Value,
    ) -> Result<(), RepoError>;

    /// Marks a single overdue pending intent expired.
    async fn mark_intent_expired(&self, id: PaymentIntentId) -> Result<(), RepoError>;

    /// Sweeps all pending intents whose TTL elapsed before `now`.
    /// Returns how many were expired.
    async fn expire_stale_intents(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;

    /// Lists an account's intents, newest first, optionally filtered
    /// by status.
    async fn list_intents(
        &self,
        account_id: AccountId,
        status: Option<PaymentStatus>,
        page: Page,
    ) -> Result<Vec<PaymentIntent>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment Method Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts or reactivates a stored payment method.
    async fn upsert_method(&self, method: &PaymentMethod) -> Result<(), RepoError>;

    /// Lists an account's active payment methods.
    async fn list_methods(&self, account_id: AccountId) -> Result<Vec<PaymentMethod>, RepoError>;

    /// Soft-deletes a stored payment method.
    async fn detach_method(&self, account_id: AccountId, token: &str) -> Result<(), RepoError>;

    /// Makes the given method the account's default, clearing any
    /// previous default in the same transaction.
    async fn set_default_method(
        &self,
        account_id: AccountId,
        token: &str,
    ) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Shop Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets an item by ID.
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, RepoError>;

    /// Lists active items.
    async fn list_items(&self) -> Result<Vec<Item>, RepoError>;

    /// Inserts a new item and returns it with its assigned id.
    async fn create_item(&self, item: Item) -> Result<Item, RepoError>;

    /// Gets a fulfillment destination by ID.
    async fn get_destination(&self, id: DestinationId) -> Result<Option<Destination>, RepoError>;

    /// Inserts a new destination and returns it with its assigned id.
    async fn create_destination(&self, dest: Destination) -> Result<Destination, RepoError>;

    /// Commits a purchase: validates stock and funds, debits the
    /// account once for the basket total, decrements stock and inserts
    /// one pending order per line. All inside one transaction; any
    /// failure leaves nothing written.
    async fn purchase(
        &self,
        account_id: AccountId,
        destination_id: DestinationId,
        lines: &[PurchaseLine],
        recipient: Option<String>,
    ) -> Result<PurchaseReceipt, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Order Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets an order by ID.
    async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, RepoError>;

    /// Lists an account's orders, newest first.
    async fn list_orders(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<PurchaseOrder>, RepoError>;

    /// Records the command about to be dispatched for an order.
    async fn mark_order_processing(&self, id: Uuid, command: &str) -> Result<(), RepoError>;

    /// Records a successful delivery.
    async fn complete_order(&self, id: Uuid, response: &str) -> Result<(), RepoError>;

    /// Records a failed delivery. The original debit stays in place.
    async fn fail_order(&self, id: Uuid, reason: &str) -> Result<(), RepoError>;
}
