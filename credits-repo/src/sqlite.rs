//! SQLite ledger store adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

use credits_types::{
    Account, AccountId, CreateAccountRequest, Destination, DestinationId, DomainError, EntryType,
    Item, ItemId, LedgerEntry, LedgerEntryId, LedgerOp, LedgerStore, Money, PaymentIntent,
    PaymentIntentId, PaymentMethod, PaymentStatus, PurchaseLine, PurchaseOrder, PurchaseReceipt,
    RepoError, SettleOutcome,
};
use credits_types::dto::Page;

use crate::types::{
    DbAccount, DbBalance, DbDestination, DbItem, DbLedgerEntry, DbMethod, DbOrder, DbPayment,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite ledger store implementation.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a new SQLite store with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        let mut in_memory = database_url.contains(":memory:");
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path == ":memory:" {
                in_memory = true;
            } else {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each in-memory connection is its own database, so the pool
        // must stay at a single connection to share state.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let ddl = include_str!("../migrations/0001_create_tables.sql");
        sqlx::query(ddl).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a write transaction. Every write path reads before it
    /// updates, and SQLite will not upgrade a deferred transaction that
    /// lost the race for the write lock; IMMEDIATE takes the lock up
    /// front so concurrent writers queue on the busy timeout.
    async fn begin_write(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>, RepoError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared transaction helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Moves one account's balance and appends the matching ledger entry,
/// inside the caller's transaction.
///
/// `signed` is the balance delta. Funds-checked entry types refuse to
/// drive the balance negative; other types apply unconditionally.
async fn write_entry(
    conn: &mut sqlx::SqliteConnection,
    id: LedgerEntryId,
    op: &LedgerOp,
    signed: i64,
    related: Option<LedgerEntryId>,
) -> Result<LedgerEntry, RepoError> {
    let account_id_str = op.account_id.to_string();

    let row: Option<DbBalance> =
        sqlx::query_as(r#"SELECT balance, currency FROM accounts WHERE id = ?"#)
            .bind(&account_id_str)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

    let row = row.ok_or(RepoError::NotFound)?;

    if signed < 0 && op.entry_type.requires_funds() && row.balance + signed < 0 {
        return Err(RepoError::Domain(DomainError::InsufficientFunds {
            available: row.balance,
            requested: -signed,
        }));
    }

    let balance_after = row.balance + signed;
    let now = Utc::now();

    sqlx::query(r#"UPDATE accounts SET balance = ? WHERE id = ?"#)
        .bind(balance_after)
        .bind(&account_id_str)
        .execute(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

    sqlx::query(
        r#"INSERT INTO ledger_entries
               (id, account_id, amount, entry_type, description,
                balance_before, balance_after, payment_id, order_id, related_entry_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(id.to_string())
    .bind(&account_id_str)
    .bind(signed)
    .bind(op.entry_type.as_str())
    .bind(&op.description)
    .bind(row.balance)
    .bind(balance_after)
    .bind(op.payment_id.map(|p| p.to_string()))
    .bind(op.order_id.map(|o| o.to_string()))
    .bind(related.map(|r| r.to_string()))
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    Ok(LedgerEntry {
        id,
        account_id: op.account_id,
        amount: signed,
        entry_type: op.entry_type,
        description: op.description.clone(),
        balance_before: row.balance,
        balance_after,
        payment_id: op.payment_id,
        order_id: op.order_id,
        related_entry_id: related,
        created_at: now,
    })
}

fn require_positive(amount: i64) -> Result<(), RepoError> {
    if amount <= 0 {
        return Err(RepoError::Domain(DomainError::NonPositiveAmount));
    }
    Ok(())
}

const PAYMENT_COLS: &str = "id, account_id, amount, currency, status, gateway_ref, client_secret, \
     checkout_url, failure_reason, last_event, created_at, confirmed_at, expires_at";

const ORDER_COLS: &str = "id, account_id, item_id, destination_id, quantity, amount, recipient, \
     status, command_sent, command_response, failure_reason, created_at, completed_at";

// ─────────────────────────────────────────────────────────────────────────────
// Store implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn create_account(&self, req: CreateAccountRequest) -> Result<Account, RepoError> {
        // Validate first
        let account = Account::new(req.name, req.currency).map_err(RepoError::Domain)?;

        sqlx::query(
            r#"INSERT INTO accounts (id, name, balance, currency, created_at)
               VALUES (?, ?, 0, ?, ?)"#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(account.currency().to_string())
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let row: Option<DbAccount> = sqlx::query_as(
            r#"SELECT id, name, balance, currency, gateway_customer, created_at
               FROM accounts WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbAccount::into_domain).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, RepoError> {
        let rows: Vec<DbAccount> = sqlx::query_as(
            r#"SELECT id, name, balance, currency, gateway_customer, created_at
               FROM accounts ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbAccount::into_domain).collect()
    }

    async fn set_gateway_customer(&self, id: AccountId, customer: &str) -> Result<(), RepoError> {
        let result = sqlx::query(r#"UPDATE accounts SET gateway_customer = ? WHERE id = ?"#)
            .bind(customer)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn credit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError> {
        require_positive(op.amount)?;

        let mut db_tx = self.begin_write().await?;

        let entry = write_entry(&mut *db_tx, LedgerEntryId::new(), &op, op.amount, None).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(entry)
    }

    async fn debit(&self, op: LedgerOp) -> Result<LedgerEntry, RepoError> {
        require_positive(op.amount)?;

        let mut db_tx = self.begin_write().await?;

        let entry = write_entry(&mut *db_tx, LedgerEntryId::new(), &op, -op.amount, None).await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(entry)
    }

    async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
        note: Option<String>,
    ) -> Result<(LedgerEntry, LedgerEntry), RepoError> {
        require_positive(amount)?;
        if from == to {
            return Err(RepoError::Domain(DomainError::SelfTransfer));
        }

        let mut db_tx = self.begin_write().await?;

        // Check both accounts up front so the error names the right one
        // and cross-currency transfers never reach the ledger.
        let source: Option<DbBalance> =
            sqlx::query_as(r#"SELECT balance, currency FROM accounts WHERE id = ?"#)
                .bind(from.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        let source = source.ok_or(RepoError::Domain(DomainError::AccountNotFound(from)))?;

        let dest: Option<DbBalance> =
            sqlx::query_as(r#"SELECT balance, currency FROM accounts WHERE id = ?"#)
                .bind(to.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        let dest = dest.ok_or(RepoError::Domain(DomainError::AccountNotFound(to)))?;

        if source.currency != dest.currency {
            return Err(RepoError::Domain(DomainError::CrossCurrencyTransfer));
        }
        if source.balance < amount {
            return Err(RepoError::Domain(DomainError::InsufficientFunds {
                available: source.balance,
                requested: amount,
            }));
        }

        let out_id = LedgerEntryId::new();
        let in_id = LedgerEntryId::new();

        let out_op = LedgerOp {
            account_id: from,
            amount,
            entry_type: EntryType::TransferOut,
            description: note.clone(),
            payment_id: None,
            order_id: None,
        };
        let in_op = LedgerOp {
            account_id: to,
            amount,
            entry_type: EntryType::TransferIn,
            description: note,
            payment_id: None,
            order_id: None,
        };

        // Touch accounts in ascending id order so concurrent transfers
        // between the same pair never deadlock.
        let (out_entry, in_entry) = if from < to {
            let out = write_entry(&mut *db_tx, out_id, &out_op, -amount, Some(in_id)).await?;
            let inn = write_entry(&mut *db_tx, in_id, &in_op, amount, Some(out_id)).await?;
            (out, inn)
        } else {
            let inn = write_entry(&mut *db_tx, in_id, &in_op, amount, Some(out_id)).await?;
            let out = write_entry(&mut *db_tx, out_id, &out_op, -amount, Some(in_id)).await?;
            (out, inn)
        };

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok((out_entry, in_entry))
    }

    async fn list_entries(
        &self,
        account_id: AccountId,
        entry_type: Option<EntryType>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, RepoError> {
        let page = page.clamped();

        const ENTRY_COLS: &str = "id, account_id, amount, entry_type, description, \
             balance_before, balance_after, payment_id, order_id, related_entry_id, created_at";

        let rows: Vec<DbLedgerEntry> = match entry_type {
            Some(entry_type) => sqlx::query_as(&format!(
                "SELECT {} FROM ledger_entries WHERE account_id = ? AND entry_type = ?
                 ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                ENTRY_COLS
            ))
            .bind(account_id.to_string())
            .bind(entry_type.as_str())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "SELECT {} FROM ledger_entries WHERE account_id = ?
                 ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                ENTRY_COLS
            ))
            .bind(account_id.to_string())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbLedgerEntry::into_domain).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment intents
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payments
                   (id, account_id, amount, currency, status, gateway_ref, client_secret,
                    checkout_url, failure_reason, last_event, created_at, confirmed_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(intent.id.to_string())
        .bind(intent.account_id.to_string())
        .bind(intent.amount.amount())
        .bind(intent.amount.currency().to_string())
        .bind(intent.status.as_str())
        .bind(&intent.gateway_ref)
        .bind(&intent.client_secret)
        .bind(&intent.checkout_url)
        .bind(&intent.failure_reason)
        .bind(intent.last_event.as_ref().map(|v| v.to_string()))
        .bind(intent.created_at.to_rfc3339())
        .bind(intent.confirmed_at.map(|t| t.to_rfc3339()))
        .bind(intent.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn attach_gateway_ref(
        &self,
        id: PaymentIntentId,
        gateway_ref: &str,
        client_secret: Option<&str>,
        checkout_url: Option<&str>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments SET gateway_ref = ?, client_secret = ?, checkout_url = ?
               WHERE id = ?"#,
        )
        .bind(gateway_ref)
        .bind(client_secret)
        .bind(checkout_url)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn get_intent(&self, id: PaymentIntentId) -> Result<Option<PaymentIntent>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_intent_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<PaymentIntent>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE gateway_ref = ?",
            PAYMENT_COLS
        ))
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn count_active_intents_since(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM payments
               WHERE account_id = ? AND status IN ('pending', 'processing') AND created_at > ?"#,
        )
        .bind(account_id.to_string())
        .bind(cutoff.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(count)
    }

    async fn pending_intent_total(&self, account_id: AccountId) -> Result<i64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(amount), 0) FROM payments
               WHERE account_id = ? AND status IN ('pending', 'processing')"#,
        )
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(total)
    }

    async fn settle_intent(
        &self,
        id: PaymentIntentId,
        event: &serde_json::Value,
    ) -> Result<SettleOutcome, RepoError> {
        let mut db_tx = self.begin_write().await?;

        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let intent = row.ok_or(RepoError::NotFound)?.into_domain()?;

        match intent.status {
            PaymentStatus::Succeeded => return Ok(SettleOutcome::AlreadySettled),
            PaymentStatus::Failed | PaymentStatus::Expired => {
                return Err(RepoError::Conflict(format!(
                    "Cannot settle intent in state {}",
                    intent.status
                )));
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let now = Utc::now();
        sqlx::query(
            r#"UPDATE payments SET status = 'succeeded', confirmed_at = ?, last_event = ?
               WHERE id = ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(event.to_string())
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let op = LedgerOp {
            account_id: intent.account_id,
            amount: intent.amount.amount(),
            entry_type: EntryType::Deposit,
            description: Some("Credit top-up".to_string()),
            payment_id: Some(id),
            order_id: None,
        };
        let entry = write_entry(
            &mut db_tx,
            LedgerEntryId::new(),
            &op,
            intent.amount.amount(),
            None,
        )
        .await?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(SettleOutcome::Applied(entry))
    }

    async fn fail_intent(
        &self,
        id: PaymentIntentId,
        reason: &str,
        event: &serde_json::Value,
    ) -> Result<(), RepoError> {
        let mut db_tx = self.begin_write().await?;

        let status: Option<String> =
            sqlx::query_scalar(r#"SELECT status FROM payments WHERE id = ?"#)
                .bind(id.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        match status.as_deref() {
            None => return Err(RepoError::NotFound),
            // Duplicate failure notifications are a no-op, and a failure
            // arriving after local expiry keeps the expired state.
            Some("failed") | Some("expired") => return Ok(()),
            Some("succeeded") => {
                return Err(RepoError::Conflict(
                    "Cannot fail an intent that already succeeded".to_string(),
                ));
            }
            Some(_) => {}
        }

        sqlx::query(
            r#"UPDATE payments SET status = 'failed', failure_reason = ?, last_event = ?
               WHERE id = ?"#,
        )
        .bind(reason)
        .bind(event.to_string())
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn mark_intent_expired(&self, id: PaymentIntentId) -> Result<(), RepoError> {
        // Only a pending intent can lapse; a webhook that raced us wins.
        sqlx::query(
            r#"UPDATE payments SET status = 'expired', failure_reason = 'expired'
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn expire_stale_intents(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"UPDATE payments SET status = 'expired', failure_reason = 'expired'
               WHERE status = 'pending' AND expires_at < ?"#,
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_intents(
        &self,
        account_id: AccountId,
        status: Option<PaymentStatus>,
        page: Page,
    ) -> Result<Vec<PaymentIntent>, RepoError> {
        let page = page.clamped();

        let rows: Vec<DbPayment> = match status {
            Some(status) => sqlx::query_as(&format!(
                "SELECT {} FROM payments WHERE account_id = ? AND status = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                PAYMENT_COLS
            ))
            .bind(account_id.to_string())
            .bind(status.as_str())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "SELECT {} FROM payments WHERE account_id = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                PAYMENT_COLS
            ))
            .bind(account_id.to_string())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbPayment::into_domain).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment methods
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payment_methods
                   (token, account_id, method_type, brand, last4, exp_month, exp_year,
                    is_default, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(token) DO UPDATE SET
                   account_id = excluded.account_id,
                   method_type = excluded.method_type,
                   brand = excluded.brand,
                   last4 = excluded.last4,
                   exp_month = excluded.exp_month,
                   exp_year = excluded.exp_year,
                   is_default = excluded.is_default,
                   is_active = 1"#,
        )
        .bind(&method.token)
        .bind(method.account_id.to_string())
        .bind(&method.method_type)
        .bind(&method.brand)
        .bind(&method.last4)
        .bind(method.exp_month)
        .bind(method.exp_year)
        .bind(method.is_default as i64)
        .bind(method.is_active as i64)
        .bind(method.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_methods(&self, account_id: AccountId) -> Result<Vec<PaymentMethod>, RepoError> {
        let rows: Vec<DbMethod> = sqlx::query_as(
            r#"SELECT token, account_id, method_type, brand, last4, exp_month, exp_year,
                      is_default, is_active, created_at
               FROM payment_methods
               WHERE account_id = ? AND is_active = 1
               ORDER BY is_default DESC, created_at DESC"#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbMethod::into_domain).collect()
    }

    async fn detach_method(&self, account_id: AccountId, token: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE payment_methods SET is_active = 0, is_default = 0
               WHERE account_id = ? AND token = ? AND is_active = 1"#,
        )
        .bind(account_id.to_string())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_default_method(&self, account_id: AccountId, token: &str) -> Result<(), RepoError> {
        let mut db_tx = self.begin_write().await?;

        sqlx::query(r#"UPDATE payment_methods SET is_default = 0 WHERE account_id = ?"#)
            .bind(account_id.to_string())
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE payment_methods SET is_default = 1
               WHERE account_id = ? AND token = ? AND is_active = 1"#,
        )
        .bind(account_id.to_string())
        .bind(token)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shop
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, RepoError> {
        let row: Option<DbItem> = sqlx::query_as(
            r#"SELECT id, name, code, price, currency, command, stock, is_active
               FROM items WHERE id = ?"#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbItem::into_domain).transpose()
    }

    async fn list_items(&self) -> Result<Vec<Item>, RepoError> {
        let rows: Vec<DbItem> = sqlx::query_as(
            r#"SELECT id, name, code, price, currency, command, stock, is_active
               FROM items WHERE is_active = 1 ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbItem::into_domain).collect()
    }

    async fn create_item(&self, item: Item) -> Result<Item, RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO items (name, code, price, currency, command, stock, is_active)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&item.name)
        .bind(&item.code)
        .bind(item.price.amount())
        .bind(item.price.currency().to_string())
        .bind(&item.command)
        .bind(item.stock)
        .bind(item.is_active as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Item {
            id: ItemId(result.last_insert_rowid()),
            ..item
        })
    }

    async fn get_destination(&self, id: DestinationId) -> Result<Option<Destination>, RepoError> {
        let row: Option<DbDestination> = sqlx::query_as(
            r#"SELECT id, name, host, port, password FROM destinations WHERE id = ?"#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbDestination::into_domain).transpose()
    }

    async fn create_destination(&self, dest: Destination) -> Result<Destination, RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO destinations (name, host, port, password) VALUES (?, ?, ?, ?)"#,
        )
        .bind(&dest.name)
        .bind(&dest.host)
        .bind(dest.port as i64)
        .bind(&dest.password)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Destination {
            id: DestinationId(result.last_insert_rowid()),
            ..dest
        })
    }

    async fn purchase(
        &self,
        account_id: AccountId,
        destination_id: DestinationId,
        lines: &[PurchaseLine],
        recipient: Option<String>,
    ) -> Result<PurchaseReceipt, RepoError> {
        if lines.is_empty() {
            return Err(RepoError::Domain(DomainError::ValidationError(
                "Purchase requires at least one line".into(),
            )));
        }

        let mut db_tx = self.begin_write().await?;

        let account: Option<DbBalance> =
            sqlx::query_as(r#"SELECT balance, currency FROM accounts WHERE id = ?"#)
                .bind(account_id.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        let account = account.ok_or(RepoError::Domain(DomainError::AccountNotFound(account_id)))?;
        let account_currency = crate::types::parse_currency(&account.currency)?;

        let destination_exists: Option<i64> =
            sqlx::query_scalar(r#"SELECT id FROM destinations WHERE id = ?"#)
                .bind(destination_id.0)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;
        if destination_exists.is_none() {
            return Err(RepoError::NotFound);
        }

        // Validate every line and price the basket before touching state.
        let mut total = Money::zero(account_currency);
        let mut priced: Vec<(Item, i64, Money)> = Vec::with_capacity(lines.len());

        for line in lines {
            require_positive(line.quantity)?;

            let row: Option<DbItem> = sqlx::query_as(
                r#"SELECT id, name, code, price, currency, command, stock, is_active
                   FROM items WHERE id = ?"#,
            )
            .bind(line.item_id.0)
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

            let item = row.ok_or(RepoError::NotFound)?.into_domain()?;

            if !item.is_active {
                return Err(RepoError::Domain(DomainError::ValidationError(format!(
                    "Item '{}' is not available",
                    item.name
                ))));
            }
            if !item.has_stock(line.quantity) {
                return Err(RepoError::Conflict(format!(
                    "Insufficient stock for '{}'",
                    item.name
                )));
            }

            let line_total = item.price.checked_mul(line.quantity).map_err(RepoError::Domain)?;
            total = total.checked_add(line_total).map_err(RepoError::Domain)?;
            priced.push((item, line.quantity, line_total));
        }

        if account.balance < total.amount() {
            return Err(RepoError::Domain(DomainError::InsufficientFunds {
                available: account.balance,
                requested: total.amount(),
            }));
        }

        // Take stock. The guard re-checks availability so a concurrent
        // purchase that slipped in first rolls this one back.
        for (item, quantity, _) in &priced {
            if item.stock != -1 {
                let result = sqlx::query(
                    r#"UPDATE items SET stock = stock - ? WHERE id = ? AND stock >= ?"#,
                )
                .bind(quantity)
                .bind(item.id.0)
                .bind(quantity)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

                if result.rows_affected() == 0 {
                    return Err(RepoError::Conflict(format!(
                        "Insufficient stock for '{}'",
                        item.name
                    )));
                }
            }
        }

        let description = if priced.len() == 1 {
            format!("Purchase: {} x{}", priced[0].0.name, priced[0].1)
        } else {
            format!("Purchase: {} items", priced.len())
        };

        let op = LedgerOp {
            account_id,
            amount: total.amount(),
            entry_type: EntryType::Purchase,
            description: Some(description),
            payment_id: None,
            order_id: None,
        };
        let debit =
            write_entry(&mut *db_tx, LedgerEntryId::new(), &op, -total.amount(), None).await?;

        let now = Utc::now();
        let mut orders = Vec::with_capacity(priced.len());
        for (item, quantity, line_total) in &priced {
            let order = PurchaseOrder {
                id: Uuid::new_v4(),
                account_id,
                item_id: item.id,
                destination_id,
                quantity: *quantity,
                amount: line_total.amount(),
                recipient: recipient.clone(),
                status: credits_types::OrderStatus::Pending,
                command_sent: None,
                command_response: None,
                failure_reason: None,
                created_at: now,
                completed_at: None,
            };

            sqlx::query(
                r#"INSERT INTO orders
                       (id, account_id, item_id, destination_id, quantity, amount, recipient,
                        status, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)"#,
            )
            .bind(order.id.to_string())
            .bind(account_id.to_string())
            .bind(item.id.0)
            .bind(destination_id.0)
            .bind(*quantity)
            .bind(line_total.amount())
            .bind(&order.recipient)
            .bind(now.to_rfc3339())
            .execute(&mut *db_tx)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

            orders.push(order);
        }

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let new_balance = debit.balance_after;
        Ok(PurchaseReceipt {
            orders,
            debit,
            total: total.amount(),
            new_balance,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Orders
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_order(&self, id: Uuid) -> Result<Option<PurchaseOrder>, RepoError> {
        let row: Option<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = ?",
            ORDER_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbOrder::into_domain).transpose()
    }

    async fn list_orders(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<PurchaseOrder>, RepoError> {
        let page = page.clamped();

        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE account_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            ORDER_COLS
        ))
        .bind(account_id.to_string())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbOrder::into_domain).collect()
    }

    async fn mark_order_processing(&self, id: Uuid, command: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE orders SET status = 'processing', command_sent = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(command)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn complete_order(&self, id: Uuid, response: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE orders SET status = 'completed', command_response = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(response)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn fail_order(&self, id: Uuid, reason: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE orders SET status = 'failed', failure_reason = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
