//! Ledger-facing application service: balances, history, transfers and
//! operator adjustments.

use std::sync::Arc;

use credits_types::{
    Account, AccountId, AccountResponse, AdjustRequest, AppError, BalanceResponse,
    CreateAccountRequest, EntryResponse, EntryType, LedgerEntry, LedgerOp, LedgerStore, Page,
    RewardRequest, TransferRequest, TransferResponse,
};

/// Application service for accounts and the credit ledger.
pub struct CreditsService<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> CreditsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn require_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {}", id)))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_account(
        &self,
        req: CreateAccountRequest,
    ) -> Result<AccountResponse, AppError> {
        if req.name.trim().is_empty() {
            return Err(AppError::BadRequest("Account name cannot be empty".into()));
        }
        let account = self.store.create_account(req).await?;
        Ok(account_response(account))
    }

    pub async fn get_account(&self, id: AccountId) -> Result<AccountResponse, AppError> {
        Ok(account_response(self.require_account(id).await?))
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountResponse>, AppError> {
        let accounts = self.store.list_accounts().await?;
        Ok(accounts.into_iter().map(account_response).collect())
    }

    /// Reports the spendable balance plus the amount still sitting on
    /// open top-up intents.
    pub async fn balance(&self, id: AccountId) -> Result<BalanceResponse, AppError> {
        let account = self.require_account(id).await?;
        let pending = self.store.pending_intent_total(id).await?;
        Ok(BalanceResponse {
            account_id: account.id,
            balance: account.balance.amount(),
            currency: account.currency(),
            pending,
        })
    }

    /// Ledger history, newest first, optionally filtered by entry type.
    pub async fn history(
        &self,
        id: AccountId,
        entry_type: Option<EntryType>,
        page: Page,
    ) -> Result<Vec<EntryResponse>, AppError> {
        let _ = self.require_account(id).await?;
        let entries = self.store.list_entries(id, entry_type, page).await?;
        Ok(entries.into_iter().map(entry_response).collect())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ledger mutations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Manual operator adjustment. Positive amounts credit, negative
    /// amounts debit; adjustments are not funds-checked.
    #[tracing::instrument(skip(self), fields(account_id = %req.account_id, amount = req.amount))]
    pub async fn adjust(&self, req: AdjustRequest) -> Result<EntryResponse, AppError> {
        if req.amount == 0 {
            return Err(AppError::BadRequest("Adjustment amount cannot be zero".into()));
        }
        if req.reason.trim().is_empty() {
            return Err(AppError::BadRequest("Adjustment needs a reason".into()));
        }

        let op = LedgerOp {
            account_id: req.account_id,
            amount: req.amount.abs(),
            entry_type: EntryType::AdminAdjust,
            description: Some(req.reason),
            payment_id: None,
            order_id: None,
        };
        let entry = if req.amount > 0 {
            self.store.credit(op).await?
        } else {
            self.store.debit(op).await?
        };
        Ok(entry_response(entry))
    }

    /// Gamification payout into the ledger.
    #[tracing::instrument(skip(self), fields(account_id = %req.account_id, amount = req.amount))]
    pub async fn reward(&self, req: RewardRequest) -> Result<EntryResponse, AppError> {
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Reward amount must be positive".into()));
        }

        let entry = self
            .store
            .credit(LedgerOp {
                account_id: req.account_id,
                amount: req.amount,
                entry_type: EntryType::Reward,
                description: Some(req.reason),
                payment_id: None,
                order_id: None,
            })
            .await?;
        Ok(entry_response(entry))
    }

    /// Moves credits between two accounts in one atomic transaction.
    #[tracing::instrument(
        skip(self),
        fields(from = %req.from_account_id, to = %req.to_account_id, amount = req.amount)
    )]
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransferResponse, AppError> {
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Transfer amount must be positive".into()));
        }
        if req.from_account_id == req.to_account_id {
            return Err(AppError::Conflict(
                "Cannot transfer credits to the same account".into(),
            ));
        }

        let (out_entry, in_entry) = self
            .store
            .transfer(req.from_account_id, req.to_account_id, req.amount, req.note)
            .await?;

        tracing::info!(
            out_entry = %out_entry.id,
            in_entry = %in_entry.id,
            "Transfer committed"
        );

        Ok(TransferResponse {
            out_entry_id: out_entry.id,
            in_entry_id: in_entry.id,
            from_balance: out_entry.balance_after,
            to_balance: in_entry.balance_after,
        })
    }
}

fn account_response(account: Account) -> AccountResponse {
    AccountResponse {
        id: account.id,
        name: account.name,
        balance: account.balance.amount(),
        currency: account.balance.currency(),
    }
}

fn entry_response(entry: LedgerEntry) -> EntryResponse {
    EntryResponse {
        id: entry.id,
        account_id: entry.account_id,
        amount: entry.amount,
        entry_type: entry.entry_type,
        description: entry.description,
        balance_before: entry.balance_before,
        balance_after: entry.balance_after,
        payment_id: entry.payment_id,
        created_at: entry.created_at,
    }
}
