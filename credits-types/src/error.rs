//! Error types for the credits service.

use crate::domain::{AccountId, Currency, EventParseError};

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Cannot transfer credits to the same account")]
    SelfTransfer,

    #[error("Cannot transfer between accounts with different currencies")]
    CrossCurrencyTransfer,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes; `code()` gives the stable
/// machine-readable identifier carried in error response bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Possible tampering or data inconsistency, e.g. a webhook whose
    /// reported amount disagrees with the stored intent. Never retried
    /// into a credit.
    #[error("Security violation: {0}")]
    Security(String),

    /// Upstream gateway or fulfillment endpoint failure.
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::Conflict(_) => "conflict",
            AppError::Security(_) => "security",
            AppError::ExternalService(_) => "external_service",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::InsufficientFunds {
                available,
                requested,
            }) => AppError::InsufficientFunds {
                available,
                requested,
            },
            RepoError::Domain(DomainError::ValidationError(msg)) => AppError::BadRequest(msg),
            RepoError::Domain(DomainError::AccountNotFound(id)) => {
                AppError::NotFound(format!("Account not found: {}", id))
            }
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::from(RepoError::Domain(err))
    }
}

impl From<EventParseError> for AppError {
    fn from(err: EventParseError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
