//! # Credits Repository
//!
//! Concrete store implementation (adapter) for the credits service.
//! This crate provides the SQLite adapter that implements the
//! `LedgerStore` port.

pub mod sqlite;

mod types;


pub use sqlite::SqliteStore;

/// Build and initialize a store from a database URL.
///
/// This function:
/// 1. Connects to the database
/// 2. Runs migrations to create tables
/// 3. Returns a ready-to-use `SqliteStore`
///
/// # Examples
///
/// ```ignore
/// let store = build_store("sqlite://credits.db?mode=rwc").await?;
/// ```
pub async fn build_store(database_url: &str) -> anyhow::Result<SqliteStore> {
    SqliteStore::new(database_url).await
}
