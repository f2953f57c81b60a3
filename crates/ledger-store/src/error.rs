use common::ProductId;
use thiserror::Error;

use crate::Revision;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// A transaction precondition failed: the product was modified or
    /// removed between read and commit.
    #[error(
        "Concurrency conflict for product {product_id}: expected revision {expected}, found {}",
        actual.map(|r| r.to_string()).unwrap_or_else(|| "none".to_string())
    )]
    ConcurrencyConflict {
        product_id: ProductId,
        expected: Revision,
        actual: Option<Revision>,
    },

    /// The product was not found in the store.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A product with this ID already exists.
    #[error("Product already exists: {0}")]
    DuplicateProduct(ProductId),

    /// The transaction was rejected before touching any record.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerStoreError {
    /// Returns true for optimistic concurrency failures, which are safe to retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for ledger store operations.
pub type Result<T> = std::result::Result<T, LedgerStoreError>;
