//! Inventory error types.

use change_feed::FeedError;
use common::ProductId;
use ledger_store::LedgerStoreError;
use thiserror::Error;

/// Errors surfaced by inventory operations.
///
/// Every failed call reports exactly one of these kinds.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Caller-supplied fields violate basic constraints.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// An outbound movement would drive stock negative.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// Concurrent writers kept colliding until the retry budget ran out.
    #[error("Conflict on product {product_id} after {attempts} attempts")]
    Conflict { product_id: ProductId, attempts: u32 },

    /// The underlying store failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl InventoryError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InventoryError::InvalidInput(_) => "invalid_input",
            InventoryError::NotFound(_) => "not_found",
            InventoryError::InsufficientStock { .. } => "insufficient_stock",
            InventoryError::Conflict { .. } => "conflict",
            InventoryError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        InventoryError::InvalidInput(message.into())
    }
}

impl From<LedgerStoreError> for InventoryError {
    fn from(e: LedgerStoreError) -> Self {
        match e {
            LedgerStoreError::ConcurrencyConflict { product_id, .. } => InventoryError::Conflict {
                product_id,
                attempts: 1,
            },
            LedgerStoreError::ProductNotFound(id) => InventoryError::NotFound(id),
            LedgerStoreError::DuplicateProduct(id) => {
                InventoryError::InvalidInput(format!("product {id} already exists"))
            }
            LedgerStoreError::InvalidTransaction(message) => InventoryError::InvalidInput(message),
            other => InventoryError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<FeedError> for InventoryError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::Store(e) => e.into(),
            other => InventoryError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::Revision;

    #[test]
    fn test_store_errors_map_to_kinds() {
        let id = ProductId::new();

        let conflict: InventoryError = LedgerStoreError::ConcurrencyConflict {
            product_id: id,
            expected: Revision::first(),
            actual: None,
        }
        .into();
        assert_eq!(conflict.kind(), "conflict");

        let missing: InventoryError = LedgerStoreError::ProductNotFound(id).into();
        assert!(matches!(missing, InventoryError::NotFound(found) if found == id));

        let down: InventoryError = LedgerStoreError::Unavailable("timeout".into()).into();
        assert_eq!(down.kind(), "store_unavailable");
    }

    #[test]
    fn test_feed_store_error_keeps_its_kind() {
        let id = ProductId::new();
        let e: InventoryError = FeedError::Store(LedgerStoreError::ProductNotFound(id)).into();
        assert_eq!(e.kind(), "not_found");

        let e: InventoryError = FeedError::WatchClosed.into();
        assert_eq!(e.kind(), "store_unavailable");
    }
}
