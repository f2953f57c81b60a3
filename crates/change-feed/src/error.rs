//! Change feed error types.

use thiserror::Error;

/// Errors that can occur while running a subscription.
#[derive(Debug, Error)]
pub enum FeedError {
    /// An error occurred in the ledger store.
    #[error("Ledger store error: {0}")]
    Store(#[from] ledger_store::LedgerStoreError),

    /// The store closed the watch without reporting an error.
    #[error("Store watch closed")]
    WatchClosed,

    /// The observer refused a delivery.
    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),
}

/// Error returned by an observer to stop its subscription.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The receiving side is gone.
    #[error("observer is closed")]
    Closed,

    /// The observer failed to handle a delivery.
    #[error("{0}")]
    Failed(String),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
