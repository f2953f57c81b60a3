//! Transactional storage for the inventory ledger.
//!
//! This crate defines the store contract the rest of the system builds on:
//! - [`LedgerStore`] trait with an optimistic multi-record transaction,
//!   a change watch, and store-assigned commit timestamps
//! - [`InMemoryLedgerStore`] for tests and local runs
//! - [`PostgresLedgerStore`] backed by `sqlx`

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{ActorId, MovementId, ProductId};
pub use error::{LedgerStoreError, Result};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::MovementQuery;
pub use record::{
    Movement, MovementKind, NewMovement, Product, ProductDetails, Revision, Sequence,
};
pub use store::{
    ChangeNotice, ChangeStream, Collection, CommitReceipt, LedgerClock, LedgerStore,
    LedgerStoreExt, LedgerTransaction, LedgerWrite,
};
