//! Inventory layer over the transactional ledger.
//!
//! This crate provides:
//! - A pure stock invariant check
//! - Validated input types for product creation and edits
//! - The transaction coordinator, which retries conflicting movements
//! - The `InventoryService` façade used by external callers

pub mod coordinator;
pub mod error;
pub mod movement;
pub mod product;
pub mod retry;
pub mod service;
pub mod stock;

pub use coordinator::TransactionCoordinator;
pub use error::{InventoryError, Result};
pub use movement::MovementRequest;
pub use product::{NewProduct, ProductPatch};
pub use retry::RetryPolicy;
pub use service::InventoryService;
pub use stock::StockCheck;

pub use common::{ActorId, MovementId, ProductId};
pub use ledger_store::{Movement, MovementKind, Product, ProductDetails};
