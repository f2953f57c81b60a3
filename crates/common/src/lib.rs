//! Identifier types shared across the inventory ledger crates.

pub mod types;

pub use types::{ActorId, MovementId, ProductId};
