//! Read model views kept current by change feed subscriptions.

pub mod movements;
pub mod products;

pub use movements::{MovementStats, MovementsView};
pub use products::{ProductFilter, ProductsView};
