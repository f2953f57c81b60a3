//! Live change feed over the inventory ledger.
//!
//! This crate republishes store-level change notifications as ordered
//! snapshots:
//! - [`Observer`] trait for anything that wants to receive snapshots
//! - [`ChangeFeed`] for registering observers and owning their store watches
//! - [`SubscriptionHandle`] for cancelling a registration
//! - Two read model views: products and movements

pub mod error;
pub mod feed;
pub mod observer;
pub mod read_model;
pub mod views;

pub use error::{FeedError, ObserverError, Result};
pub use feed::{ChangeFeed, FeedItem, SubscriptionHandle};
pub use observer::{FeedEvent, FeedSnapshot, Observer};
pub use read_model::ReadModel;
pub use views::{MovementStats, MovementsView, ProductFilter, ProductsView};
