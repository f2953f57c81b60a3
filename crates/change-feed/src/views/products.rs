//! Products read model: the latest product snapshot, ordered by name.

use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use ledger_store::Product;
use tokio::sync::RwLock;

use crate::ObserverError;
use crate::observer::{FeedEvent, Observer};
use crate::read_model::ReadModel;

/// Narrows a product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    /// Case-insensitive substring matched against name, supplier and category.
    pub search: Option<String>,
    /// Keep only products at or below their minimum stock.
    pub low_stock_only: bool,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    pub fn low_stock_only(mut self, low_stock_only: bool) -> Self {
        self.low_stock_only = low_stock_only;
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        if self.low_stock_only && !product.is_low_stock() {
            return false;
        }

        let Some(term) = &self.search else {
            return true;
        };
        let term = term.to_lowercase();
        let details = &product.details;
        [
            Some(details.name.as_str()),
            details.supplier.as_deref(),
            details.category.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }
}

#[derive(Default)]
struct ProductsState {
    products: Vec<Product>,
    generation: Option<u64>,
    terminated: Option<String>,
}

/// Read model holding the most recent product snapshot.
#[derive(Clone, Default)]
pub struct ProductsView {
    state: Arc<RwLock<ProductsState>>,
}

impl ProductsView {
    /// Creates an empty view that has not yet received a snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// All products ordered by name.
    pub async fn all(&self) -> Vec<Product> {
        self.state.read().await.products.clone()
    }

    pub async fn get(&self, id: ProductId) -> Option<Product> {
        self.state
            .read()
            .await
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Products matching the filter, still ordered by name.
    pub async fn query(&self, filter: &ProductFilter) -> Vec<Product> {
        self.state
            .read()
            .await
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    pub async fn low_stock(&self) -> Vec<Product> {
        self.query(&ProductFilter::new().low_stock_only(true)).await
    }

    /// Generation of the last applied snapshot, `None` before the first one.
    pub async fn generation(&self) -> Option<u64> {
        self.state.read().await.generation
    }

    /// Reason the feeding subscription ended, if it did.
    pub async fn terminated(&self) -> Option<String> {
        self.state.read().await.terminated.clone()
    }
}

#[async_trait]
impl Observer<Product> for ProductsView {
    async fn notify(&self, event: FeedEvent<Product>) -> Result<(), ObserverError> {
        let mut state = self.state.write().await;
        match event {
            FeedEvent::Snapshot(snapshot) => {
                tracing::trace!(
                    generation = snapshot.generation,
                    count = snapshot.len(),
                    "products snapshot applied"
                );
                state.products = snapshot.items;
                state.generation = Some(snapshot.generation);
                state.terminated = None;
            }
            FeedEvent::Terminated(reason) => {
                tracing::warn!(%reason, "products feed terminated");
                state.terminated = Some(reason);
            }
        }
        Ok(())
    }
}

impl ReadModel for ProductsView {
    fn name(&self) -> &'static str {
        "ProductsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.products.len()).unwrap_or(0)
    }
}
