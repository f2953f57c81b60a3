//! Inventory service providing the external API for ledger operations.

use change_feed::{ChangeFeed, Observer, SubscriptionHandle};
use common::ProductId;
use ledger_store::{LedgerStore, Movement, Product};

use crate::coordinator::TransactionCoordinator;
use crate::error::{InventoryError, Result};
use crate::movement::MovementRequest;
use crate::product::{NewProduct, ProductPatch};
use crate::retry::RetryPolicy;

/// Service for managing products and their stock.
///
/// Product edits go straight to the store. Stock movements go through the
/// [`TransactionCoordinator`]. Live views are available via the change feed.
#[derive(Clone)]
pub struct InventoryService<S: LedgerStore> {
    coordinator: TransactionCoordinator<S>,
    feed: ChangeFeed<S>,
}

impl<S> InventoryService<S>
where
    S: LedgerStore + Clone + 'static,
{
    /// Creates a service with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store.clone(), policy),
            feed: ChangeFeed::new(store),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &TransactionCoordinator<S> {
        &self.coordinator
    }

    pub fn feed(&self) -> &ChangeFeed<S> {
        &self.feed
    }

    /// Creates a product with a fresh id.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let (details, quantity) = input.validate()?;
        let product = self
            .store()
            .insert_product(ProductId::new(), details, quantity)
            .await?;

        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Merges a patch onto a product's descriptive fields.
    ///
    /// Last writer wins for these fields. Quantity cannot be patched.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        patch.validate()?;

        let current = self
            .store()
            .get_product(id)
            .await?
            .ok_or(InventoryError::NotFound(id))?;
        let details = patch.apply(&current.details)?;

        let product = self.store().update_details(id, details).await?;
        tracing::info!(revision = %product.revision, "product updated");
        Ok(product)
    }

    /// Removes a product. Its movements stay in the ledger.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        if !self.store().delete_product(id).await? {
            return Err(InventoryError::NotFound(id));
        }
        tracing::info!("product deleted");
        Ok(())
    }

    /// Applies a stock movement. See [`TransactionCoordinator::register_movement`].
    pub async fn register_movement(&self, request: MovementRequest) -> Result<Movement> {
        self.coordinator.register_movement(request).await
    }

    /// Subscribes to product snapshots ordered by name.
    pub async fn subscribe_products<O: Observer<Product>>(
        &self,
        observer: O,
    ) -> Result<SubscriptionHandle> {
        Ok(self.feed.subscribe_products(observer).await?)
    }

    /// Subscribes to movement snapshots, newest first.
    pub async fn subscribe_movements<O: Observer<Movement>>(
        &self,
        observer: O,
    ) -> Result<SubscriptionHandle> {
        Ok(self.feed.subscribe_movements(observer).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::InMemoryLedgerStore;

    fn service() -> InventoryService<InMemoryLedgerStore> {
        InventoryService::with_policy(InMemoryLedgerStore::new(), RetryPolicy::immediate(5))
    }

    #[tokio::test]
    async fn test_create_product_assigns_id_and_timestamp() {
        let service = service();
        let product = service
            .create_product(NewProduct::new("Bulb A").quantity(20).price(3.5).min_stock(5))
            .await
            .unwrap();

        assert_eq!(product.quantity, 20);
        assert_eq!(product.name(), "Bulb A");
        assert!(product.created_at <= chrono::Utc::now());
        assert_eq!(service.store().product_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_product_rejects_empty_name() {
        let result = service().create_product(NewProduct::new("")).await;
        assert!(matches!(result, Err(InventoryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_product_keeps_quantity_and_creation_time() {
        let service = service();
        let created = service
            .create_product(NewProduct::new("Bulb A").quantity(20))
            .await
            .unwrap();

        let updated = service
            .update_product(created.id, ProductPatch::new().name("Bulb B").category("Lighting"))
            .await
            .unwrap();

        assert_eq!(updated.name(), "Bulb B");
        assert_eq!(updated.details.category.as_deref(), Some("Lighting"));
        assert_eq!(updated.quantity, 20);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_product_rejects_quantity() {
        let service = service();
        let created = service
            .create_product(NewProduct::new("Bulb A").quantity(20))
            .await
            .unwrap();

        let patch = ProductPatch {
            quantity: Some(500),
            ..Default::default()
        };
        let result = service.update_product(created.id, patch).await;
        assert!(matches!(result, Err(InventoryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_update_missing_product_is_not_found() {
        let result = service()
            .update_product(ProductId::new(), ProductPatch::new().price(1.0))
            .await;
        assert!(matches!(result, Err(InventoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let service = service();
        let created = service.create_product(NewProduct::new("Fuse")).await.unwrap();

        service.delete_product(created.id).await.unwrap();
        let again = service.delete_product(created.id).await;
        assert!(matches!(again, Err(InventoryError::NotFound(_))));
    }
}
