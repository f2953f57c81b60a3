//! Shared application state.

use change_feed::{MovementsView, ProductsView, SubscriptionHandle};
use inventory::InventoryService;
use ledger_store::LedgerStore;

/// Shared application state accessible from all handlers.
///
/// Writes go through the inventory service; reads are answered from the
/// two views, which the change feed keeps current.
pub struct AppState<S: LedgerStore> {
    pub service: InventoryService<S>,
    pub products: ProductsView,
    pub movements: MovementsView,
    subscriptions: Vec<SubscriptionHandle>,
}

impl<S> AppState<S>
where
    S: LedgerStore + Clone + 'static,
{
    /// Subscribes both views and returns the state holding them.
    ///
    /// The subscriptions live as long as the state.
    pub async fn start(service: InventoryService<S>) -> inventory::Result<Self> {
        let products = ProductsView::new();
        let movements = MovementsView::new();

        let subscriptions = vec![
            service.subscribe_products(products.clone()).await?,
            service.subscribe_movements(movements.clone()).await?,
        ];

        Ok(Self {
            service,
            products,
            movements,
            subscriptions,
        })
    }

    /// True while both views are still receiving updates.
    pub fn feeds_active(&self) -> bool {
        self.subscriptions.iter().all(SubscriptionHandle::is_active)
    }
}
