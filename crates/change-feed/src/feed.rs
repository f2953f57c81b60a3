//! Change feed: observer registration and snapshot delivery.

use std::convert::Infallible;

use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use ledger_store::{
    ChangeStream, Collection, LedgerStore, Movement, MovementQuery, Product,
};
use tokio::task::JoinHandle;

use crate::observer::{FeedEvent, FeedSnapshot, Observer};
use crate::{FeedError, Result};

/// A record type the feed can publish.
#[async_trait]
pub trait FeedItem: Clone + Send + Sync + Sized + 'static {
    /// The store collection holding this record type.
    const COLLECTION: Collection;

    /// Reads the whole collection in feed order.
    async fn load<S: LedgerStore + ?Sized>(store: &S) -> ledger_store::Result<Vec<Self>>;
}

#[async_trait]
impl FeedItem for Product {
    const COLLECTION: Collection = Collection::Products;

    /// Products are ordered by name.
    async fn load<S: LedgerStore + ?Sized>(store: &S) -> ledger_store::Result<Vec<Self>> {
        store.list_products().await
    }
}

#[async_trait]
impl FeedItem for Movement {
    const COLLECTION: Collection = Collection::Movements;

    /// Movements are ordered newest first.
    async fn load<S: LedgerStore + ?Sized>(store: &S) -> ledger_store::Result<Vec<Self>> {
        store.list_movements(MovementQuery::new()).await
    }
}

/// Registers observers and keeps them supplied with ordered snapshots.
///
/// Each subscription runs as its own task owning its own store watch:
/// - the observer receives the current snapshot immediately
/// - every store change touching the collection triggers a fresh snapshot
/// - notices that pile up while a snapshot is being read are coalesced
///
/// Snapshots for one observer are read and delivered strictly one after
/// another, so an observer never sees an older state after a newer one.
#[derive(Clone)]
pub struct ChangeFeed<S: LedgerStore> {
    store: S,
}

impl<S> ChangeFeed<S>
where
    S: LedgerStore + Clone + 'static,
{
    /// Creates a new feed over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers an observer for one collection.
    ///
    /// Fails if the watch cannot be opened or the initial snapshot cannot
    /// be read; later failures are delivered as [`FeedEvent::Terminated`].
    #[tracing::instrument(skip(self, observer), fields(collection = ?T::COLLECTION))]
    pub async fn subscribe<T, O>(&self, observer: O) -> Result<SubscriptionHandle>
    where
        T: FeedItem,
        O: Observer<T>,
    {
        // Watch before reading so no commit can slip between the two.
        let watch = self.store.watch().await?;
        let initial = T::load(&self.store).await?;

        let store = self.store.clone();
        let task = tokio::spawn(run_subscription(store, watch, observer, initial));

        metrics::counter!("feed_subscriptions_total").increment(1);
        tracing::debug!("subscription started");

        Ok(SubscriptionHandle::new(T::COLLECTION, task))
    }

    /// Registers an observer for products ordered by name.
    pub async fn subscribe_products<O: Observer<Product>>(
        &self,
        observer: O,
    ) -> Result<SubscriptionHandle> {
        self.subscribe::<Product, O>(observer).await
    }

    /// Registers an observer for movements ordered newest first.
    pub async fn subscribe_movements<O: Observer<Movement>>(
        &self,
        observer: O,
    ) -> Result<SubscriptionHandle> {
        self.subscribe::<Movement, O>(observer).await
    }
}

/// Handle to a running subscription.
///
/// Cancelling or dropping the handle stops delivery and releases the
/// store watch held by the subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    collection: Collection,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    fn new(collection: Collection, task: JoinHandle<()>) -> Self {
        Self {
            collection,
            task: Some(task),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Returns false once the subscription has stopped for any reason.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops delivery and waits until the store watch is released.
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_subscription<S, T, O>(store: S, mut watch: ChangeStream, observer: O, initial: Vec<T>)
where
    S: LedgerStore,
    T: FeedItem,
    O: Observer<T>,
{
    let error = match pump(&store, &mut watch, &observer, initial).await {
        Ok(never) => match never {},
        Err(error) => error,
    };
    drop(watch);

    match error {
        FeedError::Observer(e) => {
            tracing::debug!(error = %e, collection = ?T::COLLECTION, "observer stopped");
        }
        error => {
            tracing::warn!(error = %error, collection = ?T::COLLECTION, "subscription terminated");
            metrics::counter!("feed_subscriptions_terminated_total").increment(1);
            let _ = observer.notify(FeedEvent::Terminated(error.to_string())).await;
        }
    }
}

async fn pump<S, T, O>(
    store: &S,
    watch: &mut ChangeStream,
    observer: &O,
    initial: Vec<T>,
) -> Result<Infallible>
where
    S: LedgerStore,
    T: FeedItem,
    O: Observer<T>,
{
    let mut generation = 0;
    deliver(observer, FeedSnapshot::new(generation, initial)).await?;

    while let Some(next) = watch.next().await {
        let mut notice = next?;

        // Fold in anything already queued; one re-read covers it all.
        while let Some(Some(queued)) = watch.next().now_or_never() {
            notice = notice.merge(queued?);
        }

        if !notice.touches(T::COLLECTION) {
            continue;
        }

        let items = T::load(store).await?;
        generation += 1;
        deliver(observer, FeedSnapshot::new(generation, items)).await?;
    }

    Err(FeedError::WatchClosed)
}

async fn deliver<T, O>(observer: &O, snapshot: FeedSnapshot<T>) -> Result<()>
where
    T: FeedItem,
    O: Observer<T>,
{
    observer.notify(FeedEvent::Snapshot(snapshot)).await?;
    metrics::counter!("feed_snapshots_delivered_total").increment(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObserverError;
    use common::{ActorId, ProductId};
    use ledger_store::{
        InMemoryLedgerStore, LedgerStoreExt, LedgerTransaction, MovementKind, NewMovement,
        ProductDetails,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn details(name: &str) -> ProductDetails {
        ProductDetails {
            name: name.to_string(),
            price: 1.0,
            supplier: None,
            category: None,
            min_stock: 0,
        }
    }

    async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<FeedEvent<T>>) -> FeedEvent<T> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for feed event")
            .expect("feed closed")
    }

    async fn next_snapshot<T>(rx: &mut mpsc::UnboundedReceiver<FeedEvent<T>>) -> FeedSnapshot<T> {
        next_event(rx)
            .await
            .into_snapshot()
            .expect("expected a snapshot")
    }

    async fn wait_for_watchers(store: &InMemoryLedgerStore, expected: usize) {
        for _ in 0..100 {
            if store.watcher_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} watchers, found {}",
            store.watcher_count()
        );
    }

    async fn sell(store: &InMemoryLedgerStore, id: ProductId, quantity: i64) {
        let product = store.require_product(id).await.unwrap();
        store
            .commit(
                LedgerTransaction::new()
                    .expect_revision(id, product.revision)
                    .set_quantity(id, product.quantity - quantity)
                    .append_movement(NewMovement::new(
                        id,
                        MovementKind::Out,
                        quantity,
                        ActorId::system(),
                    )),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_ordered_by_name() {
        let store = InMemoryLedgerStore::new();
        for name in ["Cable", "Adapter"] {
            store
                .insert_product(ProductId::new(), details(name), 1)
                .await
                .unwrap();
        }

        let feed = ChangeFeed::new(store);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = feed.subscribe_products(tx).await.unwrap();

        let snapshot = next_snapshot(&mut rx).await;
        assert!(snapshot.is_initial());
        let names: Vec<_> = snapshot.items.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Adapter", "Cable"]);
    }

    #[tokio::test]
    async fn test_changes_produce_new_generations() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = feed.subscribe_products(tx).await.unwrap();
        assert!(next_snapshot(&mut rx).await.is_empty());

        store
            .insert_product(ProductId::new(), details("Bulb"), 3)
            .await
            .unwrap();

        let snapshot = next_snapshot(&mut rx).await;
        assert!(snapshot.generation >= 1);
        assert_eq!(snapshot.items.len(), 1);
    }

    #[tokio::test]
    async fn test_movement_snapshots_are_newest_first() {
        let store = InMemoryLedgerStore::new();
        let id = ProductId::new();
        store.insert_product(id, details("Bulb"), 10).await.unwrap();

        let feed = ChangeFeed::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = feed.subscribe_movements(tx).await.unwrap();
        assert!(next_snapshot(&mut rx).await.is_empty());

        sell(&store, id, 1).await;
        sell(&store, id, 2).await;

        let mut latest = next_snapshot(&mut rx).await;
        while latest.items.len() < 2 {
            latest = next_snapshot(&mut rx).await;
        }
        assert_eq!(latest.items[0].quantity, 2);
        assert_eq!(latest.items[1].quantity, 1);
    }

    #[tokio::test]
    async fn test_product_only_changes_skip_movement_observers() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = feed.subscribe_movements(tx).await.unwrap();
        next_snapshot(&mut rx).await;

        store
            .insert_product(ProductId::new(), details("Bulb"), 3)
            .await
            .unwrap();

        let nothing = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_cancel_releases_watch() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedEvent<Product>>();

        let handle = feed.subscribe_products(tx).await.unwrap();
        next_snapshot(&mut rx).await;
        assert!(handle.is_active());
        assert_eq!(store.watcher_count(), 1);

        handle.cancel().await;
        assert_eq!(store.watcher_count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_watch() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, _rx) = mpsc::unbounded_channel::<FeedEvent<Product>>();

        let handle = feed.subscribe_products(tx).await.unwrap();
        drop(handle);
        wait_for_watchers(&store, 0).await;
    }

    #[tokio::test]
    async fn test_closed_observer_ends_subscription() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, rx) = mpsc::unbounded_channel::<FeedEvent<Product>>();

        let handle = feed.subscribe_products(tx).await.unwrap();
        drop(rx);

        // The closed channel is noticed on the next delivery.
        store
            .insert_product(ProductId::new(), details("Bulb"), 3)
            .await
            .unwrap();

        wait_for_watchers(&store, 0).await;
        assert!(!handle.is_active());
    }

    struct PanickingObserver;

    #[async_trait]
    impl Observer<Product> for PanickingObserver {
        async fn notify(&self, _event: FeedEvent<Product>) -> std::result::Result<(), ObserverError> {
            panic!("observer blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_observer_still_releases_watch() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());

        let handle = feed.subscribe_products(PanickingObserver).await.unwrap();
        wait_for_watchers(&store, 0).await;
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_store_failure_delivers_terminal_event() {
        let store = InMemoryLedgerStore::new();
        let feed = ChangeFeed::new(store.clone());
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedEvent<Product>>();
        let _handle = feed.subscribe_products(tx).await.unwrap();
        next_snapshot(&mut rx).await;

        store.disconnect_watchers("connection reset");

        let event = next_event(&mut rx).await;
        assert!(event.is_terminated());
        assert!(rx.recv().await.is_none());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_fails_when_store_unavailable() {
        let store = InMemoryLedgerStore::new();
        store.set_unavailable(true).await;
        let feed = ChangeFeed::new(store.clone());
        let (tx, _rx) = mpsc::unbounded_channel::<FeedEvent<Product>>();

        let result = feed.subscribe_products(tx).await;
        assert!(matches!(result, Err(FeedError::Store(_))));
        assert_eq!(store.watcher_count(), 0);
    }
}
