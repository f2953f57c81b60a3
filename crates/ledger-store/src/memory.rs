use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, broadcast};

use crate::{
    ChangeNotice, CommitReceipt, LedgerStoreError, Movement, MovementQuery, Product,
    ProductDetails, Result, Revision, Sequence,
    record::newest_first,
    store::{
        ChangeStream, LedgerClock, LedgerStore, LedgerTransaction, LedgerWrite,
        validate_transaction,
    },
};

/// Buffered notices per watcher before it is considered lagging.
const WATCH_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum WatchSignal {
    Notice(ChangeNotice),
    Disconnected(String),
}

#[derive(Debug, Default)]
struct LedgerState {
    products: HashMap<ProductId, Product>,
    movements: Vec<Movement>,
    sequence: Sequence,
    clock: LedgerClock,
}

#[derive(Debug, Default)]
struct FaultState {
    conflicts_remaining: u32,
    unavailable: bool,
}

/// In-memory ledger store.
///
/// Holds every record behind a single lock, so commits are serialized
/// and preconditions are checked against the latest state. Provides the
/// same interface as the PostgreSQL implementation, plus fault injection
/// hooks for exercising conflict and outage handling.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    faults: Arc<Mutex<FaultState>>,
    changes: broadcast::Sender<WatchSignal>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Arc::default(),
            faults: Arc::default(),
            changes,
        }
    }
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of products stored.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }

    /// Returns the total number of movements stored.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }

    /// Returns the number of open watches.
    pub fn watcher_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.products.clear();
        state.movements.clear();
        drop(state);
        self.publish(ChangeNotice::resync());
    }

    /// Makes the next `count` guarded commits fail with a concurrency conflict.
    pub async fn inject_conflicts(&self, count: u32) {
        self.faults.lock().await.conflicts_remaining = count;
    }

    /// Toggles simulated unavailability for every operation.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().await.unavailable = unavailable;
    }

    /// Breaks every open watch with an error, as a dropped connection would.
    pub fn disconnect_watchers(&self, reason: impl Into<String>) {
        let _ = self.changes.send(WatchSignal::Disconnected(reason.into()));
    }

    fn publish(&self, notice: ChangeNotice) {
        // Only fails when nobody is watching.
        let _ = self.changes.send(WatchSignal::Notice(notice));
    }

    async fn ensure_available(&self) -> Result<()> {
        if self.faults.lock().await.unavailable {
            return Err(LedgerStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn take_injected_conflict(&self) -> bool {
        let mut faults = self.faults.lock().await;
        if faults.conflicts_remaining > 0 {
            faults.conflicts_remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_product(
        &self,
        id: ProductId,
        details: ProductDetails,
        quantity: i64,
    ) -> Result<Product> {
        self.ensure_available().await?;

        let mut state = self.state.write().await;
        let created_at = state.clock.assign_timestamp();

        let product = match state.products.entry(id) {
            Entry::Occupied(_) => return Err(LedgerStoreError::DuplicateProduct(id)),
            Entry::Vacant(slot) => slot
                .insert(Product {
                    id,
                    details,
                    quantity,
                    created_at,
                    revision: Revision::first(),
                })
                .clone(),
        };
        drop(state);

        self.publish(ChangeNotice::products());
        Ok(product)
    }

    async fn update_details(&self, id: ProductId, details: ProductDetails) -> Result<Product> {
        self.ensure_available().await?;

        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(LedgerStoreError::ProductNotFound(id))?;
        product.details = details;
        product.revision = product.revision.next();
        let product = product.clone();
        drop(state);

        self.publish(ChangeNotice::products());
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        self.ensure_available().await?;

        let removed = self.state.write().await.products.remove(&id).is_some();
        if removed {
            self.publish(ChangeNotice::products());
        }
        Ok(removed)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        self.ensure_available().await?;
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.ensure_available().await?;

        let state = self.state.read().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn list_movements(&self, query: MovementQuery) -> Result<Vec<Movement>> {
        self.ensure_available().await?;

        let state = self.state.read().await;
        let mut movements: Vec<_> = state
            .movements
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        movements.sort_by(newest_first);

        let offset = query.offset.unwrap_or(0);
        let movements = movements.into_iter().skip(offset);
        let movements = match query.limit {
            Some(limit) => movements.take(limit).collect(),
            None => movements.collect(),
        };

        Ok(movements)
    }

    async fn commit(&self, transaction: LedgerTransaction) -> Result<CommitReceipt> {
        self.ensure_available().await?;
        validate_transaction(&transaction)?;

        let notice = transaction.notice();
        let (preconditions, writes) = transaction.into_parts();

        let mut state = self.state.write().await;

        // Every check happens before the first mutation.
        if let Some((product_id, expected)) = preconditions.first()
            && self.take_injected_conflict().await
        {
            return Err(LedgerStoreError::ConcurrencyConflict {
                product_id: *product_id,
                expected: *expected,
                actual: state.products.get(product_id).map(|p| p.revision),
            });
        }

        for (product_id, expected) in &preconditions {
            let actual = state.products.get(product_id).map(|p| p.revision);
            if actual != Some(*expected) {
                return Err(LedgerStoreError::ConcurrencyConflict {
                    product_id: *product_id,
                    expected: *expected,
                    actual,
                });
            }
        }

        for write in &writes {
            if let LedgerWrite::AppendMovement(movement) = write
                && !state.products.contains_key(&movement.product_id)
            {
                return Err(LedgerStoreError::ProductNotFound(movement.product_id));
            }
        }

        let sequence = state.sequence.next();
        let timestamp = state.clock.assign_timestamp();
        let mut touched = Vec::new();
        let mut appended = Vec::new();

        for write in writes {
            match write {
                LedgerWrite::SetQuantity {
                    product_id,
                    quantity,
                } => {
                    if let Some(product) = state.products.get_mut(&product_id) {
                        product.quantity = quantity;
                        product.revision = product.revision.next();
                    }
                    if !touched.contains(&product_id) {
                        touched.push(product_id);
                    }
                }
                LedgerWrite::AppendMovement(movement) => {
                    appended.push(movement.into_movement(timestamp, sequence));
                }
            }
        }

        state.movements.extend(appended.iter().cloned());
        state.sequence = sequence;

        let products = touched
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect();
        drop(state);

        self.publish(notice);
        metrics::counter!("ledger_store_commits_total", "store" => "memory").increment(1);

        Ok(CommitReceipt {
            sequence,
            timestamp,
            products,
            movements: appended,
        })
    }

    async fn watch(&self) -> Result<ChangeStream> {
        use futures_util::stream;

        self.ensure_available().await?;

        let receiver = self.changes.subscribe();
        let stream = stream::unfold(Some(receiver), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(WatchSignal::Notice(notice)) => Some((Ok(notice), Some(receiver))),
                Ok(WatchSignal::Disconnected(reason)) => {
                    Some((Err(LedgerStoreError::Unavailable(reason)), None))
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "watch lagged, requesting resync");
                    Some((Ok(ChangeNotice::resync()), Some(receiver)))
                }
                Err(RecvError::Closed) => None,
            }
        });

        Ok(Box::pin(stream))
    }
}
