use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use futures_core::Stream;

use crate::{
    LedgerStoreError, Movement, MovementQuery, NewMovement, Product, ProductDetails, Result,
    Revision, Sequence,
};

/// A collection of records held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Movements,
}

/// Notification that one or both collections changed.
///
/// Notices carry no record data; watchers re-read the collections they
/// care about. A notice touching both collections is also used to ask
/// watchers for a full resync after missed notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeNotice {
    pub products: bool,
    pub movements: bool,
}

impl ChangeNotice {
    pub fn products() -> Self {
        Self {
            products: true,
            movements: false,
        }
    }

    pub fn movements() -> Self {
        Self {
            products: false,
            movements: true,
        }
    }

    /// A notice touching every collection.
    pub fn resync() -> Self {
        Self {
            products: true,
            movements: true,
        }
    }

    pub fn touches(&self, collection: Collection) -> bool {
        match collection {
            Collection::Products => self.products,
            Collection::Movements => self.movements,
        }
    }

    /// Merges two notices into one touching the union of their collections.
    pub fn merge(self, other: ChangeNotice) -> Self {
        Self {
            products: self.products || other.products,
            movements: self.movements || other.movements,
        }
    }

    /// Encodes the notice as a comma separated list of collection names.
    pub fn to_payload(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.products {
            parts.push("products");
        }
        if self.movements {
            parts.push("movements");
        }
        parts.join(",")
    }

    /// Decodes a payload produced by [`ChangeNotice::to_payload`].
    ///
    /// Unknown or empty payloads are treated as a resync.
    pub fn from_payload(payload: &str) -> Self {
        let mut notice = ChangeNotice::default();
        for part in payload.split(',').map(str::trim) {
            match part {
                "products" => notice.products = true,
                "movements" => notice.movements = true,
                _ => return ChangeNotice::resync(),
            }
        }
        notice
    }
}

/// A stream of change notices. Dropping it releases the underlying watch.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeNotice>> + Send>>;

/// A single write inside a ledger transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    /// Overwrite a product's stock level.
    SetQuantity { product_id: ProductId, quantity: i64 },
    /// Append an immutable movement record.
    AppendMovement(NewMovement),
}

/// An optimistic multi-record transaction.
///
/// Preconditions are checked at commit time against the current record
/// revisions. Either every write is applied or none is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerTransaction {
    preconditions: Vec<(ProductId, Revision)>,
    writes: Vec<LedgerWrite>,
}

impl LedgerTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the product to still be at `revision` when committing.
    pub fn expect_revision(mut self, product_id: ProductId, revision: Revision) -> Self {
        self.preconditions.push((product_id, revision));
        self
    }

    pub fn set_quantity(mut self, product_id: ProductId, quantity: i64) -> Self {
        self.writes.push(LedgerWrite::SetQuantity {
            product_id,
            quantity,
        });
        self
    }

    pub fn append_movement(mut self, movement: NewMovement) -> Self {
        self.writes.push(LedgerWrite::AppendMovement(movement));
        self
    }

    pub fn preconditions(&self) -> &[(ProductId, Revision)] {
        &self.preconditions
    }

    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    /// Splits the transaction into its preconditions and writes.
    pub fn into_parts(self) -> (Vec<(ProductId, Revision)>, Vec<LedgerWrite>) {
        (self.preconditions, self.writes)
    }

    /// Returns the collections this transaction writes to.
    pub fn notice(&self) -> ChangeNotice {
        self.writes.iter().fold(ChangeNotice::default(), |acc, w| match w {
            LedgerWrite::SetQuantity { .. } => acc.merge(ChangeNotice::products()),
            LedgerWrite::AppendMovement(_) => acc.merge(ChangeNotice::movements()),
        })
    }
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// Position of this commit in the store's commit order.
    pub sequence: Sequence,

    /// Timestamp assigned by the store at commit time.
    pub timestamp: DateTime<Utc>,

    /// Products as they stand after the commit.
    pub products: Vec<Product>,

    /// Movements appended by the commit.
    pub movements: Vec<Movement>,
}

/// Core trait for ledger store implementations.
///
/// Stores hold product and movement records and provide an optimistic
/// multi-record transaction, a change watch, and server-assigned
/// monotonically ordered timestamps. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a new product at revision 1 with a store-assigned `created_at`.
    async fn insert_product(
        &self,
        id: ProductId,
        details: ProductDetails,
        quantity: i64,
    ) -> Result<Product>;

    /// Replaces a product's descriptive fields, last writer wins.
    ///
    /// Stock quantity is untouched. Fails with `ProductNotFound` if absent.
    async fn update_details(&self, id: ProductId, details: ProductDetails) -> Result<Product>;

    /// Removes a product record. Movements referencing it are kept.
    ///
    /// Returns false if the product did not exist.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    /// Reads a product with its current revision.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Lists movements matching a query, newest first.
    async fn list_movements(&self, query: MovementQuery) -> Result<Vec<Movement>>;

    /// Atomically checks preconditions and applies all writes.
    ///
    /// Fails with `ConcurrencyConflict` if any product revision no longer
    /// matches, in which case nothing is written.
    async fn commit(&self, transaction: LedgerTransaction) -> Result<CommitReceipt>;

    /// Opens a watch on store-level changes, whatever process caused them.
    async fn watch(&self) -> Result<ChangeStream>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Reads a product, failing with `ProductNotFound` if it is absent.
    async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or(LedgerStoreError::ProductNotFound(id))
    }

    /// Checks if a product exists.
    async fn product_exists(&self, id: ProductId) -> Result<bool> {
        Ok(self.get_product(id).await?.is_some())
    }

    /// Lists every movement of one product, newest first.
    async fn movements_for_product(&self, id: ProductId) -> Result<Vec<Movement>> {
        self.list_movements(MovementQuery::for_product(id)).await
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}

/// Validates a transaction before any record is touched.
///
/// Every quantity write must be guarded by a revision precondition on the
/// same product, quantities must stay non-negative, and appended
/// movements must have a positive magnitude.
pub fn validate_transaction(transaction: &LedgerTransaction) -> Result<()> {
    if transaction.writes.is_empty() {
        return Err(LedgerStoreError::InvalidTransaction(
            "Cannot commit a transaction without writes".to_string(),
        ));
    }

    for write in &transaction.writes {
        match write {
            LedgerWrite::SetQuantity {
                product_id,
                quantity,
            } => {
                if !transaction
                    .preconditions
                    .iter()
                    .any(|(id, _)| id == product_id)
                {
                    return Err(LedgerStoreError::InvalidTransaction(format!(
                        "Quantity write to {product_id} has no revision precondition"
                    )));
                }
                if *quantity < 0 {
                    return Err(LedgerStoreError::InvalidTransaction(format!(
                        "Quantity for {product_id} would become {quantity}"
                    )));
                }
            }
            LedgerWrite::AppendMovement(movement) => {
                if movement.quantity <= 0 {
                    return Err(LedgerStoreError::InvalidTransaction(format!(
                        "Movement quantity must be positive, got {}",
                        movement.quantity
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Store-side clock handing out strictly increasing timestamps.
///
/// Wall-clock time is used when it moves forward; otherwise the previous
/// timestamp is bumped by one microsecond, the finest resolution every
/// backend persists.
#[derive(Debug, Clone, Default)]
pub struct LedgerClock {
    last: Option<DateTime<Utc>>,
}

impl LedgerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next commit timestamp.
    pub fn assign_timestamp(&mut self) -> DateTime<Utc> {
        let now = truncate_to_micros(Utc::now());
        let assigned = match self.last {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(assigned);
        assigned
    }
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}
