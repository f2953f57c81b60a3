use chrono::{DateTime, Utc};
use common::{ActorId, MovementId, ProductId};
use serde::{Deserialize, Serialize};

/// Revision of a product record, used for optimistic concurrency control.
///
/// A freshly inserted product is at revision 1; every committed write to
/// the record increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// Creates a revision from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the revision of a newly inserted record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw revision value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Revision {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Position of a commit in the store's total commit order.
///
/// Every successful ledger transaction receives a strictly greater
/// sequence number than the one committed before it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    /// Stock entering the inventory.
    In,
    /// Stock leaving the inventory.
    Out,
}

impl MovementKind {
    /// Returns the storage representation (`"IN"` / `"OUT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            other => Err(format!("unknown movement kind: {other}")),
        }
    }
}

/// Descriptive product fields that may be edited freely.
///
/// Quantity is deliberately absent: stock levels change only through
/// ledger transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub price: f64,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub min_stock: i64,
}

/// A stored product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    #[serde(flatten)]
    pub details: ProductDetails,

    /// Current stock level. Never negative after a committed transaction.
    pub quantity: i64,

    /// Assigned by the store on insert, never mutated.
    pub created_at: DateTime<Utc>,

    /// Record revision for optimistic concurrency.
    pub revision: Revision,
}

impl Product {
    pub fn name(&self) -> &str {
        &self.details.name
    }

    /// A product is low on stock when its quantity is at or below its threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.details.min_stock
    }
}

/// A movement waiting to be committed as part of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub actor_id: ActorId,
    pub note: Option<String>,
}

impl NewMovement {
    pub fn new(product_id: ProductId, kind: MovementKind, quantity: i64, actor_id: ActorId) -> Self {
        Self {
            id: MovementId::new(),
            product_id,
            kind,
            quantity,
            actor_id,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Turns the pending movement into a committed record.
    pub fn into_movement(self, timestamp: DateTime<Utc>, sequence: Sequence) -> Movement {
        Movement {
            id: self.id,
            product_id: self.product_id,
            kind: self.kind,
            quantity: self.quantity,
            timestamp,
            actor_id: self.actor_id,
            note: self.note,
            sequence,
        }
    }
}

/// An immutable, committed stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,

    /// Back-reference to the product; the product may since have been deleted.
    pub product_id: ProductId,

    pub kind: MovementKind,

    /// Magnitude of the change, always positive.
    pub quantity: i64,

    /// Assigned by the store at commit time.
    pub timestamp: DateTime<Utc>,

    pub actor_id: ActorId,

    pub note: Option<String>,

    /// Commit sequence of the transaction that appended this movement.
    pub sequence: Sequence,
}

impl Movement {
    /// Returns the signed effect of this movement on stock.
    pub fn signed_quantity(&self) -> i64 {
        match self.kind {
            MovementKind::In => self.quantity,
            MovementKind::Out => -self.quantity,
        }
    }
}

/// Orders movements newest first, using the commit sequence as tiebreaker.
pub fn newest_first(a: &Movement, b: &Movement) -> std::cmp::Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then(b.sequence.cmp(&a.sequence))
}
