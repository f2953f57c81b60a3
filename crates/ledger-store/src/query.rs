use chrono::{DateTime, Utc};
use common::ProductId;

use crate::{Movement, MovementKind};

/// Builder for filtering the movement ledger.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by product.
    pub product_id: Option<ProductId>,

    /// Filter by movement kind.
    pub kind: Option<MovementKind>,

    /// Movements at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Movements at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of movements to return.
    pub limit: Option<usize>,

    /// Number of movements to skip.
    pub offset: Option<usize>,
}

impl MovementQuery {
    /// Creates a query matching every movement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a single product's movements.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn product_id(mut self, id: ProductId) -> Self {
        self.product_id = Some(id);
        self
    }

    pub fn kind(mut self, kind: MovementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the movement passes every filter (limit/offset excluded).
    pub fn matches(&self, movement: &Movement) -> bool {
        if let Some(id) = self.product_id
            && movement.product_id != id
        {
            return false;
        }
        if let Some(kind) = self.kind
            && movement.kind != kind
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && movement.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && movement.timestamp > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewMovement, Sequence};
    use common::ActorId;

    fn movement(product_id: ProductId, kind: MovementKind) -> Movement {
        NewMovement::new(product_id, kind, 3, ActorId::system())
            .into_movement(Utc::now(), Sequence::new(1))
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = MovementQuery::new();
        assert!(query.matches(&movement(ProductId::new(), MovementKind::In)));
        assert!(query.limit.is_none());
    }

    #[test]
    fn filters_by_product_and_kind() {
        let pid = ProductId::new();
        let query = MovementQuery::for_product(pid).kind(MovementKind::Out);

        assert!(query.matches(&movement(pid, MovementKind::Out)));
        assert!(!query.matches(&movement(pid, MovementKind::In)));
        assert!(!query.matches(&movement(ProductId::new(), MovementKind::Out)));
    }

    #[test]
    fn filters_by_time_range() {
        let m = movement(ProductId::new(), MovementKind::In);
        let before = m.timestamp - chrono::Duration::seconds(1);
        let after = m.timestamp + chrono::Duration::seconds(1);

        assert!(MovementQuery::new().from_timestamp(before).to_timestamp(after).matches(&m));
        assert!(!MovementQuery::new().from_timestamp(after).matches(&m));
        assert!(!MovementQuery::new().to_timestamp(before).matches(&m));
    }
}
