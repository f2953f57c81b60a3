//! Stock movement requests.

use common::{ActorId, ProductId};
use ledger_store::{MovementKind, NewMovement};

use crate::error::{InventoryError, Result};

/// A request to move stock in or out of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    /// Defaults to the system actor.
    pub actor_id: Option<ActorId>,
    pub note: Option<String>,
}

impl MovementRequest {
    pub fn new(product_id: ProductId, kind: MovementKind, quantity: i64) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            actor_id: None,
            note: None,
        }
    }

    /// Stock arriving.
    pub fn stock_in(product_id: ProductId, quantity: i64) -> Self {
        Self::new(product_id, MovementKind::In, quantity)
    }

    /// Stock leaving.
    pub fn stock_out(product_id: ProductId, quantity: i64) -> Self {
        Self::new(product_id, MovementKind::Out, quantity)
    }

    pub fn by(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(InventoryError::invalid(format!(
                "movement quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    /// The acting agent, falling back to the system actor when unset or blank.
    pub fn actor(&self) -> ActorId {
        match &self.actor_id {
            Some(actor) if !actor.as_str().trim().is_empty() => {
                ActorId::new(actor.as_str().trim())
            }
            _ => ActorId::system(),
        }
    }

    /// Builds the pending ledger record. Each call yields a fresh movement id.
    pub(crate) fn to_new_movement(&self) -> NewMovement {
        let movement = NewMovement::new(self.product_id, self.kind, self.quantity, self.actor());
        match self.note.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => movement.with_note(note),
            _ => movement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_quantity_rejected() {
        let id = ProductId::new();
        assert!(MovementRequest::stock_out(id, 0).validate().is_err());
        assert!(MovementRequest::stock_in(id, -3).validate().is_err());
        assert!(MovementRequest::stock_in(id, 1).validate().is_ok());
    }

    #[test]
    fn test_actor_defaults_to_system() {
        let id = ProductId::new();
        assert!(MovementRequest::stock_in(id, 1).actor().is_system());
        assert!(MovementRequest::stock_in(id, 1).by("  ").actor().is_system());
        assert_eq!(MovementRequest::stock_in(id, 1).by("u1").actor().as_str(), "u1");
    }

    #[test]
    fn test_blank_note_dropped() {
        let id = ProductId::new();
        let movement = MovementRequest::stock_out(id, 2).with_note("  ").to_new_movement();
        assert_eq!(movement.note, None);

        let movement = MovementRequest::stock_out(id, 2)
            .with_note(" broken box ")
            .to_new_movement();
        assert_eq!(movement.note.as_deref(), Some("broken box"));
        assert_eq!(movement.kind, MovementKind::Out);
    }

    #[test]
    fn test_each_pending_movement_has_fresh_id() {
        let request = MovementRequest::stock_in(ProductId::new(), 1);
        assert_ne!(request.to_new_movement().id, request.to_new_movement().id);
    }
}
