//! Movements read model: the full movement history, newest first.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use ledger_store::{Movement, MovementKind};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ObserverError;
use crate::observer::{FeedEvent, Observer};
use crate::read_model::ReadModel;

/// Aggregate counts over the movement history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovementStats {
    pub total: usize,
    pub ins: usize,
    pub outs: usize,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl MovementStats {
    fn from_history(movements: &[Movement]) -> Self {
        let ins = movements
            .iter()
            .filter(|m| m.kind == MovementKind::In)
            .count();
        Self {
            total: movements.len(),
            ins,
            outs: movements.len() - ins,
            // History is newest first.
            last_timestamp: movements.first().map(|m| m.timestamp),
        }
    }
}

#[derive(Default)]
struct MovementsState {
    movements: Vec<Movement>,
    generation: Option<u64>,
    terminated: Option<String>,
}

/// Read model holding the most recent movement snapshot.
#[derive(Clone, Default)]
pub struct MovementsView {
    state: Arc<RwLock<MovementsState>>,
}

impl MovementsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every movement, newest first.
    pub async fn all(&self) -> Vec<Movement> {
        self.state.read().await.movements.clone()
    }

    /// Movements of one product, newest first. Includes deleted products.
    pub async fn for_product(&self, product_id: ProductId) -> Vec<Movement> {
        self.state
            .read()
            .await
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect()
    }

    /// The `limit` most recent movements.
    pub async fn recent(&self, limit: usize) -> Vec<Movement> {
        let state = self.state.read().await;
        state.movements.iter().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> MovementStats {
        MovementStats::from_history(&self.state.read().await.movements)
    }

    pub async fn generation(&self) -> Option<u64> {
        self.state.read().await.generation
    }

    pub async fn terminated(&self) -> Option<String> {
        self.state.read().await.terminated.clone()
    }
}

#[async_trait]
impl Observer<Movement> for MovementsView {
    async fn notify(&self, event: FeedEvent<Movement>) -> Result<(), ObserverError> {
        let mut state = self.state.write().await;
        match event {
            FeedEvent::Snapshot(snapshot) => {
                state.movements = snapshot.items;
                state.generation = Some(snapshot.generation);
                state.terminated = None;
            }
            FeedEvent::Terminated(reason) => {
                tracing::warn!(%reason, "movements feed terminated");
                state.terminated = Some(reason);
            }
        }
        Ok(())
    }
}

impl ReadModel for MovementsView {
    fn name(&self) -> &'static str {
        "MovementsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.movements.len()).unwrap_or(0)
    }
}
