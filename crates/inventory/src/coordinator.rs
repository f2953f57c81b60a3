//! Transaction coordinator: read, check and commit stock movements.

use std::time::Instant;

use ledger_store::{LedgerStore, LedgerStoreError, LedgerTransaction, Movement, MovementKind};

use crate::error::{InventoryError, Result};
use crate::movement::MovementRequest;
use crate::retry::RetryPolicy;
use crate::stock;

/// Why a single attempt did not commit.
enum AttemptFailure {
    /// A definitive outcome; returned to the caller as is.
    Rejected(InventoryError),
    /// A store error; conflicts are retried, anything else is surfaced.
    Store(LedgerStoreError),
}

impl From<LedgerStoreError> for AttemptFailure {
    fn from(e: LedgerStoreError) -> Self {
        AttemptFailure::Store(e)
    }
}

/// Runs the read-check-write cycle for stock movements.
///
/// Each attempt:
/// 1. Reads the product fresh, with its revision
/// 2. Runs the stock invariant check
/// 3. Commits the new quantity and the movement in one transaction guarded
///    by the revision that was read
///
/// A revision mismatch at commit time is retried per the [`RetryPolicy`].
#[derive(Clone)]
pub struct TransactionCoordinator<S: LedgerStore> {
    store: S,
    policy: RetryPolicy,
}

impl<S> TransactionCoordinator<S>
where
    S: LedgerStore + Clone + 'static,
{
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Applies a stock movement atomically.
    ///
    /// Either the quantity change and the movement record are both
    /// committed, or neither is.
    #[tracing::instrument(
        skip(self, request),
        fields(product_id = %request.product_id, kind = %request.kind, quantity = request.quantity)
    )]
    pub async fn register_movement(&self, request: MovementRequest) -> Result<Movement> {
        request.validate()?;

        let started = Instant::now();
        let outcome = self.run(&request).await;
        metrics::histogram!("ledger_commit_seconds").record(started.elapsed().as_secs_f64());

        match &outcome {
            Ok(movement) => {
                metrics::counter!("ledger_movements_total", "kind" => request.kind.as_str())
                    .increment(1);
                tracing::info!(movement_id = %movement.id, sequence = %movement.sequence, "movement committed");
            }
            Err(e) => {
                metrics::counter!("ledger_movements_rejected_total", "reason" => e.kind())
                    .increment(1);
                tracing::debug!(error = %e, "movement rejected");
            }
        }
        outcome
    }

    async fn run(&self, request: &MovementRequest) -> Result<Movement> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.attempt(request).await {
                Ok(movement) => return Ok(movement),
                Err(AttemptFailure::Rejected(e)) => return Err(e),
                Err(AttemptFailure::Store(e)) if e.is_conflict() => {
                    metrics::counter!("ledger_transaction_conflicts_total").increment(1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "transaction conflict"
                    );

                    if attempt >= self.policy.max_attempts {
                        return Err(InventoryError::Conflict {
                            product_id: request.product_id,
                            attempts: attempt,
                        });
                    }

                    let delay = self.policy.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(AttemptFailure::Store(e)) => return Err(e.into()),
            }
        }
    }

    async fn attempt(&self, request: &MovementRequest) -> std::result::Result<Movement, AttemptFailure> {
        let product_id = request.product_id;

        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(AttemptFailure::Rejected(InventoryError::NotFound(product_id)))?;

        let checked = stock::check(product.quantity, request.kind, request.quantity);
        if !checked.ok {
            let rejection = match request.kind {
                MovementKind::Out => InventoryError::InsufficientStock {
                    product_id,
                    available: product.quantity,
                    requested: request.quantity,
                },
                MovementKind::In => InventoryError::invalid(format!(
                    "adding {} units to product {product_id} would overflow its stock level of {}",
                    request.quantity, product.quantity
                )),
            };
            return Err(AttemptFailure::Rejected(rejection));
        }

        let transaction = LedgerTransaction::new()
            .expect_revision(product_id, product.revision)
            .set_quantity(product_id, checked.new_quantity)
            .append_movement(request.to_new_movement());

        // Once started, the commit runs to completion even if the caller
        // stops waiting.
        let store = self.store.clone();
        let receipt = tokio::spawn(async move { store.commit(transaction).await })
            .await
            .map_err(|e| {
                AttemptFailure::Rejected(InventoryError::StoreUnavailable(format!(
                    "commit task failed: {e}"
                )))
            })??;

        receipt.movements.into_iter().next().ok_or_else(|| {
            AttemptFailure::Rejected(InventoryError::StoreUnavailable(
                "commit receipt carried no movement".to_string(),
            ))
        })
    }
}
