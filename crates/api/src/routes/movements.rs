//! Stock movement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use change_feed::MovementStats;
use inventory::{Movement, MovementKind, MovementRequest};
use ledger_store::LedgerStore;
use serde::Deserialize;

use super::parse_product_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterMovementRequest {
    /// `IN` or `OUT`, case-insensitive.
    pub kind: String,
    pub quantity: i64,
    pub actor_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsQuery {
    pub product_id: Option<String>,
    pub limit: Option<usize>,
}

/// POST /products/{id}/movements: move stock in or out.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RegisterMovementRequest>,
) -> Result<(StatusCode, Json<Movement>), ApiError> {
    let product_id = parse_product_id(&id)?;
    let kind: MovementKind = req.kind.parse().map_err(ApiError::BadRequest)?;

    let mut request = MovementRequest::new(product_id, kind, req.quantity);
    if let Some(actor) = req.actor_id {
        request = request.by(actor);
    }
    if let Some(note) = req.note {
        request = request.with_note(note);
    }

    let movement = state.service.register_movement(request).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// GET /movements: movement history, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListMovementsQuery>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    let mut movements = match query.product_id.as_deref() {
        Some(id) => state.movements.for_product(parse_product_id(id)?).await,
        None => state.movements.all().await,
    };
    if let Some(limit) = query.limit {
        movements.truncate(limit);
    }
    Ok(Json(movements))
}

/// GET /movements/stats: totals over the whole history.
#[tracing::instrument(skip(state))]
pub async fn stats<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<MovementStats> {
    Json(state.movements.stats().await)
}
