//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use ledger_store::LedgerStore;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub feeds: &'static str,
    pub time: DateTime<Utc>,
}

/// GET /health: reports degraded when a live view has stopped updating.
pub async fn check<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (status, body) = if state.feeds_active() {
        (StatusCode::OK, ("ok", "live"))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ("degraded", "terminated"))
    };

    (
        status,
        Json(HealthResponse {
            status: body.0,
            feeds: body.1,
            time: Utc::now(),
        }),
    )
}
