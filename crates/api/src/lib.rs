//! HTTP API server with observability for the inventory ledger.
//!
//! Provides REST endpoints for products and stock movements,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InventoryService, RetryPolicy};
use ledger_store::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get::<S>))
        .with_state((metrics_handle, state.clone()));

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .patch(routes::products::update::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route(
            "/products/{id}/movements",
            post(routes::movements::register::<S>),
        )
        .route("/movements", get(routes::movements::list::<S>))
        .route("/movements/stats", get(routes::movements::stats::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store, with live views subscribed.
pub async fn create_default_state<S: LedgerStore + Clone + 'static>(
    store: S,
    policy: RetryPolicy,
) -> inventory::Result<Arc<AppState<S>>> {
    let service = InventoryService::with_policy(store, policy);
    Ok(Arc::new(AppState::start(service).await?))
}
