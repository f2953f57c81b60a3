//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use change_feed::ReadModel;
use ledger_store::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::AppState;

/// GET /metrics: refreshes view gauges, then renders all metrics in
/// Prometheus text format.
pub async fn get<S: LedgerStore + Clone + 'static>(
    State((handle, state)): State<(PrometheusHandle, Arc<AppState<S>>)>,
) -> impl IntoResponse {
    let views: [&dyn ReadModel; 2] = [&state.products, &state.movements];
    for view in views {
        metrics::gauge!("feed_view_entries", "view" => view.name()).set(view.count() as f64);
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
