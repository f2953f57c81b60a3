//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Inventory operation error.
    Inventory(InventoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg),
            ApiError::Inventory(err) => inventory_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        InventoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. } | InventoryError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        InventoryError::StoreUnavailable(msg) => {
            tracing::error!(error = %msg, "store unavailable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, err.kind(), err.to_string())
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn status_of(err: InventoryError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_inventory_errors_map_to_statuses() {
        let id = ProductId::new();
        assert_eq!(status_of(InventoryError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(InventoryError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(InventoryError::InsufficientStock {
                product_id: id,
                available: 1,
                requested: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(InventoryError::Conflict {
                product_id: id,
                attempts: 5
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(InventoryError::StoreUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
