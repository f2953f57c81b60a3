//! Route handlers.

pub mod health;
pub mod metrics;
pub mod movements;
pub mod products;

use common::ProductId;

use crate::error::ApiError;

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
