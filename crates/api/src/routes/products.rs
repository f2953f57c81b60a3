//! Product endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use change_feed::ProductFilter;
use inventory::{NewProduct, Product, ProductPatch};
use ledger_store::LedgerStore;
use serde::Deserialize;

use super::parse_product_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
}

/// GET /products: list products by name, optionally filtered.
#[tracing::instrument(skip(state))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListProductsQuery>,
) -> Json<Vec<Product>> {
    let mut filter = ProductFilter::new().low_stock_only(query.low_stock);
    if let Some(term) = query.search {
        filter = filter.search(term);
    }
    Json(state.products.query(&filter).await)
}

/// POST /products: create a product.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.service.create_product(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{id}: a single product from the live view.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_product_id(&id)?;
    state
        .products
        .get(product_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// PATCH /products/{id}: edit descriptive fields.
#[tracing::instrument(skip(state, patch))]
pub async fn update<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let product = state.service.update_product(product_id, patch).await?;
    Ok(Json(product))
}

/// DELETE /products/{id}: remove a product; its movements remain.
#[tracing::instrument(skip(state))]
pub async fn delete<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&id)?;
    state.service.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
