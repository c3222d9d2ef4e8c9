//! HTTP handlers for read-only catalog endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{Presentation, Product, ProductWithPresentations};
use crate::services::CatalogService;
use crate::AppState;

/// Get a product with its active presentations
pub async fn get_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductWithPresentations>> {
    let service = CatalogService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// List the active presentations of a product
pub async fn list_presentations(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<Presentation>>> {
    let service = CatalogService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product.presentaciones))
}

pub async fn get_presentation(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(presentation_id): Path<Uuid>,
) -> AppResult<Json<Presentation>> {
    let service = CatalogService::new(state.db);
    let presentation = service.get_presentation(presentation_id).await?;
    Ok(Json(presentation))
}

/// Products at or below their minimum stock
pub async fn list_low_stock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Product>>> {
    let service = CatalogService::new(state.db);
    let products = service.low_stock().await?;
    Ok(Json(products))
}
