//! HTTP handlers for purchase endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{check_permission, CurrentUser, PURCHASES_WRITE};
use crate::models::{
    CreatePurchaseInput, PaginatedResponse, PurchaseDocument, PurchaseLine, UpdateLineInput,
    UpdatePurchaseInput,
};
use crate::services::{PurchaseFilter, PurchaseService};
use crate::AppState;

/// Create a purchase and add its units to stock
pub async fn create_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<(StatusCode, Json<PurchaseDocument>)> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    let purchase = service
        .create_purchase(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// List purchases, filtered and paginated
pub async fn list_purchases(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<PurchaseFilter>,
) -> AppResult<Json<PaginatedResponse<PurchaseDocument>>> {
    let service = PurchaseService::new(state.db);
    let purchases = service.list_purchases(filter).await?;
    Ok(Json(purchases))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDocument>> {
    let service = PurchaseService::new(state.db);
    let purchase = service.get_purchase(purchase_id).await?;
    Ok(Json(purchase))
}

/// Update purchase header fields
pub async fn update_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseInput>,
) -> AppResult<Json<PurchaseDocument>> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    let purchase = service
        .update_purchase(purchase_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(purchase))
}

/// Void a purchase
pub async fn void_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDocument>> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    let purchase = service
        .void_purchase(purchase_id, current_user.0.user_id)
        .await?;
    Ok(Json(purchase))
}

/// Delete a purchase
pub async fn delete_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    if service.delete_purchase(purchase_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Purchase", purchase_id))
    }
}

/// Change one purchase line
pub async fn update_purchase_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(line_id): Path<Uuid>,
    Json(input): Json<UpdateLineInput>,
) -> AppResult<Json<PurchaseLine>> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    let line = service
        .update_line(line_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(line))
}

/// Remove one purchase line
pub async fn delete_purchase_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(line_id): Path<Uuid>,
) -> AppResult<Json<PurchaseDocument>> {
    check_permission(&current_user.0, PURCHASES_WRITE)?;

    let service = PurchaseService::new(state.db);
    let purchase = service.delete_line(line_id, current_user.0.user_id).await?;
    Ok(Json(purchase))
}
