//! HTTP handlers for sale endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{check_permission, CurrentUser, SALES_WRITE};
use crate::models::{
    CreateSaleInput, PaginatedResponse, SaleDocument, SaleLine, UpdateLineInput, UpdateSaleInput,
};
use crate::services::{SaleFilter, SaleService};
use crate::AppState;

/// Create a sale, taking its units out of stock
pub async fn create_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<(StatusCode, Json<SaleDocument>)> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    let sale = service.create_sale(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn list_sales(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<SaleFilter>,
) -> AppResult<Json<PaginatedResponse<SaleDocument>>> {
    let service = SaleService::new(state.db);
    let sales = service.list_sales(filter).await?;
    Ok(Json(sales))
}

pub async fn get_sale(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<SaleDocument>> {
    let service = SaleService::new(state.db);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(sale))
}

pub async fn update_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<SaleDocument>> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    let sale = service
        .update_sale(sale_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(sale))
}

/// Cancel a sale and return its units to stock
pub async fn cancel_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<SaleDocument>> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    let sale = service.cancel_sale(sale_id, current_user.0.user_id).await?;
    Ok(Json(sale))
}

pub async fn delete_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    if service.delete_sale(sale_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Sale", sale_id))
    }
}

pub async fn update_sale_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(line_id): Path<Uuid>,
    Json(input): Json<UpdateLineInput>,
) -> AppResult<Json<SaleLine>> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    let line = service
        .update_line(line_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(line))
}

pub async fn delete_sale_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(line_id): Path<Uuid>,
) -> AppResult<Json<SaleDocument>> {
    check_permission(&current_user.0, SALES_WRITE)?;

    let service = SaleService::new(state.db);
    let sale = service.delete_line(line_id, current_user.0.user_id).await?;
    Ok(Json(sale))
}
