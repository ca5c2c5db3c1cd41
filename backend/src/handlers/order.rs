//! HTTP handlers for sales orders and order lines

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::models::{OrderLine, SalesOrder};
use crate::services::order::{
    CreateOrderInput, OrderDetail, OrderFilter, OrderLineInput, OrderUpdateResult,
    UpdateOrderInput, UpdateOrderLineInput,
};
use crate::services::OrderService;
use crate::AppState;

fn order_service(state: AppState) -> OrderService {
    OrderService::new(state.db, &state.config.stock)
}

/// List sales orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<PaginatedResponse<SalesOrder>>> {
    let orders = order_service(state).list_orders(&filter, &pagination).await?;
    Ok(Json(orders))
}

/// Create a sales order with its lines
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderUpdateResult>)> {
    let order = order_service(state).create_order(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get a sales order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderDetail>> {
    let order = order_service(state).get_order(order_id).await?;
    Ok(Json(order))
}

/// Update a sales order header
pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(input): Json<UpdateOrderInput>,
) -> AppResult<Json<OrderUpdateResult>> {
    let order = order_service(state).update_order(order_id, input).await?;
    Ok(Json(order))
}

/// Delete a sales order
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<StatusCode> {
    order_service(state).delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lines of a sales order
pub async fn list_order_lines(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<Vec<OrderLine>>> {
    let lines = order_service(state).list_lines(order_id).await?;
    Ok(Json(lines))
}

/// Add a line to a sales order
pub async fn add_order_line(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(input): Json<OrderLineInput>,
) -> AppResult<(StatusCode, Json<OrderLine>)> {
    let line = order_service(state).add_line(order_id, input).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// Update a line of a sales order
pub async fn update_order_line(
    State(state): State<AppState>,
    Path((order_id, line_id)): Path<(i64, i64)>,
    Json(input): Json<UpdateOrderLineInput>,
) -> AppResult<Json<OrderLine>> {
    let line = order_service(state).update_line(order_id, line_id, input).await?;
    Ok(Json(line))
}

/// Delete a line of a sales order
pub async fn delete_order_line(
    State(state): State<AppState>,
    Path((order_id, line_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    order_service(state).delete_line(order_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
