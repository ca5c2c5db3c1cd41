//! HTTP handlers for material usage history

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::services::usage::{UsageFilter, UsageRecord};
use crate::services::UsageHistoryService;
use crate::AppState;

/// List usage history
pub async fn list_usage(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<UsageFilter>,
) -> AppResult<Json<PaginatedResponse<UsageRecord>>> {
    let service = UsageHistoryService::new(state.db);
    let usage = service.list_usage(&filter, &pagination).await?;
    Ok(Json(usage))
}

/// Get a usage-history entry
pub async fn get_usage(
    State(state): State<AppState>,
    Path(usage_id): Path<i64>,
) -> AppResult<Json<UsageRecord>> {
    let service = UsageHistoryService::new(state.db);
    let usage = service.get_usage(usage_id).await?;
    Ok(Json(usage))
}

/// Export usage history as CSV
pub async fn export_usage(
    State(state): State<AppState>,
    Query(filter): Query<UsageFilter>,
) -> AppResult<impl IntoResponse> {
    let service = UsageHistoryService::new(state.db);
    let records = service.export_usage(&filter).await?;
    let csv = UsageHistoryService::export_to_csv(&records)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"material_usage.csv\""),
        ],
        csv,
    ))
}
