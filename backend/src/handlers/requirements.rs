//! HTTP handlers for order material requirements and the stock commit

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::RequirementEntry;
use crate::services::stock_commit::CommitOutcome;
use crate::services::usage::UsageHistoryService;
use crate::services::{RequirementsService, StockCommitService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>, // "json" or "csv"
}

/// Fresh requirements of an order against live stock
pub async fn get_order_requirements(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let service = RequirementsService::new(state.db);
    let report = service.get_requirements(order_id).await?;

    if query.format.as_deref() == Some("csv") {
        let csv = UsageHistoryService::export_to_csv(&report.rows())?;
        let disposition = format!("attachment; filename=\"pedido_{}_materiais.csv\"", order_id);
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(report).into_response())
    }
}

/// Rebuild an order's cached requirement lists
pub async fn rebuild_order_requirements(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<Vec<RequirementEntry>>> {
    let service = RequirementsService::new(state.db);
    let requirements = service.rebuild(order_id).await?;
    Ok(Json(requirements))
}

/// Commit an order's materials; a no-op when already committed
pub async fn commit_order_materials(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> AppResult<Json<CommitOutcome>> {
    let service = StockCommitService::new(state.db, &state.config.stock);
    let outcome = service.commit(order_id).await?;
    Ok(Json(outcome))
}
