//! HTTP handlers for product models and their bills of materials

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::models::{BomEntry, ProductFamily, ProductModel};
use crate::services::bom::{
    BomEntryInput, CreateProductModelInput, ProductModelDetail, StockCheck, TechnicalSheet,
    UpdateBomEntryInput, UpdateProductModelInput,
};
use crate::services::BomService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelQuery {
    pub tipo: Option<ProductFamily>,
}

#[derive(Debug, Deserialize)]
pub struct CheckStockInput {
    #[serde(default)]
    pub tamanhos: Map<String, Value>,
}

/// List product models
pub async fn list_models(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<ModelQuery>,
) -> AppResult<Json<PaginatedResponse<ProductModel>>> {
    let service = BomService::new(state.db);
    let models = service.list_models(query.tipo, &pagination).await?;
    Ok(Json(models))
}

/// Create a product model with its BOM
pub async fn create_model(
    State(state): State<AppState>,
    Json(input): Json<CreateProductModelInput>,
) -> AppResult<(StatusCode, Json<ProductModelDetail>)> {
    let service = BomService::new(state.db);
    let model = service.create_model(input).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

/// Get a product model with its BOM
pub async fn get_model(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
) -> AppResult<Json<ProductModelDetail>> {
    let service = BomService::new(state.db);
    let model = service.get_model(model_id).await?;
    Ok(Json(model))
}

/// Update a product model
pub async fn update_model(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
    Json(input): Json<UpdateProductModelInput>,
) -> AppResult<Json<ProductModelDetail>> {
    let service = BomService::new(state.db);
    let model = service.update_model(model_id, input).await?;
    Ok(Json(model))
}

/// Delete a product model
pub async fn delete_model(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
) -> AppResult<StatusCode> {
    let service = BomService::new(state.db);
    service.delete_model(model_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add a BOM entry to a model
pub async fn add_bom_entry(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
    Json(input): Json<BomEntryInput>,
) -> AppResult<(StatusCode, Json<BomEntry>)> {
    let service = BomService::new(state.db);
    let entry = service.add_entry(model_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Update a BOM entry
pub async fn update_bom_entry(
    State(state): State<AppState>,
    Path((model_id, entry_id)): Path<(i64, i64)>,
    Json(input): Json<UpdateBomEntryInput>,
) -> AppResult<Json<BomEntry>> {
    let service = BomService::new(state.db);
    let entry = service.update_entry(model_id, entry_id, input).await?;
    Ok(Json(entry))
}

/// Delete a BOM entry
pub async fn delete_bom_entry(
    State(state): State<AppState>,
    Path((model_id, entry_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    let service = BomService::new(state.db);
    service.delete_entry(model_id, entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A model's BOM grouped by size
pub async fn get_technical_sheet(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
) -> AppResult<Json<TechnicalSheet>> {
    let service = BomService::new(state.db);
    let sheet = service.technical_sheet(model_id).await?;
    Ok(Json(sheet))
}

/// Check stock for producing a size grid of a model
pub async fn check_model_stock(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
    Json(input): Json<CheckStockInput>,
) -> AppResult<Json<StockCheck>> {
    let service = BomService::new(state.db);
    let check = service.check_stock(model_id, &input.tamanhos).await?;
    Ok(Json(check))
}
