//! HTTP handlers for raw-material endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Pagination, PaginatedResponse};

use crate::error::AppResult;
use crate::models::Material;
use crate::services::material::{
    fabric_subtype_label, CreateMaterialInput, MaterialFilter, UpdateMaterialInput,
    UseMaterialInput,
};
use crate::services::MaterialService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ColorQuery {
    pub categoria_subtipo: Option<String>,
}

/// List materials
pub async fn list_materials(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<MaterialFilter>,
) -> AppResult<Json<PaginatedResponse<Material>>> {
    let service = MaterialService::new(state.db);
    let materials = service.list_materials(&filter, &pagination).await?;
    Ok(Json(materials))
}

/// Create a material
pub async fn create_material(
    State(state): State<AppState>,
    Json(input): Json<CreateMaterialInput>,
) -> AppResult<(StatusCode, Json<Material>)> {
    let service = MaterialService::new(state.db);
    let material = service.create_material(input).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// Get a material by ID
pub async fn get_material(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
) -> AppResult<Json<Material>> {
    let service = MaterialService::new(state.db);
    let material = service.get_material(material_id).await?;
    Ok(Json(material))
}

/// Update a material
pub async fn update_material(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
    Json(input): Json<UpdateMaterialInput>,
) -> AppResult<Json<Material>> {
    let service = MaterialService::new(state.db);
    let material = service.update_material(material_id, input).await?;
    Ok(Json(material))
}

/// Delete a material
pub async fn delete_material(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
) -> AppResult<StatusCode> {
    let service = MaterialService::new(state.db);
    service.delete_material(material_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Consume stock of a material
pub async fn use_material(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
    Json(input): Json<UseMaterialInput>,
) -> AppResult<Json<Material>> {
    let service = MaterialService::new(state.db);
    let material = service.use_material(material_id, input).await?;
    Ok(Json(material))
}

/// Materials at or below their minimum stock
pub async fn list_low_stock(State(state): State<AppState>) -> AppResult<Json<Vec<Material>>> {
    let service = MaterialService::new(state.db);
    let materials = service.list_low_stock().await?;
    Ok(Json(materials))
}

/// Distinct fabric colours
pub async fn list_fabric_colors(
    State(state): State<AppState>,
    Query(query): Query<ColorQuery>,
) -> AppResult<Json<Vec<String>>> {
    let service = MaterialService::new(state.db);
    let subtype = query.categoria_subtipo.as_deref().map(fabric_subtype_label);
    let colors = service.list_fabric_colors(subtype).await?;
    Ok(Json(colors))
}

/// Distinct collar sub-categories
pub async fn list_collar_subtypes(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let service = MaterialService::new(state.db);
    let subtypes = service.list_collar_subtypes().await?;
    Ok(Json(subtypes))
}
