//! Route definitions for the garment MRP platform

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Raw materials and stock
        .nest("/materials", material_routes())
        // Usage history (read-only)
        .nest("/usage-history", usage_routes())
        // Product models and BOM
        .nest("/product-models", product_model_routes())
        // Sales orders, lines and material requirements
        .nest("/orders", order_routes())
}

/// Raw-material routes
fn material_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_materials).post(handlers::create_material),
        )
        .route("/low-stock", get(handlers::list_low_stock))
        .route("/colors", get(handlers::list_fabric_colors))
        .route("/collar-subtypes", get(handlers::list_collar_subtypes))
        .route(
            "/:material_id",
            get(handlers::get_material)
                .put(handlers::update_material)
                .delete(handlers::delete_material),
        )
        .route("/:material_id/use", post(handlers::use_material))
}

/// Usage history routes
fn usage_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_usage))
        .route("/export", get(handlers::export_usage))
        .route("/:usage_id", get(handlers::get_usage))
}

/// Product model and BOM routes
fn product_model_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_models).post(handlers::create_model))
        .route(
            "/:model_id",
            get(handlers::get_model)
                .put(handlers::update_model)
                .delete(handlers::delete_model),
        )
        .route("/:model_id/technical-sheet", get(handlers::get_technical_sheet))
        .route("/:model_id/check-stock", post(handlers::check_model_stock))
        .route("/:model_id/bom", post(handlers::add_bom_entry))
        .route(
            "/:model_id/bom/:entry_id",
            put(handlers::update_bom_entry).delete(handlers::delete_bom_entry),
        )
}

/// Sales order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route(
            "/:order_id",
            get(handlers::get_order)
                .put(handlers::update_order)
                .delete(handlers::delete_order),
        )
        .route(
            "/:order_id/lines",
            get(handlers::list_order_lines).post(handlers::add_order_line),
        )
        .route(
            "/:order_id/lines/:line_id",
            put(handlers::update_order_line).delete(handlers::delete_order_line),
        )
        .route("/:order_id/requirements", get(handlers::get_order_requirements))
        .route(
            "/:order_id/requirements/rebuild",
            post(handlers::rebuild_order_requirements),
        )
        .route(
            "/:order_id/commit-materials",
            post(handlers::commit_order_materials),
        )
}
