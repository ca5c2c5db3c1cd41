//! Database fixtures for service tests
//!
//! Tests using these helpers need `MRP_TEST_DATABASE_URL`; without it
//! `test_pool` returns `None` and the test returns early.

use rust_decimal::Decimal;
use shared::RequirementEntry;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("MRP_TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

pub async fn create_material(pool: &PgPool, quantity: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO materials (name, unidade_medida, quantity) VALUES ($1, 'METRO', $2) RETURNING id",
    )
    .bind(format!("Tecido {}", Uuid::new_v4()))
    .bind(dec(quantity))
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Model with BOM rows of (size, material, quantity per piece)
pub async fn create_model(pool: &PgPool, bom: &[(&str, i64, &str)]) -> i64 {
    let model_id: i64 =
        sqlx::query_scalar("INSERT INTO product_models (nome) VALUES ($1) RETURNING id")
            .bind(format!("Modelo {}", Uuid::new_v4()))
            .fetch_one(pool)
            .await
            .unwrap();
    for (size, material_id, quantity) in bom {
        sqlx::query(
            "INSERT INTO bom_entries (modelo_id, tamanho, material_id, quantidade) VALUES ($1, $2, $3, $4)",
        )
        .bind(model_id)
        .bind(*size)
        .bind(*material_id)
        .bind(dec(quantity))
        .execute(pool)
        .await
        .unwrap();
    }
    model_id
}

/// Order whose lines are inserted directly, leaving their cached lists empty
pub async fn create_order(
    pool: &PgPool,
    status: &str,
    lines: &[(i64, serde_json::Value)],
) -> i64 {
    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO sales_orders (cliente, status) VALUES ('Cliente Teste', $1) RETURNING id",
    )
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap();
    for (model_id, grid) in lines {
        sqlx::query(
            "INSERT INTO order_lines (pedido_id, modelo_base, tamanhos) VALUES ($1, $2, $3)",
        )
        .bind(order_id)
        .bind(*model_id)
        .bind(Json(grid))
        .execute(pool)
        .await
        .unwrap();
    }
    order_id
}

pub async fn quantity_of(pool: &PgPool, material_id: i64) -> Decimal {
    sqlx::query_scalar("SELECT quantity FROM materials WHERE id = $1")
        .bind(material_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Cached order-level requirement list
pub async fn order_list(pool: &PgPool, order_id: i64) -> Vec<RequirementEntry> {
    let list: Json<Vec<RequirementEntry>> =
        sqlx::query_scalar("SELECT materiais_necessarios FROM sales_orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(pool)
            .await
            .unwrap();
    list.0
}

/// Cached line-level requirement lists, by line id
pub async fn line_lists(pool: &PgPool, order_id: i64) -> Vec<Vec<RequirementEntry>> {
    sqlx::query_scalar::<_, Json<Vec<RequirementEntry>>>(
        "SELECT materiais FROM order_lines WHERE pedido_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .unwrap()
    .into_iter()
    .map(|Json(list)| list)
    .collect()
}

/// The order list equals the aggregate of its lines' lists
pub async fn assert_order_matches_lines(pool: &PgPool, order_id: i64) {
    let lines = line_lists(pool, order_id).await;
    assert_eq!(order_list(pool, order_id).await, shared::aggregate_lines(&lines));
}
