//! Materialized requirement lists of order lines and orders
//!
//! Line and order requirement lists are caches. Everything here derives them
//! from the current BOM and the current lines, either persisting the result
//! (recompute/rebuild) or only returning it (fresh reads).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    aggregate_lines, availability, expand_submitted, MaterialAvailability,
    RequirementEntry, UnitOfMeasure,
};
use sqlx::{types::Json, PgConnection, PgPool};

use crate::error::{AppError, AppResult};
use crate::services::bom::load_bom_table;
use crate::services::material::read_stock_levels;

/// Requirements service
#[derive(Clone)]
pub struct RequirementsService {
    db: PgPool,
}

/// Fresh requirements of an order next to live stock
#[derive(Debug, Serialize)]
pub struct RequirementsReport {
    pub pedido_id: i64,
    pub materiais_baixados: bool,
    pub materiais: Vec<RequirementEntry>,
    pub disponibilidade: Vec<MaterialAvailability>,
    pub suficiente: bool,
}

/// Flat row of a requirements report, for CSV export
#[derive(Debug, Serialize)]
pub struct RequirementReportRow {
    pub material_id: i64,
    pub nome: String,
    pub unidade: String,
    pub quantidade_necessaria: rust_decimal::Decimal,
    pub quantidade_disponivel: rust_decimal::Decimal,
    pub suficiente: bool,
}

impl RequirementsReport {
    pub fn rows(&self) -> Vec<RequirementReportRow> {
        self.disponibilidade
            .iter()
            .map(|a| RequirementReportRow {
                material_id: a.material_id,
                nome: a.nome.clone(),
                unidade: report_unit(&a.unidade),
                quantidade_necessaria: a.quantidade_necessaria,
                quantidade_disponivel: a.quantidade_disponivel,
                suficiente: a.suficiente,
            })
            .collect()
    }
}

/// Map a requirement's display unit to the unit used in reports
fn report_unit(display: &str) -> String {
    match display {
        "Rolo" => UnitOfMeasure::Rolo.report_display(),
        "Tubo" => UnitOfMeasure::Tubo.report_display(),
        "Caixa" => UnitOfMeasure::Caixa.report_display(),
        other => other,
    }
    .to_string()
}

struct LineSource {
    id: i64,
    modelo_base: Option<i64>,
    tamanhos: Map<String, Value>,
}

async fn fetch_line_sources(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<Vec<LineSource>> {
    let rows = sqlx::query_as::<_, (i64, Option<i64>, Json<Map<String, Value>>)>(
        "SELECT id, modelo_base, tamanhos FROM order_lines WHERE pedido_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, modelo_base, Json(tamanhos))| LineSource {
            id,
            modelo_base,
            tamanhos,
        })
        .collect())
}

/// Expand every line of an order against the current BOM.
///
/// Returns the per-line lists keyed by line id.
async fn expand_lines(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<BTreeMap<i64, Vec<RequirementEntry>>> {
    let lines = fetch_line_sources(conn, order_id).await?;

    let mut model_ids: Vec<i64> = lines.iter().filter_map(|l| l.modelo_base).collect();
    model_ids.sort_unstable();
    model_ids.dedup();
    let bom = load_bom_table(conn, &model_ids).await?;

    Ok(lines
        .into_iter()
        .map(|line| {
            let (requirements, issues) = expand_submitted(line.modelo_base, &line.tamanhos, &bom);
            for issue in &issues {
                tracing::warn!(order_id, line_id = line.id, %issue, "Skipping size entry");
            }
            (line.id, requirements)
        })
        .collect())
}

/// Lock the order row. `None` when the order no longer exists.
pub(crate) async fn lock_order_row(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<Option<(String, bool)>> {
    let row = sqlx::query_as::<_, (String, bool)>(
        "SELECT status, materiais_baixados FROM sales_orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// Expand one line from its stored model and size grid and persist the
/// result on the line
pub(crate) async fn recompute_line(
    conn: &mut PgConnection,
    line_id: i64,
) -> AppResult<Vec<RequirementEntry>> {
    let (modelo_base, Json(tamanhos)) =
        sqlx::query_as::<_, (Option<i64>, Json<Map<String, Value>>)>(
            "SELECT modelo_base, tamanhos FROM order_lines WHERE id = $1",
        )
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order line".to_string()))?;

    let model_ids: Vec<i64> = modelo_base.into_iter().collect();
    let bom = load_bom_table(conn, &model_ids).await?;
    let (requirements, issues) = expand_submitted(modelo_base, &tamanhos, &bom);
    for issue in &issues {
        tracing::warn!(line_id, %issue, "Skipping size entry");
    }

    sqlx::query("UPDATE order_lines SET materiais = $1, updated_at = NOW() WHERE id = $2")
        .bind(Json(&requirements))
        .bind(line_id)
        .execute(&mut *conn)
        .await?;

    Ok(requirements)
}

/// Recompute an order's requirement list from the current lines' cached
/// lists and persist it.
///
/// The order row is locked so concurrent line edits aggregate one at a time.
/// An order that vanished is not an error; the call does nothing and
/// returns `None`.
pub(crate) async fn recompute_order(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<Option<Vec<RequirementEntry>>> {
    if lock_order_row(conn, order_id).await?.is_none() {
        tracing::warn!(order_id, "Order vanished before its requirements were recomputed");
        return Ok(None);
    }

    let lines = sqlx::query_scalar::<_, Json<Vec<RequirementEntry>>>(
        "SELECT materiais FROM order_lines WHERE pedido_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|Json(list)| list)
    .collect::<Vec<_>>();

    let totals = aggregate_lines(&lines);
    store_order_requirements(conn, order_id, &totals).await?;

    tracing::debug!(order_id, materials = totals.len(), "Order requirements recomputed");
    Ok(Some(totals))
}

/// Re-expand every line of an order and re-aggregate, persisting both
/// levels. Repeating the call leaves the same state.
pub(crate) async fn rebuild_order(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<Option<Vec<RequirementEntry>>> {
    if lock_order_row(conn, order_id).await?.is_none() {
        return Ok(None);
    }

    let per_line = expand_lines(conn, order_id).await?;
    for (line_id, requirements) in &per_line {
        sqlx::query("UPDATE order_lines SET materiais = $1, updated_at = NOW() WHERE id = $2")
            .bind(Json(requirements))
            .bind(line_id)
            .execute(&mut *conn)
            .await?;
    }

    let lists: Vec<Vec<RequirementEntry>> = per_line.into_values().collect();
    let totals = aggregate_lines(&lists);
    store_order_requirements(conn, order_id, &totals).await?;

    Ok(Some(totals))
}

/// Order-level requirements computed from the current lines and BOM,
/// without touching any cached list
pub(crate) async fn fresh_order_requirements(
    conn: &mut PgConnection,
    order_id: i64,
) -> AppResult<Vec<RequirementEntry>> {
    let per_line = expand_lines(conn, order_id).await?;
    let lists: Vec<Vec<RequirementEntry>> = per_line.into_values().collect();
    Ok(aggregate_lines(&lists))
}

pub(crate) async fn store_order_requirements(
    conn: &mut PgConnection,
    order_id: i64,
    requirements: &[RequirementEntry],
) -> AppResult<()> {
    sqlx::query(
        "UPDATE sales_orders SET materiais_necessarios = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(Json(requirements))
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl RequirementsService {
    /// Create a new RequirementsService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Rebuild an order's cached requirement lists from scratch
    pub async fn rebuild(&self, order_id: i64) -> AppResult<Vec<RequirementEntry>> {
        let mut tx = self.db.begin().await?;
        let totals = rebuild_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sales order".to_string()))?;
        tx.commit().await?;

        tracing::info!(order_id, materials = totals.len(), "Order requirements rebuilt");
        Ok(totals)
    }

    /// Fresh requirements of an order against live stock. Read-only.
    pub async fn get_requirements(&self, order_id: i64) -> AppResult<RequirementsReport> {
        let mut conn = self.db.acquire().await?;

        let materiais_baixados = sqlx::query_scalar::<_, bool>(
            "SELECT materiais_baixados FROM sales_orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales order".to_string()))?;

        let materiais = fresh_order_requirements(&mut conn, order_id).await?;
        let ids: Vec<i64> = materiais.iter().map(|r| r.material_id).collect();
        let stock = read_stock_levels(&mut conn, &ids).await?;
        let disponibilidade = availability(&materiais, &stock);

        Ok(RequirementsReport {
            pedido_id: order_id,
            materiais_baixados,
            suficiente: disponibilidade.iter().all(|a| a.suficiente),
            materiais,
            disponibilidade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_report_unit_maps_containers() {
        assert_eq!(report_unit("Rolo"), "Metro");
        assert_eq!(report_unit("Tubo"), "Metro");
        assert_eq!(report_unit("Caixa"), "Unidade");
        assert_eq!(report_unit("Grama"), "Grama");
    }

    #[test]
    fn test_report_rows_follow_availability() {
        let report = RequirementsReport {
            pedido_id: 1,
            materiais_baixados: false,
            materiais: vec![],
            disponibilidade: vec![MaterialAvailability {
                material_id: 4,
                nome: "Ribana Preta".to_string(),
                unidade: "Rolo".to_string(),
                quantidade_necessaria: Decimal::from(25),
                quantidade_disponivel: Decimal::from(10),
                suficiente: false,
            }],
            suficiente: false,
        };

        let rows = report.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unidade, "Metro");
        assert!(!rows[0].suficiente);
    }

    mod db {
        use super::*;
        use crate::services::test_support::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_rebuild_fills_lines_written_without_expansion() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let fabric = create_material(&pool, "0").await;
            let model = create_model(&pool, &[("M", fabric, "2.0"), ("P", fabric, "0.5")]).await;
            let order = create_order(
                &pool,
                "APROVADO",
                &[(model, json!({"M": 10})), (model, json!({"P": 10}))],
            )
            .await;
            assert!(order_list(&pool, order).await.is_empty());

            let totals = RequirementsService::new(pool.clone())
                .rebuild(order)
                .await
                .unwrap();

            assert_eq!(totals.len(), 1);
            assert_eq!(totals[0].quantidade, dec("25.0"));
            let lines = line_lists(&pool, order).await;
            assert_eq!(lines[0][0].quantidade, dec("20.0"));
            assert_eq!(lines[1][0].quantidade, dec("5.0"));
            assert_order_matches_lines(&pool, order).await;
        }

        #[tokio::test]
        async fn test_rebuild_twice_leaves_same_rows() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let fabric = create_material(&pool, "0").await;
            let lining = create_material(&pool, "0").await;
            let model = create_model(&pool, &[("G", fabric, "1.25"), ("G", lining, "0.125")]).await;
            let order = create_order(&pool, "PENDENTE", &[(model, json!({"G": 8, "GG": -2}))]).await;
            let service = RequirementsService::new(pool.clone());

            let first = service.rebuild(order).await.unwrap();
            let first_lines = line_lists(&pool, order).await;
            let second = service.rebuild(order).await.unwrap();

            assert_eq!(first, second);
            assert_eq!(first_lines, line_lists(&pool, order).await);
            assert_eq!(order_list(&pool, order).await, second);
        }

        #[tokio::test]
        async fn test_recompute_order_sums_cached_lines() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let fabric = create_material(&pool, "0").await;
            let model = create_model(&pool, &[("GG", fabric, "3.0")]).await;
            let order = create_order(
                &pool,
                "APROVADO",
                &[(model, json!({"GG": 2})), (model, json!({"GG": 3}))],
            )
            .await;
            let line_ids: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM order_lines WHERE pedido_id = $1 ORDER BY id")
                    .bind(order)
                    .fetch_all(&pool)
                    .await
                    .unwrap();

            let mut tx = pool.begin().await.unwrap();
            for line_id in &line_ids {
                recompute_line(&mut tx, *line_id).await.unwrap();
            }
            let totals = recompute_order(&mut tx, order).await.unwrap().unwrap();
            tx.commit().await.unwrap();

            assert_eq!(totals[0].quantidade, dec("15.0"));
            assert_order_matches_lines(&pool, order).await;
        }

        #[tokio::test]
        async fn test_recompute_of_missing_order_does_nothing() {
            let Some(pool) = test_pool().await else {
                return;
            };
            let mut tx = pool.begin().await.unwrap();
            assert_eq!(recompute_order(&mut tx, i64::MAX).await.unwrap(), None);
            assert_eq!(rebuild_order(&mut tx, i64::MAX).await.unwrap(), None);
            tx.rollback().await.unwrap();

            let err = RequirementsService::new(pool).rebuild(i64::MAX).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }
}
