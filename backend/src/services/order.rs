//! Sales orders and their lines
//!
//! Every line mutation re-expands the line and re-aggregates the order in the
//! same transaction. An order saved in the materials-confirmed status runs
//! the stock commit in that transaction as well, so a rejected commit also
//! rejects the save.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use shared::{
    parse_size_grid, OrderLine, OrderStatus, Pagination, PaginatedResponse, Priority,
    ProductFamily, RequirementEntry, SalesOrder,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::config::StockConfig;
use crate::error::{AppError, AppResult};
use crate::services::requirements::{lock_order_row, recompute_line, recompute_order};
use crate::services::stock_commit::{commit_in, CommitOutcome};

const ORDER_COLUMNS: &str = r#"
    id, cliente, data_pedido, prazo, prioridade, quantidade_pecas, valor_total, status,
    em_espera, materiais_baixados, materiais_necessarios, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, pedido_id, tipo, modelo_base, modelo, gola, manga, corpo_frente, corpo_costa,
    bordado, tamanhos, materiais, descricao, preco_unitario, created_at, updated_at
"#;

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    lock_timeout_ms: u64,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    cliente: String,
    data_pedido: DateTime<Utc>,
    prazo: Option<NaiveDate>,
    prioridade: String,
    quantidade_pecas: i32,
    valor_total: Option<Decimal>,
    status: String,
    em_espera: bool,
    materiais_baixados: bool,
    materiais_necessarios: Json<Vec<RequirementEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for SalesOrder {
    fn from(row: OrderRow) -> Self {
        SalesOrder {
            id: row.id,
            cliente: row.cliente,
            data_pedido: row.data_pedido,
            prazo: row.prazo,
            prioridade: Priority::parse(&row.prioridade).unwrap_or_default(),
            quantidade_pecas: row.quantidade_pecas,
            valor_total: row.valor_total,
            status: OrderStatus::parse(&row.status).unwrap_or_default(),
            em_espera: row.em_espera,
            materiais_baixados: row.materiais_baixados,
            materiais_necessarios: row.materiais_necessarios.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: i64,
    pedido_id: i64,
    tipo: String,
    modelo_base: Option<i64>,
    modelo: String,
    gola: Option<String>,
    manga: Option<String>,
    corpo_frente: Option<String>,
    corpo_costa: Option<String>,
    bordado: Option<String>,
    tamanhos: Json<Map<String, Value>>,
    materiais: Json<Vec<RequirementEntry>>,
    descricao: Option<String>,
    preco_unitario: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderLineRow> for OrderLine {
    fn from(row: OrderLineRow) -> Self {
        OrderLine {
            id: row.id,
            pedido_id: row.pedido_id,
            tipo: ProductFamily::parse(&row.tipo).unwrap_or_default(),
            modelo_base: row.modelo_base,
            modelo: row.modelo,
            gola: row.gola,
            manga: row.manga,
            corpo_frente: row.corpo_frente,
            corpo_costa: row.corpo_costa,
            bordado: row.bordado,
            tamanhos: row.tamanhos.0,
            materiais: row.materiais.0,
            descricao: row.descricao,
            preco_unitario: row.preco_unitario,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// An order with its lines
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub pedido: SalesOrder,
    pub linhas: Vec<OrderLine>,
}

/// An updated order, with the stock commit it triggered, if any
#[derive(Debug, Serialize)]
pub struct OrderUpdateResult {
    pub pedido: OrderDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baixa_materiais: Option<CommitOutcome>,
}

/// One order line as submitted
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderLineInput {
    #[serde(default)]
    pub tipo: ProductFamily,
    pub modelo_base: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub modelo: String,
    pub gola: Option<String>,
    pub manga: Option<String>,
    pub corpo_frente: Option<String>,
    pub corpo_costa: Option<String>,
    pub bordado: Option<String>,
    #[serde(default)]
    pub tamanhos: Map<String, Value>,
    pub descricao: Option<String>,
    pub preco_unitario: Option<Decimal>,
}

/// Changes to an order line; absent fields keep their value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrderLineInput {
    pub tipo: Option<ProductFamily>,
    /// `null` clears the model, absence keeps it
    #[serde(default, deserialize_with = "present_or_null")]
    pub modelo_base: Option<Option<i64>>,
    #[validate(length(max = 255))]
    pub modelo: Option<String>,
    pub gola: Option<String>,
    pub manga: Option<String>,
    pub corpo_frente: Option<String>,
    pub corpo_costa: Option<String>,
    pub bordado: Option<String>,
    pub tamanhos: Option<Map<String, Value>>,
    pub descricao: Option<String>,
    pub preco_unitario: Option<Decimal>,
}

/// Input for creating an order with its lines
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[validate(length(min = 1, max = 255))]
    pub cliente: String,
    pub data_pedido: Option<DateTime<Utc>>,
    pub prazo: Option<NaiveDate>,
    #[serde(default)]
    pub prioridade: Priority,
    /// Defaults to the number of pieces across the lines' size grids
    #[validate(range(min = 0))]
    pub quantidade_pecas: Option<i32>,
    pub valor_total: Option<Decimal>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub em_espera: bool,
    #[serde(default)]
    #[validate]
    pub linhas: Vec<OrderLineInput>,
}

/// Changes to an order header; absent fields keep their value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrderInput {
    #[validate(length(min = 1, max = 255))]
    pub cliente: Option<String>,
    pub prazo: Option<NaiveDate>,
    pub prioridade: Option<Priority>,
    #[validate(range(min = 0))]
    pub quantidade_pecas: Option<i32>,
    pub valor_total: Option<Decimal>,
    pub status: Option<OrderStatus>,
    pub em_espera: Option<bool>,
}

/// Filters for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub prioridade: Option<Priority>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// Pieces ordered across the size grids of `lines`
fn total_pieces(lines: &[OrderLineInput]) -> i32 {
    let pieces: u64 = lines
        .iter()
        .map(|line| parse_size_grid(&line.tamanhos).0.total_pieces())
        .sum();
    i32::try_from(pieces).unwrap_or(i32::MAX)
}

async fn insert_line(
    conn: &mut PgConnection,
    order_id: i64,
    line: &OrderLineInput,
) -> AppResult<i64> {
    let line_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO order_lines (
            pedido_id, tipo, modelo_base, modelo, gola, manga, corpo_frente, corpo_costa,
            bordado, tamanhos, descricao, preco_unitario
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(line.tipo.as_str())
    .bind(line.modelo_base)
    .bind(&line.modelo)
    .bind(&line.gola)
    .bind(&line.manga)
    .bind(&line.corpo_frente)
    .bind(&line.corpo_costa)
    .bind(&line.bordado)
    .bind(Json(&line.tamanhos))
    .bind(&line.descricao)
    .bind(line.preco_unitario)
    .fetch_one(&mut *conn)
    .await?;

    recompute_line(conn, line_id).await?;
    Ok(line_id)
}

async fn fetch_order(conn: &mut PgConnection, order_id: i64) -> AppResult<OrderDetail> {
    let pedido: SalesOrder = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM sales_orders WHERE id = $1"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Sales order".to_string()))?
    .into();

    let linhas = sqlx::query_as::<_, OrderLineRow>(&format!(
        "SELECT {LINE_COLUMNS} FROM order_lines WHERE pedido_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(OrderLine::from)
    .collect();

    Ok(OrderDetail { pedido, linhas })
}

async fn fetch_line(conn: &mut PgConnection, order_id: i64, line_id: i64) -> AppResult<OrderLine> {
    let row = sqlx::query_as::<_, OrderLineRow>(&format!(
        "SELECT {LINE_COLUMNS} FROM order_lines WHERE id = $1 AND pedido_id = $2"
    ))
    .bind(line_id)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Order line".to_string()))?;

    Ok(row.into())
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, config: &StockConfig) -> Self {
        Self {
            db,
            lock_timeout_ms: config.lock_timeout_ms,
        }
    }

    /// Create an order with its lines
    pub async fn create_order(&self, input: CreateOrderInput) -> AppResult<OrderUpdateResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let order_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sales_orders (
                cliente, data_pedido, prazo, prioridade, quantidade_pecas, valor_total,
                status, em_espera
            )
            VALUES ($1, COALESCE($2, NOW()), $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(input.cliente.trim())
        .bind(input.data_pedido)
        .bind(input.prazo)
        .bind(input.prioridade.as_str())
        .bind(
            input
                .quantidade_pecas
                .unwrap_or_else(|| total_pieces(&input.linhas)),
        )
        .bind(input.valor_total)
        .bind(input.status.as_str())
        .bind(input.em_espera)
        .fetch_one(&mut *tx)
        .await?;

        for line in &input.linhas {
            insert_line(&mut tx, order_id, line).await?;
        }
        recompute_order(&mut tx, order_id).await?;

        let baixa_materiais = if input.status == OrderStatus::MATERIALS_CONFIRMED {
            Some(commit_in(&mut tx, order_id, self.lock_timeout_ms).await?)
        } else {
            None
        };

        let pedido = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(order_id, lines = pedido.linhas.len(), "Sales order created");
        Ok(OrderUpdateResult {
            pedido,
            baixa_materiais,
        })
    }

    /// Get an order with its lines
    pub async fn get_order(&self, order_id: i64) -> AppResult<OrderDetail> {
        let mut conn = self.db.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    /// List orders, newest first
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<SalesOrder>> {
        let status = filter.status.map(|s| s.as_str());
        let prioridade = filter.prioridade.map(|p| p.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sales_orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR prioridade = $2)
            "#,
        )
        .bind(status)
        .bind(prioridade)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM sales_orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR prioridade = $2)
            ORDER BY data_pedido DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(status)
        .bind(prioridade)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter().map(SalesOrder::from).collect(),
            pagination,
            total.max(0) as u64,
        ))
    }

    /// Update an order header.
    ///
    /// Saving the order in the materials-confirmed status commits its
    /// materials; repeated saves at that status are no-ops for stock.
    pub async fn update_order(
        &self,
        order_id: i64,
        input: UpdateOrderInput,
    ) -> AppResult<OrderUpdateResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        if lock_order_row(&mut tx, order_id).await?.is_none() {
            return Err(AppError::NotFound("Sales order".to_string()));
        }

        let status: String = sqlx::query_scalar(
            r#"
            UPDATE sales_orders
            SET cliente = COALESCE($1, cliente),
                prazo = COALESCE($2, prazo),
                prioridade = COALESCE($3, prioridade),
                quantidade_pecas = COALESCE($4, quantidade_pecas),
                valor_total = COALESCE($5, valor_total),
                status = COALESCE($6, status),
                em_espera = COALESCE($7, em_espera),
                updated_at = NOW()
            WHERE id = $8
            RETURNING status
            "#,
        )
        .bind(input.cliente.as_deref().map(str::trim))
        .bind(input.prazo)
        .bind(input.prioridade.map(|p| p.as_str()))
        .bind(input.quantidade_pecas)
        .bind(input.valor_total)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.em_espera)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        let baixa_materiais = if OrderStatus::parse(&status) == Some(OrderStatus::MATERIALS_CONFIRMED)
        {
            Some(commit_in(&mut tx, order_id, self.lock_timeout_ms).await?)
        } else {
            None
        };

        let pedido = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(order_id, status = %status, "Sales order updated");
        Ok(OrderUpdateResult {
            pedido,
            baixa_materiais,
        })
    }

    /// Delete an order and its lines. Usage history keeps the consumed
    /// quantities and loses the order reference.
    pub async fn delete_order(&self, order_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM sales_orders WHERE id = $1")
            .bind(order_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Sales order".to_string()));
        }

        tracing::info!(order_id, "Sales order deleted");
        Ok(())
    }

    /// Lines of an order
    pub async fn list_lines(&self, order_id: i64) -> AppResult<Vec<OrderLine>> {
        let mut conn = self.db.acquire().await?;
        Ok(fetch_order(&mut conn, order_id).await?.linhas)
    }

    /// Add a line and refresh the order's requirements
    pub async fn add_line(&self, order_id: i64, input: OrderLineInput) -> AppResult<OrderLine> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        if lock_order_row(&mut tx, order_id).await?.is_none() {
            return Err(AppError::NotFound("Sales order".to_string()));
        }
        let line_id = insert_line(&mut tx, order_id, &input).await?;
        recompute_order(&mut tx, order_id).await?;

        let line = fetch_line(&mut tx, order_id, line_id).await?;
        tx.commit().await?;

        tracing::info!(order_id, line_id, "Order line added");
        Ok(line)
    }

    /// Update a line and refresh the order's requirements
    pub async fn update_line(
        &self,
        order_id: i64,
        line_id: i64,
        input: UpdateOrderLineInput,
    ) -> AppResult<OrderLine> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        if lock_order_row(&mut tx, order_id).await?.is_none() {
            return Err(AppError::NotFound("Sales order".to_string()));
        }

        let updated = sqlx::query(
            r#"
            UPDATE order_lines
            SET tipo = COALESCE($1, tipo),
                modelo_base = CASE WHEN $2 THEN $3 ELSE modelo_base END,
                modelo = COALESCE($4, modelo),
                gola = COALESCE($5, gola),
                manga = COALESCE($6, manga),
                corpo_frente = COALESCE($7, corpo_frente),
                corpo_costa = COALESCE($8, corpo_costa),
                bordado = COALESCE($9, bordado),
                tamanhos = COALESCE($10, tamanhos),
                descricao = COALESCE($11, descricao),
                preco_unitario = COALESCE($12, preco_unitario),
                updated_at = NOW()
            WHERE id = $13 AND pedido_id = $14
            "#,
        )
        .bind(input.tipo.map(|t| t.as_str()))
        .bind(input.modelo_base.is_some())
        .bind(input.modelo_base.flatten())
        .bind(&input.modelo)
        .bind(&input.gola)
        .bind(&input.manga)
        .bind(&input.corpo_frente)
        .bind(&input.corpo_costa)
        .bind(&input.bordado)
        .bind(input.tamanhos.as_ref().map(Json))
        .bind(&input.descricao)
        .bind(input.preco_unitario)
        .bind(line_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Order line".to_string()));
        }

        recompute_line(&mut tx, line_id).await?;
        recompute_order(&mut tx, order_id).await?;

        let line = fetch_line(&mut tx, order_id, line_id).await?;
        tx.commit().await?;

        Ok(line)
    }

    /// Delete a line and refresh the order's requirements
    pub async fn delete_line(&self, order_id: i64, line_id: i64) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        if lock_order_row(&mut tx, order_id).await?.is_none() {
            return Err(AppError::NotFound("Sales order".to_string()));
        }

        let result = sqlx::query("DELETE FROM order_lines WHERE id = $1 AND pedido_id = $2")
            .bind(line_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Order line".to_string()));
        }

        recompute_order(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(order_id, line_id, "Order line deleted");
        Ok(())
    }
}
