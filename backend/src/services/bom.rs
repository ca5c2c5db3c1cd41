//! Product model and bill-of-materials management

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    availability, expand, parse_size_grid, validate_bom_quantity, validate_name, BomEntry,
    BomLine, BomTable, Pagination, PaginatedResponse, ProductFamily, ProductModel, Size,
    UnitOfMeasure,
};
use sqlx::{FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::material::read_stock_levels;

/// BOM service for product models and their per-size material consumption
#[derive(Clone)]
pub struct BomService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct ProductModelRow {
    id: i64,
    nome: String,
    tipo: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductModelRow> for ProductModel {
    fn from(row: ProductModelRow) -> Self {
        ProductModel {
            id: row.id,
            nome: row.nome,
            tipo: ProductFamily::parse(&row.tipo).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct BomEntryRow {
    id: i64,
    modelo_id: i64,
    tamanho: String,
    material_id: i64,
    quantidade: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BomEntryRow> for BomEntry {
    type Error = AppError;

    fn try_from(row: BomEntryRow) -> Result<Self, Self::Error> {
        let tamanho = Size::parse(&row.tamanho)
            .ok_or_else(|| AppError::Internal(format!("Unknown size code {}", row.tamanho)))?;
        Ok(BomEntry {
            id: row.id,
            modelo_id: row.modelo_id,
            tamanho,
            material_id: row.material_id,
            quantidade: row.quantidade,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// One BOM entry as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct BomEntryInput {
    /// Present when updating an existing entry through a model update
    pub id: Option<i64>,
    pub tamanho: Size,
    pub material_id: i64,
    pub quantidade: Decimal,
}

/// Input for creating a product model
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductModelInput {
    #[validate(length(min = 1, max = 100))]
    pub nome: String,
    #[serde(default)]
    pub tipo: ProductFamily,
    #[serde(default)]
    pub bom: Vec<BomEntryInput>,
}

/// Input for updating a product model. A supplied `bom` replaces the
/// model's entries.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductModelInput {
    #[validate(length(min = 1, max = 100))]
    pub nome: Option<String>,
    pub tipo: Option<ProductFamily>,
    pub bom: Option<Vec<BomEntryInput>>,
}

/// Input for updating one BOM entry
#[derive(Debug, Deserialize)]
pub struct UpdateBomEntryInput {
    pub tamanho: Option<Size>,
    pub material_id: Option<i64>,
    pub quantidade: Option<Decimal>,
}

/// Product model with its BOM
#[derive(Debug, Serialize)]
pub struct ProductModelDetail {
    #[serde(flatten)]
    pub model: ProductModel,
    pub bom: Vec<BomEntry>,
}

/// One row of a technical sheet
#[derive(Debug, Serialize, FromRow)]
pub struct TechnicalSheetLine {
    pub bom_entry_id: i64,
    pub material_id: i64,
    pub material_nome: String,
    pub tipo_produto: String,
    pub cor: String,
    pub unidade: String,
    pub quantidade: Decimal,
}

/// A model's BOM grouped by size
#[derive(Debug, Serialize)]
pub struct TechnicalSheet {
    pub modelo: ProductModel,
    pub tamanhos: BTreeMap<Size, Vec<TechnicalSheetLine>>,
}

/// Required vs. available stock for one material of a model
#[derive(Debug, Serialize)]
pub struct StockCheckEntry {
    pub material_id: i64,
    pub nome: String,
    pub tipo_produto: String,
    pub cor: String,
    pub unidade: String,
    pub quantidade_necessaria: Decimal,
    pub quantidade_disponivel: Decimal,
    pub suficiente: bool,
}

/// Result of checking a model's stock for a size grid
#[derive(Debug, Serialize)]
pub struct StockCheck {
    pub modelo_id: i64,
    pub suficiente: bool,
    pub materiais: Vec<StockCheckEntry>,
}

/// Load the BOM of `model_ids` joined with material names and units
pub(crate) async fn load_bom_table(
    conn: &mut PgConnection,
    model_ids: &[i64],
) -> AppResult<BomTable> {
    if model_ids.is_empty() {
        return Ok(BomTable::new());
    }

    let rows = sqlx::query_as::<_, (i64, String, i64, String, String, Decimal)>(
        r#"
        SELECT b.modelo_id, b.tamanho, b.material_id, m.name, m.unidade_medida, b.quantidade
        FROM bom_entries b
        JOIN materials m ON m.id = b.material_id
        WHERE b.modelo_id = ANY($1)
        ORDER BY b.modelo_id, b.tamanho, b.material_id
        "#,
    )
    .bind(model_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(model_id, size, material_id, name, unit, quantity)| {
            let size = Size::parse(&size)?;
            Some((
                model_id,
                size,
                BomLine {
                    material_id,
                    material_name: name,
                    unit: UnitOfMeasure::parse(&unit).unwrap_or_default(),
                    quantity_per_unit: quantity,
                },
            ))
        })
        .collect())
}

fn check_entry_quantity(quantity: Decimal) -> AppResult<()> {
    validate_bom_quantity(quantity).map_err(|msg| {
        AppError::validation(
            "quantidade",
            msg,
            "A quantidade deve ser maior que zero com no máximo 3 casas decimais",
        )
    })
}

fn check_entries(entries: &[BomEntryInput]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        check_entry_quantity(entry.quantidade)?;
        if !seen.insert((entry.tamanho, entry.material_id)) {
            return Err(AppError::validation(
                "bom",
                &format!(
                    "Material {} is listed twice for size {}",
                    entry.material_id, entry.tamanho
                ),
                &format!(
                    "Matéria-prima {} repetida para o tamanho {}",
                    entry.material_id, entry.tamanho
                ),
            ));
        }
    }
    Ok(())
}

async fn insert_entry(
    conn: &mut PgConnection,
    model_id: i64,
    entry: &BomEntryInput,
) -> AppResult<BomEntry> {
    sqlx::query_as::<_, BomEntryRow>(
        r#"
        INSERT INTO bom_entries (modelo_id, tamanho, material_id, quantidade)
        VALUES ($1, $2, $3, $4)
        RETURNING id, modelo_id, tamanho, material_id, quantidade, created_at, updated_at
        "#,
    )
    .bind(model_id)
    .bind(entry.tamanho.as_str())
    .bind(entry.material_id)
    .bind(entry.quantidade)
    .fetch_one(&mut *conn)
    .await?
    .try_into()
}

async fn fetch_entries(conn: &mut PgConnection, model_id: i64) -> AppResult<Vec<BomEntry>> {
    sqlx::query_as::<_, BomEntryRow>(
        r#"
        SELECT id, modelo_id, tamanho, material_id, quantidade, created_at, updated_at
        FROM bom_entries
        WHERE modelo_id = $1
        ORDER BY tamanho, material_id
        "#,
    )
    .bind(model_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(BomEntry::try_from)
    .collect()
}

impl BomService {
    /// Create a new BomService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product model with its BOM
    pub async fn create_model(
        &self,
        input: CreateProductModelInput,
    ) -> AppResult<ProductModelDetail> {
        input.validate()?;
        validate_name(&input.nome)
            .map_err(|msg| AppError::validation("nome", msg, "O nome não pode ser vazio"))?;
        check_entries(&input.bom)?;

        let mut tx = self.db.begin().await?;

        let model: ProductModel = sqlx::query_as::<_, ProductModelRow>(
            r#"
            INSERT INTO product_models (nome, tipo)
            VALUES ($1, $2)
            RETURNING id, nome, tipo, created_at, updated_at
            "#,
        )
        .bind(input.nome.trim())
        .bind(input.tipo.as_str())
        .fetch_one(&mut *tx)
        .await?
        .into();

        let mut bom = Vec::with_capacity(input.bom.len());
        for entry in &input.bom {
            bom.push(insert_entry(&mut tx, model.id, entry).await?);
        }

        tx.commit().await?;

        tracing::info!(model_id = model.id, entries = bom.len(), "Product model created");
        Ok(ProductModelDetail { model, bom })
    }

    /// Get a product model with its BOM
    pub async fn get_model(&self, model_id: i64) -> AppResult<ProductModelDetail> {
        let mut conn = self.db.acquire().await?;
        let model = Self::fetch_model(&mut conn, model_id).await?;
        let bom = fetch_entries(&mut conn, model_id).await?;
        Ok(ProductModelDetail { model, bom })
    }

    async fn fetch_model(conn: &mut PgConnection, model_id: i64) -> AppResult<ProductModel> {
        let row = sqlx::query_as::<_, ProductModelRow>(
            "SELECT id, nome, tipo, created_at, updated_at FROM product_models WHERE id = $1",
        )
        .bind(model_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product model".to_string()))?;

        Ok(row.into())
    }

    /// List product models ordered by name
    pub async fn list_models(
        &self,
        tipo: Option<ProductFamily>,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<ProductModel>> {
        let tipo = tipo.map(|t| t.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM product_models WHERE ($1::text IS NULL OR tipo = $1)",
        )
        .bind(tipo)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ProductModelRow>(
            r#"
            SELECT id, nome, tipo, created_at, updated_at
            FROM product_models
            WHERE ($1::text IS NULL OR tipo = $1)
            ORDER BY nome
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tipo)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter().map(ProductModel::from).collect(),
            pagination,
            total.max(0) as u64,
        ))
    }

    /// Update a product model; a supplied BOM list replaces the current one
    pub async fn update_model(
        &self,
        model_id: i64,
        input: UpdateProductModelInput,
    ) -> AppResult<ProductModelDetail> {
        input.validate()?;
        if let Some(nome) = &input.nome {
            validate_name(nome)
                .map_err(|msg| AppError::validation("nome", msg, "O nome não pode ser vazio"))?;
        }
        if let Some(bom) = &input.bom {
            check_entries(bom)?;
        }

        let mut tx = self.db.begin().await?;

        let model: ProductModel = sqlx::query_as::<_, ProductModelRow>(
            r#"
            UPDATE product_models
            SET nome = COALESCE($1, nome), tipo = COALESCE($2, tipo), updated_at = NOW()
            WHERE id = $3
            RETURNING id, nome, tipo, created_at, updated_at
            "#,
        )
        .bind(input.nome.as_deref().map(str::trim))
        .bind(input.tipo.map(|t| t.as_str()))
        .bind(model_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product model".to_string()))?
        .into();

        if let Some(entries) = &input.bom {
            let kept: Vec<i64> = entries.iter().filter_map(|e| e.id).collect();

            let removed = sqlx::query(
                "DELETE FROM bom_entries WHERE modelo_id = $1 AND NOT (id = ANY($2))",
            )
            .bind(model_id)
            .bind(&kept)
            .execute(&mut *tx)
            .await?;

            for entry in entries {
                match entry.id {
                    Some(entry_id) => {
                        let updated = sqlx::query(
                            r#"
                            UPDATE bom_entries
                            SET tamanho = $1, material_id = $2, quantidade = $3, updated_at = NOW()
                            WHERE id = $4 AND modelo_id = $5
                            "#,
                        )
                        .bind(entry.tamanho.as_str())
                        .bind(entry.material_id)
                        .bind(entry.quantidade)
                        .bind(entry_id)
                        .bind(model_id)
                        .execute(&mut *tx)
                        .await?;

                        if updated.rows_affected() == 0 {
                            return Err(AppError::NotFound(format!("BOM entry {}", entry_id)));
                        }
                    }
                    None => {
                        insert_entry(&mut tx, model_id, entry).await?;
                    }
                }
            }

            tracing::info!(
                model_id,
                removed = removed.rows_affected(),
                entries = entries.len(),
                "BOM replaced"
            );
        }

        let bom = fetch_entries(&mut tx, model_id).await?;
        tx.commit().await?;

        Ok(ProductModelDetail { model, bom })
    }

    /// Delete a product model and its BOM. Order lines keep their cached
    /// requirements and lose the model reference.
    pub async fn delete_model(&self, model_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM product_models WHERE id = $1")
            .bind(model_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product model".to_string()));
        }

        tracing::info!(model_id, "Product model deleted");
        Ok(())
    }

    /// Add one BOM entry to a model
    pub async fn add_entry(&self, model_id: i64, input: BomEntryInput) -> AppResult<BomEntry> {
        check_entry_quantity(input.quantidade)?;

        let mut conn = self.db.acquire().await?;
        Self::fetch_model(&mut conn, model_id).await?;
        insert_entry(&mut conn, model_id, &input).await
    }

    /// Update one BOM entry
    pub async fn update_entry(
        &self,
        model_id: i64,
        entry_id: i64,
        input: UpdateBomEntryInput,
    ) -> AppResult<BomEntry> {
        if let Some(quantity) = input.quantidade {
            check_entry_quantity(quantity)?;
        }

        sqlx::query_as::<_, BomEntryRow>(
            r#"
            UPDATE bom_entries
            SET tamanho = COALESCE($1, tamanho),
                material_id = COALESCE($2, material_id),
                quantidade = COALESCE($3, quantidade),
                updated_at = NOW()
            WHERE id = $4 AND modelo_id = $5
            RETURNING id, modelo_id, tamanho, material_id, quantidade, created_at, updated_at
            "#,
        )
        .bind(input.tamanho.map(|s| s.as_str()))
        .bind(input.material_id)
        .bind(input.quantidade)
        .bind(entry_id)
        .bind(model_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("BOM entry".to_string()))?
        .try_into()
    }

    /// Delete one BOM entry
    pub async fn delete_entry(&self, model_id: i64, entry_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bom_entries WHERE id = $1 AND modelo_id = $2")
            .bind(entry_id)
            .bind(model_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("BOM entry".to_string()));
        }
        Ok(())
    }

    /// The model's BOM grouped by size, with material details
    pub async fn technical_sheet(&self, model_id: i64) -> AppResult<TechnicalSheet> {
        let mut conn = self.db.acquire().await?;
        let modelo = Self::fetch_model(&mut conn, model_id).await?;

        let rows = sqlx::query_as::<_, (String, i64, i64, String, String, String, String, Decimal)>(
            r#"
            SELECT b.tamanho, b.id, b.material_id, m.name, m.tipo_produto, m.cor,
                   m.unidade_medida, b.quantidade
            FROM bom_entries b
            JOIN materials m ON m.id = b.material_id
            WHERE b.modelo_id = $1
            ORDER BY b.tamanho, m.name
            "#,
        )
        .bind(model_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut tamanhos: BTreeMap<Size, Vec<TechnicalSheetLine>> = BTreeMap::new();
        for (size, entry_id, material_id, name, tipo_produto, cor, unit, quantity) in rows {
            let Some(size) = Size::parse(&size) else {
                continue;
            };
            let unit = UnitOfMeasure::parse(&unit).unwrap_or_default();
            tamanhos.entry(size).or_default().push(TechnicalSheetLine {
                bom_entry_id: entry_id,
                material_id,
                material_nome: name,
                tipo_produto,
                cor,
                unidade: unit.report_display().to_string(),
                quantidade: quantity,
            });
        }

        Ok(TechnicalSheet { modelo, tamanhos })
    }

    /// Check whether stock covers producing `grid` of a model
    pub async fn check_stock(
        &self,
        model_id: i64,
        grid: &serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<StockCheck> {
        let mut conn = self.db.acquire().await?;
        Self::fetch_model(&mut conn, model_id).await?;

        let (grid, issues) = parse_size_grid(grid);
        for issue in &issues {
            tracing::warn!(model_id, %issue, "Skipping size entry");
        }

        let bom = load_bom_table(&mut conn, &[model_id]).await?;
        let requirements = expand(Some(model_id), &grid, &bom);
        let ids: Vec<i64> = requirements.iter().map(|r| r.material_id).collect();
        let stock = read_stock_levels(&mut conn, &ids).await?;

        let details: HashMap<i64, (String, String, String)> =
            sqlx::query_as::<_, (i64, String, String, String)>(
                "SELECT id, tipo_produto, cor, unidade_medida FROM materials WHERE id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|(id, tipo, cor, unit)| (id, (tipo, cor, unit)))
            .collect();

        let materiais: Vec<StockCheckEntry> = availability(&requirements, &stock)
            .into_iter()
            .map(|a| {
                let (tipo_produto, cor, unidade) = match details.get(&a.material_id) {
                    Some((tipo, cor, unit)) => (
                        tipo.clone(),
                        cor.clone(),
                        UnitOfMeasure::parse(unit)
                            .unwrap_or_default()
                            .report_display()
                            .to_string(),
                    ),
                    None => (String::new(), String::new(), a.unidade.clone()),
                };
                StockCheckEntry {
                    material_id: a.material_id,
                    nome: a.nome,
                    tipo_produto,
                    cor,
                    unidade,
                    quantidade_necessaria: a.quantidade_necessaria,
                    quantidade_disponivel: a.quantidade_disponivel,
                    suficiente: a.suficiente,
                }
            })
            .collect();

        Ok(StockCheck {
            modelo_id: model_id,
            suficiente: materiais.iter().all(|m| m.suficiente),
            materiais,
        })
    }
}
