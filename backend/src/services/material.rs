//! Raw-material inventory ledger
//!
//! Owns material stock quantities. Every decrement goes through
//! [`decrement_stock`], which re-checks the floor in the `UPDATE` itself and
//! appends a usage-history entry in the caller's transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    resolve_quantity, validate_container_factors, validate_name, validate_stock_quantity,
    validate_usage_quantity, ContainerFactors, Material, Pagination, PaginatedResponse,
    Shortfall, StockDecrement, StockLevel, StorageLocation, UnitOfMeasure, UsageHistoryEntry,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

const MATERIAL_COLUMNS: &str = r#"
    id, name, tipo_produto, categoria_subtipo, cor, unidade_medida, quantity, local,
    minimum_stock, quantidade_rolos, metragem_por_rolo, quantidade_caixas,
    quantidade_por_caixa, quantidade_tubos, metros_por_tubo, created_at, updated_at
"#;

/// Material service for stock records and manual consumption
#[derive(Clone)]
pub struct MaterialService {
    db: PgPool,
}

/// Database row for a material
#[derive(Debug, FromRow)]
struct MaterialRow {
    id: i64,
    name: String,
    tipo_produto: String,
    categoria_subtipo: String,
    cor: String,
    unidade_medida: String,
    quantity: Decimal,
    local: String,
    minimum_stock: Decimal,
    quantidade_rolos: Option<i32>,
    metragem_por_rolo: Option<Decimal>,
    quantidade_caixas: Option<i32>,
    quantidade_por_caixa: Option<i32>,
    quantidade_tubos: Option<i32>,
    metros_por_tubo: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            name: row.name,
            tipo_produto: row.tipo_produto,
            categoria_subtipo: row.categoria_subtipo,
            cor: row.cor,
            unidade_medida: UnitOfMeasure::parse(&row.unidade_medida).unwrap_or_default(),
            quantity: row.quantity,
            local: StorageLocation::parse(&row.local).unwrap_or_default(),
            minimum_stock: row.minimum_stock,
            containers: ContainerFactors {
                quantidade_rolos: row.quantidade_rolos,
                metragem_por_rolo: row.metragem_por_rolo,
                quantidade_caixas: row.quantidade_caixas,
                quantidade_por_caixa: row.quantidade_por_caixa,
                quantidade_tubos: row.quantidade_tubos,
                metros_por_tubo: row.metros_por_tubo,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for creating a material
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 50))]
    pub tipo_produto: Option<String>,
    #[validate(length(max = 255))]
    pub categoria_subtipo: Option<String>,
    #[validate(length(max = 100))]
    pub cor: Option<String>,
    pub unidade_medida: Option<UnitOfMeasure>,
    pub quantity: Option<Decimal>,
    pub local: Option<StorageLocation>,
    pub minimum_stock: Option<Decimal>,
    #[serde(flatten)]
    pub containers: ContainerFactors,
}

/// Input for updating a material; absent fields keep their value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMaterialInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub tipo_produto: Option<String>,
    #[validate(length(max = 255))]
    pub categoria_subtipo: Option<String>,
    #[validate(length(max = 100))]
    pub cor: Option<String>,
    pub unidade_medida: Option<UnitOfMeasure>,
    pub quantity: Option<Decimal>,
    pub local: Option<StorageLocation>,
    pub minimum_stock: Option<Decimal>,
    pub quantidade_rolos: Option<i32>,
    pub metragem_por_rolo: Option<Decimal>,
    pub quantidade_caixas: Option<i32>,
    pub quantidade_por_caixa: Option<i32>,
    pub quantidade_tubos: Option<i32>,
    pub metros_por_tubo: Option<Decimal>,
}

impl UpdateMaterialInput {
    /// Whether the update sets the unit or any container factor
    fn touches_containers(&self) -> bool {
        self.unidade_medida.is_some()
            || self.quantidade_rolos.is_some()
            || self.metragem_por_rolo.is_some()
            || self.quantidade_caixas.is_some()
            || self.quantidade_por_caixa.is_some()
            || self.quantidade_tubos.is_some()
            || self.metros_por_tubo.is_some()
    }
}

/// Input for consuming stock outside of an order commit
#[derive(Debug, Deserialize)]
pub struct UseMaterialInput {
    pub quantidade_utilizada: Decimal,
    pub pedido_id: Option<i64>,
}

/// Filters for listing materials
#[derive(Debug, Default, Deserialize)]
pub struct MaterialFilter {
    pub unidade_medida: Option<UnitOfMeasure>,
    pub local: Option<StorageLocation>,
    pub tipo_produto: Option<String>,
}

/// Lock the inventory rows of `material_ids` and read their levels.
///
/// Rows are locked in ascending id order and the call blocks while another
/// transaction holds one of them. Unknown ids are simply absent from the map.
pub(crate) async fn lock_stock_levels(
    conn: &mut PgConnection,
    material_ids: &[i64],
) -> AppResult<BTreeMap<i64, StockLevel>> {
    if material_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let rows = sqlx::query_as::<_, StockLevelRow>(
        r#"
        SELECT id, name, unidade_medida, quantity
        FROM materials
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(material_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(stock_levels(rows))
}

/// Apply one approved decrement and record it in the usage history.
///
/// The floor is enforced by the `UPDATE` itself, so a decrement that would
/// drive the quantity negative touches nothing and fails.
pub(crate) async fn decrement_stock(
    conn: &mut PgConnection,
    decrement: &StockDecrement,
    order_id: Option<i64>,
    batch_id: Uuid,
) -> AppResult<UsageHistoryEntry> {
    let updated = sqlx::query(
        r#"
        UPDATE materials
        SET quantity = quantity - $1, updated_at = NOW()
        WHERE id = $2 AND quantity >= $1
        "#,
    )
    .bind(decrement.quantity)
    .bind(decrement.material_id)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() != 1 {
        return Err(AppError::Conflict {
            resource: "material".to_string(),
            message: format!(
                "Stock of material {} changed while it was being consumed",
                decrement.material_id
            ),
            message_pt: format!(
                "O estoque da matéria-prima {} mudou durante a baixa",
                decrement.material_id
            ),
        });
    }

    let entry = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
        r#"
        INSERT INTO material_usage_history (material_id, pedido_id, quantidade_utilizada, batch_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, data_utilizacao
        "#,
    )
    .bind(decrement.material_id)
    .bind(order_id)
    .bind(decrement.quantity)
    .bind(batch_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(UsageHistoryEntry {
        id: entry.0,
        material_id: decrement.material_id,
        pedido_id: order_id,
        quantidade_utilizada: decrement.quantity,
        batch_id,
        data_utilizacao: entry.1,
    })
}

type StockLevelRow = (i64, String, String, Decimal);

fn stock_levels(rows: Vec<StockLevelRow>) -> BTreeMap<i64, StockLevel> {
    rows.into_iter()
        .map(|(id, name, unit, quantity)| {
            let unit = UnitOfMeasure::parse(&unit).unwrap_or_default();
            (
                id,
                StockLevel {
                    material_id: id,
                    name,
                    unit: unit.display_name().to_string(),
                    quantity,
                },
            )
        })
        .collect()
}

/// Current quantities of `material_ids`, without locking
pub(crate) async fn read_stock_levels(
    conn: &mut PgConnection,
    material_ids: &[i64],
) -> AppResult<BTreeMap<i64, StockLevel>> {
    let rows = sqlx::query_as::<_, StockLevelRow>(
        "SELECT id, name, unidade_medida, quantity FROM materials WHERE id = ANY($1)",
    )
    .bind(material_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(stock_levels(rows))
}

fn check_quantities(
    quantity: Decimal,
    minimum_stock: Decimal,
    containers: &ContainerFactors,
) -> AppResult<()> {
    validate_stock_quantity(quantity)
        .map_err(|msg| AppError::validation("quantity", msg, "A quantidade não pode ser negativa"))?;
    validate_stock_quantity(minimum_stock).map_err(|msg| {
        AppError::validation("minimum_stock", msg, "O estoque mínimo não pode ser negativo")
    })?;
    validate_container_factors(containers).map_err(|msg| {
        AppError::validation(
            "containers",
            msg,
            "Quantidades de rolos, caixas ou tubos não podem ser negativas",
        )
    })
}

impl MaterialService {
    /// Create a new MaterialService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a material; container units derive their quantity
    pub async fn create_material(&self, input: CreateMaterialInput) -> AppResult<Material> {
        input.validate()?;
        validate_name(&input.name)
            .map_err(|msg| AppError::validation("name", msg, "O nome não pode ser vazio"))?;

        let unit = input.unidade_medida.unwrap_or_default();
        let minimum_stock = input.minimum_stock.unwrap_or(Decimal::ZERO);
        let quantity = resolve_quantity(
            unit,
            input.quantity.unwrap_or(Decimal::ZERO),
            &input.containers,
        );
        check_quantities(quantity, minimum_stock, &input.containers)?;

        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            INSERT INTO materials (
                name, tipo_produto, categoria_subtipo, cor, unidade_medida, quantity, local,
                minimum_stock, quantidade_rolos, metragem_por_rolo, quantidade_caixas,
                quantidade_por_caixa, quantidade_tubos, metros_por_tubo
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(input.name.trim())
        .bind(input.tipo_produto.as_deref().unwrap_or("TECIDO"))
        .bind(input.categoria_subtipo.as_deref().unwrap_or(""))
        .bind(input.cor.as_deref().unwrap_or(""))
        .bind(unit.as_str())
        .bind(quantity)
        .bind(input.local.unwrap_or_default().as_str())
        .bind(minimum_stock)
        .bind(input.containers.quantidade_rolos)
        .bind(input.containers.metragem_por_rolo)
        .bind(input.containers.quantidade_caixas)
        .bind(input.containers.quantidade_por_caixa)
        .bind(input.containers.quantidade_tubos)
        .bind(input.containers.metros_por_tubo)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(material_id = row.id, "Material created");
        Ok(row.into())
    }

    /// Get a material by ID
    pub async fn get_material(&self, material_id: i64) -> AppResult<Material> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?;

        Ok(row.into())
    }

    /// List materials ordered by name
    pub async fn list_materials(
        &self,
        filter: &MaterialFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Material>> {
        let unit = filter.unidade_medida.map(|u| u.as_str());
        let local = filter.local.map(|l| l.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM materials
            WHERE ($1::text IS NULL OR unidade_medida = $1)
              AND ($2::text IS NULL OR local = $2)
              AND ($3::text IS NULL OR tipo_produto = $3)
            "#,
        )
        .bind(unit)
        .bind(local)
        .bind(&filter.tipo_produto)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE ($1::text IS NULL OR unidade_medida = $1)
              AND ($2::text IS NULL OR local = $2)
              AND ($3::text IS NULL OR tipo_produto = $3)
            ORDER BY name
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(unit)
        .bind(local)
        .bind(&filter.tipo_produto)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter().map(Material::from).collect(),
            pagination,
            total.max(0) as u64,
        ))
    }

    /// Update a material. The quantity is re-derived from the container
    /// factors only when the update changes the unit or a factor, so stock
    /// consumed since the factors were set is kept.
    pub async fn update_material(
        &self,
        material_id: i64,
        input: UpdateMaterialInput,
    ) -> AppResult<Material> {
        input.validate()?;
        if let Some(name) = &input.name {
            validate_name(name)
                .map_err(|msg| AppError::validation("name", msg, "O nome não pode ser vazio"))?;
        }

        let mut tx = self.db.begin().await?;

        let existing: Material = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1 FOR UPDATE"
        ))
        .bind(material_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?
        .into();

        let unit = input.unidade_medida.unwrap_or(existing.unidade_medida);
        let containers = ContainerFactors {
            quantidade_rolos: input.quantidade_rolos.or(existing.containers.quantidade_rolos),
            metragem_por_rolo: input.metragem_por_rolo.or(existing.containers.metragem_por_rolo),
            quantidade_caixas: input.quantidade_caixas.or(existing.containers.quantidade_caixas),
            quantidade_por_caixa: input
                .quantidade_por_caixa
                .or(existing.containers.quantidade_por_caixa),
            quantidade_tubos: input.quantidade_tubos.or(existing.containers.quantidade_tubos),
            metros_por_tubo: input.metros_por_tubo.or(existing.containers.metros_por_tubo),
        };
        let quantity = input.quantity.unwrap_or(existing.quantity);
        let quantity = if input.touches_containers() {
            resolve_quantity(unit, quantity, &containers)
        } else {
            quantity
        };
        let minimum_stock = input.minimum_stock.unwrap_or(existing.minimum_stock);
        check_quantities(quantity, minimum_stock, &containers)?;

        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            UPDATE materials
            SET name = $1, tipo_produto = $2, categoria_subtipo = $3, cor = $4,
                unidade_medida = $5, quantity = $6, local = $7, minimum_stock = $8,
                quantidade_rolos = $9, metragem_por_rolo = $10, quantidade_caixas = $11,
                quantidade_por_caixa = $12, quantidade_tubos = $13, metros_por_tubo = $14,
                updated_at = NOW()
            WHERE id = $15
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(input.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(input.tipo_produto.as_ref().unwrap_or(&existing.tipo_produto))
        .bind(input.categoria_subtipo.as_ref().unwrap_or(&existing.categoria_subtipo))
        .bind(input.cor.as_ref().unwrap_or(&existing.cor))
        .bind(unit.as_str())
        .bind(quantity)
        .bind(input.local.unwrap_or(existing.local).as_str())
        .bind(minimum_stock)
        .bind(containers.quantidade_rolos)
        .bind(containers.metragem_por_rolo)
        .bind(containers.quantidade_caixas)
        .bind(containers.quantidade_por_caixa)
        .bind(containers.quantidade_tubos)
        .bind(containers.metros_por_tubo)
        .bind(material_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    /// Delete a material. Fails with a conflict while usage history refers
    /// to it.
    pub async fn delete_material(&self, material_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(material_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Material".to_string()));
        }

        tracing::info!(material_id, "Material deleted");
        Ok(())
    }

    /// Consume stock of one material, optionally attributing it to an order
    pub async fn use_material(
        &self,
        material_id: i64,
        input: UseMaterialInput,
    ) -> AppResult<Material> {
        validate_usage_quantity(input.quantidade_utilizada).map_err(|msg| {
            AppError::validation(
                "quantidade_utilizada",
                msg,
                "Quantidade utilizada deve ser maior que zero",
            )
        })?;

        let mut tx = self.db.begin().await?;

        let levels = lock_stock_levels(&mut tx, &[material_id]).await?;
        let level = levels
            .get(&material_id)
            .ok_or_else(|| AppError::NotFound("Material".to_string()))?;

        if level.quantity < input.quantidade_utilizada {
            return Err(AppError::InsufficientStock(vec![Shortfall {
                material_id,
                nome: level.name.clone(),
                necessario: input.quantidade_utilizada,
                disponivel: level.quantity,
                falta: input.quantidade_utilizada - level.quantity,
            }]));
        }

        // An unknown order is not attributed rather than rejected
        let order_id = match input.pedido_id {
            Some(order_id) => {
                sqlx::query_scalar::<_, i64>("SELECT id FROM sales_orders WHERE id = $1")
                    .bind(order_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        let decrement = StockDecrement {
            material_id,
            quantity: input.quantidade_utilizada,
            remaining: level.quantity - input.quantidade_utilizada,
        };
        decrement_stock(&mut tx, &decrement, order_id, Uuid::new_v4()).await?;

        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(material_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            material_id,
            quantity = %decrement.quantity,
            remaining = %decrement.remaining,
            "Material used"
        );
        Ok(row.into())
    }

    /// Materials at or below their minimum stock
    pub async fn list_low_stock(&self) -> AppResult<Vec<Material>> {
        let rows = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE quantity <= minimum_stock
            ORDER BY (quantity - minimum_stock), name
            "#
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    /// Distinct fabric colours, optionally limited to one sub-category
    pub async fn list_fabric_colors(&self, categoria_subtipo: Option<&str>) -> AppResult<Vec<String>> {
        let colors = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT cor FROM materials
            WHERE tipo_produto = 'TECIDO' AND cor <> ''
              AND ($1::text IS NULL OR categoria_subtipo = $1)
            ORDER BY cor
            "#,
        )
        .bind(categoria_subtipo)
        .fetch_all(&self.db)
        .await?;

        Ok(colors)
    }

    /// Distinct sub-categories of collar materials
    pub async fn list_collar_subtypes(&self) -> AppResult<Vec<String>> {
        let subtypes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT categoria_subtipo FROM materials
            WHERE tipo_produto = 'GOLAS' AND categoria_subtipo <> ''
            ORDER BY categoria_subtipo
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(subtypes)
    }
}

/// Map the fabric labels sent by clients onto stored sub-categories
pub fn fabric_subtype_label(code: &str) -> &str {
    match code {
        "MALHA_PV" => "Malha PV",
        "ALGODAO" => "Algodão",
        "DRY_FIT" => "Dry Fit",
        "VISCOLYCRA" => "Viscolycra",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::test_pool;

    #[test]
    fn test_fabric_subtype_label() {
        assert_eq!(fabric_subtype_label("MALHA_PV"), "Malha PV");
        assert_eq!(fabric_subtype_label("Oxford"), "Oxford");
    }

    #[test]
    fn test_plain_edits_do_not_touch_containers() {
        let input = UpdateMaterialInput {
            minimum_stock: Some(Decimal::from(5)),
            local: Some(StorageLocation::default()),
            ..Default::default()
        };
        assert!(!input.touches_containers());

        let input = UpdateMaterialInput {
            quantidade_rolos: Some(8),
            ..Default::default()
        };
        assert!(input.touches_containers());
    }

    #[test]
    fn test_stock_levels_use_display_unit() {
        let rows = vec![(7, "Ribana".to_string(), "ROLO".to_string(), Decimal::TEN)];
        let levels = stock_levels(rows);
        assert_eq!(levels[&7].unit, "Rolo");
        assert_eq!(levels[&7].quantity, Decimal::TEN);
    }

    #[tokio::test]
    async fn test_update_keeps_consumed_roll_stock() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let service = MaterialService::new(pool);
        let material = service
            .create_material(CreateMaterialInput {
                name: format!("Malha {}", Uuid::new_v4()),
                tipo_produto: None,
                categoria_subtipo: None,
                cor: None,
                unidade_medida: Some(UnitOfMeasure::Rolo),
                quantity: None,
                local: None,
                minimum_stock: None,
                containers: ContainerFactors {
                    quantidade_rolos: Some(10),
                    metragem_por_rolo: Some(Decimal::TEN),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(material.quantity, Decimal::from(100));

        let used = service
            .use_material(
                material.id,
                UseMaterialInput {
                    quantidade_utilizada: Decimal::from(25),
                    pedido_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(used.quantity, Decimal::from(75));

        let edited = service
            .update_material(
                material.id,
                UpdateMaterialInput {
                    minimum_stock: Some(Decimal::from(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.quantity, Decimal::from(75));
        assert_eq!(edited.minimum_stock, Decimal::from(5));

        let recounted = service
            .update_material(
                material.id,
                UpdateMaterialInput {
                    quantidade_rolos: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recounted.quantity, Decimal::from(80));
    }

    #[test]
    fn test_check_quantities_rejects_negative_stock() {
        let err = check_quantities(Decimal::from(-1), Decimal::ZERO, &ContainerFactors::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
    }
}
