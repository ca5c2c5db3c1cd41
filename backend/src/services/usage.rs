//! Material usage history: listing and CSV export

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Pagination, PaginatedResponse, UnitOfMeasure};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Usage history service
#[derive(Clone)]
pub struct UsageHistoryService {
    db: PgPool,
}

/// A usage-history entry joined with its material
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UsageRecord {
    pub id: i64,
    pub material_id: i64,
    pub material_nome: String,
    pub unidade_medida: String,
    pub pedido_id: Option<i64>,
    pub quantidade_utilizada: Decimal,
    pub batch_id: Uuid,
    pub data_utilizacao: DateTime<Utc>,
}

impl UsageRecord {
    /// Containers are reported in the unit their quantity is measured in
    fn with_report_unit(mut self) -> Self {
        if let Some(unit) = UnitOfMeasure::parse(&self.unidade_medida) {
            self.unidade_medida = unit.report_display().to_string();
        }
        self
    }
}

/// Filters for the usage history
#[derive(Debug, Default, Deserialize)]
pub struct UsageFilter {
    pub material_id: Option<i64>,
    pub pedido_id: Option<i64>,
    pub batch_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

const USAGE_SELECT: &str = r#"
    SELECT h.id, h.material_id, m.name AS material_nome, m.unidade_medida, h.pedido_id,
           h.quantidade_utilizada, h.batch_id, h.data_utilizacao
    FROM material_usage_history h
    JOIN materials m ON m.id = h.material_id
"#;

const USAGE_FILTER: &str = r#"
    WHERE ($1::bigint IS NULL OR h.material_id = $1)
      AND ($2::bigint IS NULL OR h.pedido_id = $2)
      AND ($3::uuid IS NULL OR h.batch_id = $3)
      AND ($4::date IS NULL OR h.data_utilizacao::date >= $4)
      AND ($5::date IS NULL OR h.data_utilizacao::date <= $5)
"#;

impl UsageHistoryService {
    /// Create a new UsageHistoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List usage history, newest first
    pub async fn list_usage(
        &self,
        filter: &UsageFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<UsageRecord>> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM material_usage_history h {USAGE_FILTER}"
        ))
        .bind(filter.material_id)
        .bind(filter.pedido_id)
        .bind(filter.batch_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let records = sqlx::query_as::<_, UsageRecord>(&format!(
            "{USAGE_SELECT} {USAGE_FILTER} ORDER BY h.data_utilizacao DESC, h.id DESC LIMIT $6 OFFSET $7"
        ))
        .bind(filter.material_id)
        .bind(filter.pedido_id)
        .bind(filter.batch_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            records.into_iter().map(UsageRecord::with_report_unit).collect(),
            pagination,
            total.max(0) as u64,
        ))
    }

    /// Get one usage-history entry
    pub async fn get_usage(&self, usage_id: i64) -> AppResult<UsageRecord> {
        let record = sqlx::query_as::<_, UsageRecord>(&format!("{USAGE_SELECT} WHERE h.id = $1"))
            .bind(usage_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Usage record".to_string()))?;

        Ok(record.with_report_unit())
    }

    /// Every entry matching `filter`, for export
    pub async fn export_usage(&self, filter: &UsageFilter) -> AppResult<Vec<UsageRecord>> {
        let records = sqlx::query_as::<_, UsageRecord>(&format!(
            "{USAGE_SELECT} {USAGE_FILTER} ORDER BY h.data_utilizacao DESC, h.id DESC"
        ))
        .bind(filter.material_id)
        .bind(filter.pedido_id)
        .bind(filter.batch_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.db)
        .await?;

        Ok(records.into_iter().map(UsageRecord::with_report_unit).collect())
    }

    /// Export data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(unit: &str) -> UsageRecord {
        UsageRecord {
            id: 1,
            material_id: 7,
            material_nome: "Malha PV Azul".to_string(),
            unidade_medida: unit.to_string(),
            pedido_id: Some(3),
            quantidade_utilizada: Decimal::new(12125, 3),
            batch_id: Uuid::nil(),
            data_utilizacao: Utc::now(),
        }
    }

    #[test]
    fn test_containers_report_in_measured_unit() {
        assert_eq!(record("ROLO").with_report_unit().unidade_medida, "Metro");
        assert_eq!(record("CAIXA").with_report_unit().unidade_medida, "Unidade");
        assert_eq!(record("GRAMA").with_report_unit().unidade_medida, "Grama");
    }

    #[test]
    fn test_export_to_csv_has_header_and_rows() {
        let csv = UsageHistoryService::export_to_csv(&[record("METRO")]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,material_id,material_nome,unidade_medida,pedido_id,quantidade_utilizada,batch_id,data_utilizacao")
        );
        assert!(lines.next().unwrap().starts_with("1,7,Malha PV Azul,METRO,3,12.125,"));
    }
}
