//! Material requirement models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quantity of one material needed by an order line or an order.
///
/// This is the persisted/wire shape of a requirement and its field names are
/// relied upon by existing consumers. `quantidade` travels as a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementEntry {
    pub material_id: i64,
    pub nome: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantidade: Decimal,
    #[serde(default)]
    pub unidade: String,
}

/// Required vs. available stock for one material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAvailability {
    pub material_id: i64,
    pub nome: String,
    pub unidade: String,
    pub quantidade_necessaria: Decimal,
    pub quantidade_disponivel: Decimal,
    pub suficiente: bool,
}

/// An immutable record of stock consumed from one material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageHistoryEntry {
    pub id: i64,
    pub material_id: i64,
    pub pedido_id: Option<i64>,
    pub quantidade_utilizada: Decimal,
    /// Groups the entries written by one commit or one manual usage
    pub batch_id: Uuid,
    pub data_utilizacao: DateTime<Utc>,
}
