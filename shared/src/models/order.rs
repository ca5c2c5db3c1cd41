//! Sales order (pedido de venda) and order line models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ProductFamily, RequirementEntry};

/// Workflow status of a sales order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pendente,
    Aprovado,
    Rejeitado,
    Concluido,
    Cancelado,
    Producao,
    Estoque,
    Corte,
    Estamparia,
    Bordado,
    Costura,
    Acabamento,
    Embalagem,
    MateriaisConfirmados,
    MateriaisIncompletos,
}

impl OrderStatus {
    /// The status whose arrival consumes the order's materials from stock
    pub const MATERIALS_CONFIRMED: OrderStatus = OrderStatus::MateriaisConfirmados;

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pendente => "PENDENTE",
            OrderStatus::Aprovado => "APROVADO",
            OrderStatus::Rejeitado => "REJEITADO",
            OrderStatus::Concluido => "CONCLUIDO",
            OrderStatus::Cancelado => "CANCELADO",
            OrderStatus::Producao => "PRODUCAO",
            OrderStatus::Estoque => "ESTOQUE",
            OrderStatus::Corte => "CORTE",
            OrderStatus::Estamparia => "ESTAMPARIA",
            OrderStatus::Bordado => "BORDADO",
            OrderStatus::Costura => "COSTURA",
            OrderStatus::Acabamento => "ACABAMENTO",
            OrderStatus::Embalagem => "EMBALAGEM",
            OrderStatus::MateriaisConfirmados => "MATERIAIS_CONFIRMADOS",
            OrderStatus::MateriaisIncompletos => "MATERIAIS_INCOMPLETOS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDENTE" => Some(OrderStatus::Pendente),
            "APROVADO" => Some(OrderStatus::Aprovado),
            "REJEITADO" => Some(OrderStatus::Rejeitado),
            "CONCLUIDO" => Some(OrderStatus::Concluido),
            "CANCELADO" => Some(OrderStatus::Cancelado),
            "PRODUCAO" => Some(OrderStatus::Producao),
            "ESTOQUE" => Some(OrderStatus::Estoque),
            "CORTE" => Some(OrderStatus::Corte),
            "ESTAMPARIA" => Some(OrderStatus::Estamparia),
            "BORDADO" => Some(OrderStatus::Bordado),
            "COSTURA" => Some(OrderStatus::Costura),
            "ACABAMENTO" => Some(OrderStatus::Acabamento),
            "EMBALAGEM" => Some(OrderStatus::Embalagem),
            "MATERIAIS_CONFIRMADOS" => Some(OrderStatus::MateriaisConfirmados),
            "MATERIAIS_INCOMPLETOS" => Some(OrderStatus::MateriaisIncompletos),
            _ => None,
        }
    }
}

/// Order priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[default]
    Normal,
    Urgente,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "NORMAL",
            Priority::Urgente => "URGENTE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(Priority::Normal),
            "URGENTE" => Some(Priority::Urgente),
            _ => None,
        }
    }
}

/// One-way latch guarding the stock commit of an order.
///
/// `Uncommitted -> Committed` is the only transition; `Committed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialsLatch {
    #[default]
    Uncommitted,
    Committed,
}

impl MaterialsLatch {
    pub fn from_flag(materials_committed: bool) -> Self {
        if materials_committed {
            MaterialsLatch::Committed
        } else {
            MaterialsLatch::Uncommitted
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, MaterialsLatch::Committed)
    }

    /// Whether a stock commit may run for an order in `status`
    pub fn permits_commit(&self, status: OrderStatus) -> bool {
        !self.is_committed() && status == OrderStatus::MATERIALS_CONFIRMED
    }

    /// Flip the latch. Returns `false` when it was already committed.
    pub fn latch(&mut self) -> bool {
        match self {
            MaterialsLatch::Uncommitted => {
                *self = MaterialsLatch::Committed;
                true
            }
            MaterialsLatch::Committed => false,
        }
    }
}

/// A sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: i64,
    pub cliente: String,
    pub data_pedido: DateTime<Utc>,
    pub prazo: Option<NaiveDate>,
    pub prioridade: Priority,
    pub quantidade_pecas: i32,
    pub valor_total: Option<Decimal>,
    pub status: OrderStatus,
    pub em_espera: bool,
    pub materiais_baixados: bool,
    /// Denormalized sum of the lines' requirement lists
    pub materiais_necessarios: Vec<RequirementEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    pub fn latch(&self) -> MaterialsLatch {
        MaterialsLatch::from_flag(self.materiais_baixados)
    }
}

/// A line of a sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub pedido_id: i64,
    pub tipo: ProductFamily,
    pub modelo_base: Option<i64>,
    pub modelo: String,
    pub gola: Option<String>,
    pub manga: Option<String>,
    pub corpo_frente: Option<String>,
    pub corpo_costa: Option<String>,
    pub bordado: Option<String>,
    /// Size code -> ordered count, as submitted
    pub tamanhos: serde_json::Map<String, serde_json::Value>,
    /// Denormalized expansion of (modelo_base, tamanhos) against the BOM
    pub materiais: Vec<RequirementEntry>,
    pub descricao: Option<String>,
    pub preco_unitario: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_permits_only_confirmed_status() {
        let latch = MaterialsLatch::Uncommitted;
        assert!(latch.permits_commit(OrderStatus::MateriaisConfirmados));
        assert!(!latch.permits_commit(OrderStatus::Aprovado));
        assert!(!latch.permits_commit(OrderStatus::MateriaisIncompletos));
    }

    #[test]
    fn test_latch_is_one_way() {
        let mut latch = MaterialsLatch::Uncommitted;
        assert!(latch.latch());
        assert!(latch.is_committed());
        assert!(!latch.latch());
        assert!(!latch.permits_commit(OrderStatus::MateriaisConfirmados));
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for s in ["PENDENTE", "CORTE", "MATERIAIS_CONFIRMADOS", "MATERIAIS_INCOMPLETOS"] {
            assert_eq!(OrderStatus::parse(s).map(|st| st.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("materiais_confirmados"), None);
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::MateriaisConfirmados).unwrap();
        assert_eq!(json, "\"MATERIAIS_CONFIRMADOS\"");
    }
}
