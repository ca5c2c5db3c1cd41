//! Product models and bill-of-materials (ficha técnica) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UnitOfMeasure;

/// Garment family a product model belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductFamily {
    #[default]
    Camisa,
    Calca,
}

impl ProductFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductFamily::Camisa => "CAMISA",
            ProductFamily::Calca => "CALCA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CAMISA" => Some(ProductFamily::Camisa),
            "CALCA" => Some(ProductFamily::Calca),
            _ => None,
        }
    }
}

/// Garment size code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Size {
    P,
    M,
    G,
    GG,
    XG,
}

impl Size {
    pub const ALL: [Size; 5] = [Size::P, Size::M, Size::G, Size::GG, Size::XG];

    pub fn as_str(&self) -> &'static str {
        match self {
            Size::P => "P",
            Size::M => "M",
            Size::G => "G",
            Size::GG => "GG",
            Size::XG => "XG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "P" => Some(Size::P),
            "M" => Some(Size::M),
            "G" => Some(Size::G),
            "GG" => Some(Size::GG),
            "XG" => Some(Size::XG),
            _ => None,
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product model (modelo de produto) whose BOM drives material requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductModel {
    pub id: i64,
    pub nome: String,
    pub tipo: ProductFamily,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Consumption of one material per produced unit of (model, size)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomEntry {
    pub id: i64,
    pub modelo_id: i64,
    pub tamanho: Size,
    pub material_id: i64,
    /// Always > 0
    pub quantidade: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One BOM row joined with the material it consumes, as the expander needs it
#[derive(Debug, Clone, PartialEq)]
pub struct BomLine {
    pub material_id: i64,
    pub material_name: String,
    pub unit: UnitOfMeasure,
    pub quantity_per_unit: Decimal,
}
