//! Raw material (matéria-prima) models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit of measure for a raw material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitOfMeasure {
    Metro,
    #[default]
    Unidade,
    Grama,
    Rolo,
    Caixa,
    Litro,
    Tubo,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Metro => "METRO",
            UnitOfMeasure::Unidade => "UNIDADE",
            UnitOfMeasure::Grama => "GRAMA",
            UnitOfMeasure::Rolo => "ROLO",
            UnitOfMeasure::Caixa => "CAIXA",
            UnitOfMeasure::Litro => "LITRO",
            UnitOfMeasure::Tubo => "TUBO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "METRO" => Some(UnitOfMeasure::Metro),
            "UNIDADE" => Some(UnitOfMeasure::Unidade),
            "GRAMA" => Some(UnitOfMeasure::Grama),
            "ROLO" => Some(UnitOfMeasure::Rolo),
            "CAIXA" => Some(UnitOfMeasure::Caixa),
            "LITRO" => Some(UnitOfMeasure::Litro),
            "TUBO" => Some(UnitOfMeasure::Tubo),
            _ => None,
        }
    }

    /// Human readable name, used in requirement entries
    pub fn display_name(&self) -> &'static str {
        match self {
            UnitOfMeasure::Metro => "Metro",
            UnitOfMeasure::Unidade => "Unidade",
            UnitOfMeasure::Grama => "Grama",
            UnitOfMeasure::Rolo => "Rolo",
            UnitOfMeasure::Caixa => "Caixa",
            UnitOfMeasure::Litro => "Litro",
            UnitOfMeasure::Tubo => "Tubo",
        }
    }

    /// Display unit for reports. Container units are reported in the unit
    /// their derived quantity is measured in.
    pub fn report_display(&self) -> &'static str {
        match self {
            UnitOfMeasure::Rolo | UnitOfMeasure::Tubo => UnitOfMeasure::Metro.display_name(),
            UnitOfMeasure::Caixa => UnitOfMeasure::Unidade.display_name(),
            other => other.display_name(),
        }
    }

    /// Roll, box and tube stock is counted in containers
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            UnitOfMeasure::Rolo | UnitOfMeasure::Caixa | UnitOfMeasure::Tubo
        )
    }
}

impl std::fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where a material is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageLocation {
    #[default]
    Almoxarifado,
    Mezanino,
    Producao,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::Almoxarifado => "ALMOXARIFADO",
            StorageLocation::Mezanino => "MEZANINO",
            StorageLocation::Producao => "PRODUCAO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALMOXARIFADO" => Some(StorageLocation::Almoxarifado),
            "MEZANINO" => Some(StorageLocation::Mezanino),
            "PRODUCAO" => Some(StorageLocation::Producao),
            _ => None,
        }
    }
}

/// Container factors for roll, box and tube materials.
///
/// Only the pair matching the material's unit is meaningful; the others are
/// kept as stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerFactors {
    pub quantidade_rolos: Option<i32>,
    pub metragem_por_rolo: Option<Decimal>,
    pub quantidade_caixas: Option<i32>,
    pub quantidade_por_caixa: Option<i32>,
    pub quantidade_tubos: Option<i32>,
    pub metros_por_tubo: Option<Decimal>,
}

impl ContainerFactors {
    /// On-hand quantity implied by the container factors for `unit`, if both
    /// factors for that unit are set
    pub fn derived_quantity(&self, unit: UnitOfMeasure) -> Option<Decimal> {
        match unit {
            UnitOfMeasure::Rolo => Some(
                Decimal::from(self.quantidade_rolos?) * self.metragem_por_rolo?,
            ),
            UnitOfMeasure::Caixa => Some(
                Decimal::from(self.quantidade_caixas?) * Decimal::from(self.quantidade_por_caixa?),
            ),
            UnitOfMeasure::Tubo => Some(
                Decimal::from(self.quantidade_tubos?) * self.metros_por_tubo?,
            ),
            _ => None,
        }
    }

    /// Number of containers held for `unit`
    pub fn container_count(&self, unit: UnitOfMeasure) -> Option<i32> {
        match unit {
            UnitOfMeasure::Rolo => self.quantidade_rolos,
            UnitOfMeasure::Caixa => self.quantidade_caixas,
            UnitOfMeasure::Tubo => self.quantidade_tubos,
            _ => None,
        }
    }
}

/// Resolve the on-hand quantity to store: container units with both factors
/// set always use the derived value, everything else keeps `quantity`.
pub fn resolve_quantity(
    unit: UnitOfMeasure,
    quantity: Decimal,
    factors: &ContainerFactors,
) -> Decimal {
    factors.derived_quantity(unit).unwrap_or(quantity)
}

/// A raw material held in stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub tipo_produto: String,
    pub categoria_subtipo: String,
    pub cor: String,
    pub unidade_medida: UnitOfMeasure,
    /// On-hand quantity; derived from container factors for roll/box/tube
    pub quantity: Decimal,
    pub local: StorageLocation,
    pub minimum_stock: Decimal,
    #[serde(flatten)]
    pub containers: ContainerFactors,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    pub fn is_below_minimum(&self) -> bool {
        self.quantity <= self.minimum_stock
    }
}

impl std::fmt::Display for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .containers
            .container_count(self.unidade_medida)
            .unwrap_or(0);
        match self.unidade_medida {
            UnitOfMeasure::Rolo => write!(f, "{} ({} M em {} rolos)", self.name, self.quantity, count),
            UnitOfMeasure::Caixa => {
                write!(f, "{} ({} Unidades em {} caixas)", self.name, self.quantity, count)
            }
            UnitOfMeasure::Tubo => write!(f, "{} ({} M em {} tubos)", self.name, self.quantity, count),
            unit => write!(f, "{} ({} {})", self.name, self.quantity, unit),
        }
    }
}
