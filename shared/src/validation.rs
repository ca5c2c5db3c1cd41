//! Validation utilities for the garment MRP platform

use rust_decimal::Decimal;

use crate::models::{ContainerFactors, UnitOfMeasure};

/// Maximum decimal places stored for quantities
pub const QUANTITY_SCALE: u32 = 3;

// ============================================================================
// Inventory Validations
// ============================================================================

/// Validate a BOM consumption value: strictly positive, at most 3 decimals
pub fn validate_bom_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("BOM quantity must be greater than zero");
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("BOM quantity supports at most 3 decimal places");
    }
    Ok(())
}

/// Validate an on-hand stock quantity
pub fn validate_stock_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Stock quantity cannot be negative");
    }
    Ok(())
}

/// Validate a manual usage quantity
pub fn validate_usage_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Used quantity must be greater than zero");
    }
    Ok(())
}

/// Validate container factors: counts and per-container amounts cannot be
/// negative
pub fn validate_container_factors(factors: &ContainerFactors) -> Result<(), &'static str> {
    let counts = [
        factors.quantidade_rolos,
        factors.quantidade_caixas,
        factors.quantidade_por_caixa,
        factors.quantidade_tubos,
    ];
    if counts.iter().flatten().any(|c| *c < 0) {
        return Err("Container counts cannot be negative");
    }

    let amounts = [factors.metragem_por_rolo, factors.metros_por_tubo];
    if amounts.iter().flatten().any(|a| *a < Decimal::ZERO) {
        return Err("Amount per container cannot be negative");
    }
    Ok(())
}

/// Whether the unit keeps its quantity in container factors
pub fn uses_container_factors(unit: UnitOfMeasure, factors: &ContainerFactors) -> bool {
    unit.is_container() && factors.derived_quantity(unit).is_some()
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate a required display name
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty");
    }
    if trimmed.chars().count() > 255 {
        return Err("Name must be at most 255 characters");
    }
    Ok(())
}
