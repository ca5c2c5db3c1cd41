//! Stock sufficiency decisions for consuming an order's materials
//!
//! The backend locks the affected inventory rows and hands their current
//! levels to [`plan_decrements`], which either approves the whole set of
//! decrements or rejects it. Nothing is partially approved.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::{MaterialAvailability, RequirementEntry};

/// Current level of one locked inventory row
#[derive(Debug, Clone, PartialEq)]
pub struct StockLevel {
    pub material_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
}

/// A material that cannot cover its requirement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shortfall {
    pub material_id: i64,
    pub nome: String,
    pub necessario: Decimal,
    pub disponivel: Decimal,
    pub falta: Decimal,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "insufficient stock for {}: need {}, have {}, missing {}",
            self.nome, self.necessario, self.disponivel, self.falta
        )
    }
}

/// One approved decrement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockDecrement {
    pub material_id: i64,
    pub quantity: Decimal,
    pub remaining: Decimal,
}

/// Why a set of decrements was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StockCommitError {
    #[error("materials not found: {0:?}")]
    MaterialNotFound(Vec<i64>),

    #[error("{}", describe_shortfalls(.0))]
    InsufficientStock(Vec<Shortfall>),
}

fn describe_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sum requirements per material, dropping non-positive quantities
pub fn required_totals(requirements: &[RequirementEntry]) -> BTreeMap<i64, Decimal> {
    let mut totals: BTreeMap<i64, Decimal> = BTreeMap::new();
    for entry in requirements {
        if entry.quantidade <= Decimal::ZERO {
            continue;
        }
        *totals.entry(entry.material_id).or_insert(Decimal::ZERO) += entry.quantidade;
    }
    totals
}

/// Material ids in the order their rows must be locked.
///
/// Ascending id order is shared by every caller so that two commits touching
/// overlapping materials cannot deadlock.
pub fn lock_order(requirements: &[RequirementEntry]) -> Vec<i64> {
    required_totals(requirements).into_keys().collect()
}

/// Decide the decrements for `requirements` against locked `stock` levels.
///
/// Missing materials take precedence over shortages. On success every
/// required material gets exactly one decrement and no remaining quantity is
/// negative.
pub fn plan_decrements(
    requirements: &[RequirementEntry],
    stock: &BTreeMap<i64, StockLevel>,
) -> Result<Vec<StockDecrement>, StockCommitError> {
    let totals = required_totals(requirements);

    let missing: Vec<i64> = totals
        .keys()
        .filter(|id| !stock.contains_key(id))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(StockCommitError::MaterialNotFound(missing));
    }

    let mut decrements = Vec::with_capacity(totals.len());
    let mut shortfalls = Vec::new();
    for (material_id, required) in totals {
        let Some(level) = stock.get(&material_id) else {
            continue;
        };
        if level.quantity < required {
            shortfalls.push(Shortfall {
                material_id,
                nome: level.name.clone(),
                necessario: required,
                disponivel: level.quantity,
                falta: required - level.quantity,
            });
        } else {
            decrements.push(StockDecrement {
                material_id,
                quantity: required,
                remaining: level.quantity - required,
            });
        }
    }

    if !shortfalls.is_empty() {
        return Err(StockCommitError::InsufficientStock(shortfalls));
    }
    Ok(decrements)
}

/// Required vs. available stock per required material.
///
/// Materials absent from `stock` are reported with zero availability.
pub fn availability(
    requirements: &[RequirementEntry],
    stock: &BTreeMap<i64, StockLevel>,
) -> Vec<MaterialAvailability> {
    requirements
        .iter()
        .map(|entry| {
            let available = stock
                .get(&entry.material_id)
                .map(|level| level.quantity)
                .unwrap_or(Decimal::ZERO);
            MaterialAvailability {
                material_id: entry.material_id,
                nome: entry.nome.clone(),
                unidade: entry.unidade.clone(),
                quantidade_necessaria: entry.quantidade,
                quantidade_disponivel: available,
                suficiente: available >= entry.quantidade,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(material_id: i64, qty: Decimal) -> RequirementEntry {
        RequirementEntry {
            material_id,
            nome: format!("Material {}", material_id),
            quantidade: qty,
            unidade: "Metro".to_string(),
        }
    }

    fn stock(levels: &[(i64, Decimal)]) -> BTreeMap<i64, StockLevel> {
        levels
            .iter()
            .map(|(id, qty)| {
                (
                    *id,
                    StockLevel {
                        material_id: *id,
                        name: format!("Material {}", id),
                        unit: "Metro".to_string(),
                        quantity: *qty,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_plan_succeeds_with_enough_stock() {
        let plan = plan_decrements(
            &[requirement(1, Decimal::from(25))],
            &stock(&[(1, Decimal::from(30))]),
        )
        .unwrap();
        assert_eq!(
            plan,
            vec![StockDecrement {
                material_id: 1,
                quantity: Decimal::from(25),
                remaining: Decimal::from(5),
            }]
        );
    }

    #[test]
    fn test_plan_reports_shortfall() {
        let err = plan_decrements(
            &[requirement(1, Decimal::from(25))],
            &stock(&[(1, Decimal::from(10))]),
        )
        .unwrap_err();
        match err {
            StockCommitError::InsufficientStock(shortfalls) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].falta, Decimal::from(15));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plan_rejects_all_when_one_material_short() {
        let err = plan_decrements(
            &[requirement(1, Decimal::from(5)), requirement(2, Decimal::from(9))],
            &stock(&[(1, Decimal::from(50)), (2, Decimal::from(8))]),
        )
        .unwrap_err();
        assert!(matches!(err, StockCommitError::InsufficientStock(ref s) if s.len() == 1 && s[0].material_id == 2));
    }

    #[test]
    fn test_plan_rejects_missing_material() {
        let err = plan_decrements(
            &[requirement(1, Decimal::from(5)), requirement(3, Decimal::from(1))],
            &stock(&[(1, Decimal::from(2))]),
        )
        .unwrap_err();
        assert_eq!(err, StockCommitError::MaterialNotFound(vec![3]));
    }

    #[test]
    fn test_exact_stock_is_sufficient() {
        let plan = plan_decrements(
            &[requirement(1, Decimal::new(12125, 3))],
            &stock(&[(1, Decimal::new(12125, 3))]),
        )
        .unwrap();
        assert_eq!(plan[0].remaining, Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_requirements_are_summed() {
        let err = plan_decrements(
            &[requirement(1, Decimal::from(6)), requirement(1, Decimal::from(6))],
            &stock(&[(1, Decimal::from(10))]),
        )
        .unwrap_err();
        assert!(matches!(err, StockCommitError::InsufficientStock(ref s) if s[0].necessario == Decimal::from(12)));
    }

    #[test]
    fn test_zero_quantities_need_no_stock() {
        let plan = plan_decrements(&[requirement(4, Decimal::ZERO)], &BTreeMap::new()).unwrap();
        assert!(plan.is_empty());
        assert!(lock_order(&[requirement(4, Decimal::ZERO)]).is_empty());
    }

    #[test]
    fn test_lock_order_is_ascending() {
        let ids = lock_order(&[
            requirement(9, Decimal::ONE),
            requirement(2, Decimal::ONE),
            requirement(5, Decimal::ONE),
            requirement(2, Decimal::ONE),
        ]);
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_availability_flags() {
        let report = availability(
            &[requirement(1, Decimal::from(5)), requirement(2, Decimal::from(5))],
            &stock(&[(1, Decimal::from(5))]),
        );
        assert!(report[0].suficiente);
        assert!(!report[1].suficiente);
        assert_eq!(report[1].quantidade_disponivel, Decimal::ZERO);
    }

    #[test]
    fn test_shortfall_message() {
        let err = StockCommitError::InsufficientStock(vec![Shortfall {
            material_id: 1,
            nome: "Fabric A".to_string(),
            necessario: Decimal::from(25),
            disponivel: Decimal::from(10),
            falta: Decimal::from(15),
        }]);
        assert_eq!(
            err.to_string(),
            "insufficient stock for Fabric A: need 25, have 10, missing 15"
        );
    }
}
