//! Stock commit tests
//!
//! Tests for the decision half of the stock commit including:
//! - All-or-nothing approval of decrements
//! - Stock never planned below zero
//! - The latch refusing a second commit
//! - Deterministic lock order

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    availability, lock_order, plan_decrements, required_totals, MaterialsLatch, OrderStatus,
    RequirementEntry, StockCommitError, StockDecrement, StockLevel,
};
use std::collections::BTreeMap;
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn requirement(material_id: i64, quantity: Decimal) -> RequirementEntry {
    RequirementEntry {
        material_id,
        nome: format!("Material {}", material_id),
        quantidade: quantity,
        unidade: "Metro".to_string(),
    }
}

fn stock(levels: &[(i64, Decimal)]) -> BTreeMap<i64, StockLevel> {
    levels
        .iter()
        .map(|(id, quantity)| {
            (
                *id,
                StockLevel {
                    material_id: *id,
                    name: format!("Material {}", id),
                    unit: "Metro".to_string(),
                    quantity: *quantity,
                },
            )
        })
        .collect()
}

/// Apply approved decrements to an in-memory inventory
fn apply(inventory: &mut BTreeMap<i64, StockLevel>, decrements: &[StockDecrement]) {
    for decrement in decrements {
        if let Some(level) = inventory.get_mut(&decrement.material_id) {
            level.quantity -= decrement.quantity;
        }
    }
}

/// Commit driven through the latch, the way the service runs it
fn commit(
    latch: &mut MaterialsLatch,
    status: OrderStatus,
    requirements: &[RequirementEntry],
    inventory: &mut BTreeMap<i64, StockLevel>,
) -> Result<Option<Vec<StockDecrement>>, StockCommitError> {
    if !latch.permits_commit(status) {
        return Ok(None);
    }
    let decrements = plan_decrements(requirements, inventory)?;
    apply(inventory, &decrements);
    latch.latch();
    Ok(Some(decrements))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    const FABRIC_A: i64 = 1;
    const FABRIC_B: i64 = 2;

    /// 10.0 on hand, 25.0 required: rejected with a 15.0 shortfall
    #[test]
    fn test_insufficient_stock_example() {
        let requirements = vec![requirement(FABRIC_A, dec("25.0"))];
        let mut inventory = stock(&[(FABRIC_A, dec("10.0"))]);
        let mut latch = MaterialsLatch::Uncommitted;

        let result = commit(
            &mut latch,
            OrderStatus::MateriaisConfirmados,
            &requirements,
            &mut inventory,
        );

        match result {
            Err(StockCommitError::InsufficientStock(shortfalls)) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].material_id, FABRIC_A);
                assert_eq!(shortfalls[0].falta, dec("15.0"));
                assert_eq!(
                    shortfalls[0].to_string(),
                    "insufficient stock for Material 1: need 25.0, have 10.0, missing 15.0"
                );
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
        assert_eq!(inventory[&FABRIC_A].quantity, dec("10.0"));
        assert!(!latch.is_committed());
    }

    /// 30.0 on hand, 25.0 required: 5.0 left, second commit does nothing
    #[test]
    fn test_successful_commit_example() {
        let requirements = vec![requirement(FABRIC_A, dec("25.0"))];
        let mut inventory = stock(&[(FABRIC_A, dec("30.0"))]);
        let mut latch = MaterialsLatch::Uncommitted;

        let first = commit(
            &mut latch,
            OrderStatus::MateriaisConfirmados,
            &requirements,
            &mut inventory,
        )
        .unwrap()
        .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].quantity, dec("25.0"));
        assert_eq!(first[0].remaining, dec("5.0"));
        assert_eq!(inventory[&FABRIC_A].quantity, dec("5.0"));
        assert!(latch.is_committed());

        let second = commit(
            &mut latch,
            OrderStatus::MateriaisConfirmados,
            &requirements,
            &mut inventory,
        )
        .unwrap();
        assert!(second.is_none());
        assert_eq!(inventory[&FABRIC_A].quantity, dec("5.0"));
    }

    /// One short material rejects every decrement
    #[test]
    fn test_partial_shortage_rejects_all() {
        let requirements = vec![
            requirement(FABRIC_A, dec("5.0")),
            requirement(FABRIC_B, dec("50.0")),
        ];
        let inventory = stock(&[(FABRIC_A, dec("100.0")), (FABRIC_B, dec("49.999"))]);

        let err = plan_decrements(&requirements, &inventory).unwrap_err();
        match err {
            StockCommitError::InsufficientStock(shortfalls) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].material_id, FABRIC_B);
                assert_eq!(shortfalls[0].falta, dec("0.001"));
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
    }

    /// Every short material is reported
    #[test]
    fn test_all_shortfalls_reported() {
        let requirements = vec![
            requirement(FABRIC_A, dec("5.0")),
            requirement(FABRIC_B, dec("50.0")),
        ];
        let inventory = stock(&[(FABRIC_A, dec("1.0")), (FABRIC_B, dec("2.0"))]);

        match plan_decrements(&requirements, &inventory) {
            Err(StockCommitError::InsufficientStock(shortfalls)) => {
                assert_eq!(shortfalls.len(), 2)
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }
    }

    /// A material that does not exist aborts the commit
    #[test]
    fn test_missing_material_is_fatal() {
        let requirements = vec![
            requirement(FABRIC_A, dec("1.0")),
            requirement(99, dec("1.0")),
        ];
        let inventory = stock(&[(FABRIC_A, dec("10.0"))]);

        assert_eq!(
            plan_decrements(&requirements, &inventory),
            Err(StockCommitError::MaterialNotFound(vec![99]))
        );
    }

    /// Exact stock is sufficient and leaves zero
    #[test]
    fn test_exact_stock_is_sufficient() {
        let requirements = vec![requirement(FABRIC_A, dec("12.125"))];
        let inventory = stock(&[(FABRIC_A, dec("12.125"))]);

        let plan = plan_decrements(&requirements, &inventory).unwrap();
        assert_eq!(plan[0].remaining, Decimal::ZERO);
    }

    /// Commits only run in the materials-confirmed status
    #[test]
    fn test_other_status_is_noop() {
        let requirements = vec![requirement(FABRIC_A, dec("1.0"))];
        let mut inventory = stock(&[(FABRIC_A, dec("10.0"))]);
        let mut latch = MaterialsLatch::Uncommitted;

        for status in [OrderStatus::Pendente, OrderStatus::Aprovado, OrderStatus::Producao] {
            let result = commit(&mut latch, status, &requirements, &mut inventory).unwrap();
            assert!(result.is_none());
        }
        assert_eq!(inventory[&FABRIC_A].quantity, dec("10.0"));
        assert!(!latch.is_committed());
    }

    /// Duplicate entries for one material are summed before checking
    #[test]
    fn test_duplicate_entries_are_summed() {
        let requirements = vec![
            requirement(FABRIC_A, dec("6.0")),
            requirement(FABRIC_A, dec("6.0")),
        ];
        let inventory = stock(&[(FABRIC_A, dec("10.0"))]);

        assert!(plan_decrements(&requirements, &inventory).is_err());
        assert_eq!(required_totals(&requirements)[&FABRIC_A], dec("12.0"));
    }

    /// Lock order is ascending and skips empty requirements
    #[test]
    fn test_lock_order() {
        let requirements = vec![
            requirement(7, dec("1.0")),
            requirement(3, dec("1.0")),
            requirement(5, Decimal::ZERO),
            requirement(3, dec("2.0")),
        ];
        assert_eq!(lock_order(&requirements), vec![3, 7]);
    }

    /// Availability reports a missing material as having nothing
    #[test]
    fn test_availability_of_missing_material() {
        let requirements = vec![requirement(FABRIC_A, dec("2.0")), requirement(9, dec("1.0"))];
        let report = availability(&requirements, &stock(&[(FABRIC_A, dec("3.0"))]));

        assert!(report[0].suficiente);
        assert!(!report[1].suficiente);
        assert_eq!(report[1].quantidade_disponivel, Decimal::ZERO);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for quantities in thousandths (0.001 - 100.000)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000).prop_map(|n| Decimal::new(n, 3))
    }

    /// Strategy for requirements over materials 1-8
    fn requirements_strategy() -> impl Strategy<Value = Vec<RequirementEntry>> {
        prop::collection::vec((1i64..=8, quantity_strategy()), 0..10).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(id, qty)| requirement(id, qty))
                .collect()
        })
    }

    /// Strategy for stock of every material 1-8
    fn stock_strategy() -> impl Strategy<Value = BTreeMap<i64, StockLevel>> {
        prop::collection::vec((0i64..=150_000).prop_map(|n| Decimal::new(n, 3)), 8).prop_map(
            |quantities| {
                let levels: Vec<(i64, Decimal)> = (1i64..=8).zip(quantities).collect();
                stock(&levels)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Approval happens exactly when every material covers its total
        #[test]
        fn prop_plan_is_all_or_nothing(
            requirements in requirements_strategy(),
            inventory in stock_strategy(),
        ) {
            let totals = required_totals(&requirements);
            let sufficient = totals
                .iter()
                .all(|(id, needed)| inventory[id].quantity >= *needed);

            match plan_decrements(&requirements, &inventory) {
                Ok(plan) => {
                    prop_assert!(sufficient);
                    prop_assert_eq!(plan.len(), totals.len());
                    for decrement in &plan {
                        prop_assert_eq!(decrement.quantity, totals[&decrement.material_id]);
                    }
                }
                Err(StockCommitError::InsufficientStock(shortfalls)) => {
                    prop_assert!(!sufficient);
                    for shortfall in &shortfalls {
                        prop_assert!(shortfall.falta > Decimal::ZERO);
                        prop_assert_eq!(shortfall.falta, shortfall.necessario - shortfall.disponivel);
                    }
                }
                Err(StockCommitError::MaterialNotFound(ids)) => {
                    prop_assert!(false, "every material exists, got missing {:?}", ids);
                }
            }
        }

        /// No sequence of commits drives stock below zero
        #[test]
        fn prop_commits_never_go_negative(
            orders in prop::collection::vec(requirements_strategy(), 1..8),
            mut inventory in stock_strategy(),
        ) {
            for requirements in &orders {
                let mut latch = MaterialsLatch::Uncommitted;
                let before = inventory.clone();
                match commit(&mut latch, OrderStatus::MateriaisConfirmados, requirements, &mut inventory) {
                    Ok(_) => prop_assert!(latch.is_committed()),
                    Err(_) => {
                        prop_assert_eq!(&inventory, &before);
                        prop_assert!(!latch.is_committed());
                    }
                }
                for level in inventory.values() {
                    prop_assert!(level.quantity >= Decimal::ZERO);
                }
            }
        }

        /// Lock order is strictly ascending
        #[test]
        fn prop_lock_order_is_ascending(requirements in requirements_strategy()) {
            let ids = lock_order(&requirements);
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
