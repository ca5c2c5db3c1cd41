//! Material requirements computation
//!
//! Expands an order line's size grid against the per-model, per-size bill of
//! materials and sums requirement lists across the lines of an order. Both
//! steps are pure functions over already-loaded data; persistence of the
//! resulting snapshots is the caller's concern.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{BomLine, RequirementEntry, Size};

/// Ordered piece count per garment size
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeGrid(BTreeMap<Size, u32>);

impl SizeGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, size: Size, count: u32) -> Self {
        self.insert(size, count);
        self
    }

    pub fn insert(&mut self, size: Size, count: u32) {
        self.0.insert(size, count);
    }

    pub fn get(&self, size: Size) -> u32 {
        self.0.get(&size).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Size, u32)> + '_ {
        self.0.iter().map(|(size, count)| (*size, *count))
    }

    /// Total pieces across all sizes
    pub fn total_pieces(&self) -> u64 {
        self.0.values().map(|c| u64::from(*c)).sum()
    }

    /// True when no size has a positive count
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|c| *c == 0)
    }
}

/// A size grid entry that was skipped during parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeGridIssue {
    #[error("unknown size code '{0}'")]
    UnknownSize(String),

    #[error("invalid count for size {size}: {value}")]
    InvalidSizeCount { size: String, value: String },
}

/// Parse a submitted size grid (`{"P": 10, "M": 20}`).
///
/// Entries with an unknown size code or a count that is not a non-negative
/// integer are skipped and reported; they never fail the whole grid.
pub fn parse_size_grid(raw: &Map<String, Value>) -> (SizeGrid, Vec<SizeGridIssue>) {
    let mut grid = SizeGrid::new();
    let mut issues = Vec::new();

    for (code, value) in raw {
        let Some(size) = Size::parse(code) else {
            issues.push(SizeGridIssue::UnknownSize(code.clone()));
            continue;
        };

        match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(count) => grid.insert(size, count),
            None => issues.push(SizeGridIssue::InvalidSizeCount {
                size: code.clone(),
                value: value.to_string(),
            }),
        }
    }

    (grid, issues)
}

/// Bill of materials keyed by (product model, size)
#[derive(Debug, Clone, Default)]
pub struct BomTable {
    lines: HashMap<(i64, Size), Vec<BomLine>>,
}

impl BomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model_id: i64, size: Size, line: BomLine) {
        self.lines.entry((model_id, size)).or_default().push(line);
    }

    /// BOM lines for (model, size); empty when none are registered
    pub fn lines(&self, model_id: i64, size: Size) -> &[BomLine] {
        self.lines
            .get(&(model_id, size))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_model(&self, model_id: i64) -> bool {
        self.lines.keys().any(|(model, _)| *model == model_id)
    }

    pub fn len(&self) -> usize {
        self.lines.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl FromIterator<(i64, Size, BomLine)> for BomTable {
    fn from_iter<T: IntoIterator<Item = (i64, Size, BomLine)>>(iter: T) -> Self {
        let mut table = BomTable::new();
        for (model_id, size, line) in iter {
            table.insert(model_id, size, line);
        }
        table
    }
}

/// Expand one order line into its per-material requirement list.
///
/// For every size with a positive count, each BOM line of (model, size)
/// contributes `quantity_per_unit * count` to its material's total. A line
/// without a model yields an empty list. Entries come out ordered by
/// material id.
pub fn expand(model_base: Option<i64>, grid: &SizeGrid, bom: &BomTable) -> Vec<RequirementEntry> {
    let Some(model_id) = model_base else {
        return Vec::new();
    };

    let mut totals: BTreeMap<i64, RequirementEntry> = BTreeMap::new();
    for (size, count) in grid.iter() {
        if count == 0 {
            continue;
        }
        let pieces = Decimal::from(count);

        for line in bom.lines(model_id, size) {
            let needed = line.quantity_per_unit * pieces;
            totals
                .entry(line.material_id)
                .and_modify(|entry| entry.quantidade += needed)
                .or_insert_with(|| RequirementEntry {
                    material_id: line.material_id,
                    nome: line.material_name.clone(),
                    quantidade: needed,
                    unidade: line.unit.display_name().to_string(),
                });
        }
    }

    totals.into_values().collect()
}

/// Parse a submitted grid and expand it in one step
pub fn expand_submitted(
    model_base: Option<i64>,
    raw_grid: &Map<String, Value>,
    bom: &BomTable,
) -> (Vec<RequirementEntry>, Vec<SizeGridIssue>) {
    let (grid, issues) = parse_size_grid(raw_grid);
    (expand(model_base, &grid, bom), issues)
}

/// Sum requirement entries by material id.
///
/// Name and unit are taken from the first entry seen for a material. The
/// result is ordered by material id.
pub fn aggregate<'a, I>(entries: I) -> Vec<RequirementEntry>
where
    I: IntoIterator<Item = &'a RequirementEntry>,
{
    let mut totals: BTreeMap<i64, RequirementEntry> = BTreeMap::new();
    for entry in entries {
        totals
            .entry(entry.material_id)
            .and_modify(|total| total.quantidade += entry.quantidade)
            .or_insert_with(|| entry.clone());
    }
    totals.into_values().collect()
}

/// Sum the requirement lists of several order lines
pub fn aggregate_lines(lines: &[Vec<RequirementEntry>]) -> Vec<RequirementEntry> {
    aggregate(lines.iter().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitOfMeasure;
    use serde_json::json;

    fn line(material_id: i64, name: &str, qty: Decimal) -> BomLine {
        BomLine {
            material_id,
            material_name: name.to_string(),
            unit: UnitOfMeasure::Metro,
            quantity_per_unit: qty,
        }
    }

    fn entry(material_id: i64, qty: i64) -> RequirementEntry {
        RequirementEntry {
            material_id,
            nome: format!("Material {}", material_id),
            quantidade: Decimal::from(qty),
            unidade: "Metro".to_string(),
        }
    }

    #[test]
    fn test_expand_single_size() {
        let bom: BomTable = [(1, Size::M, line(10, "Fabric A", Decimal::from(2)))]
            .into_iter()
            .collect();
        let grid = SizeGrid::new().with(Size::M, 10);

        let result = expand(Some(1), &grid, &bom);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].material_id, 10);
        assert_eq!(result[0].nome, "Fabric A");
        assert_eq!(result[0].quantidade, Decimal::from(20));
        assert_eq!(result[0].unidade, "Metro");
    }

    #[test]
    fn test_expand_sums_across_sizes() {
        let bom: BomTable = [
            (1, Size::P, line(10, "Fabric A", Decimal::new(15, 1))),
            (1, Size::G, line(10, "Fabric A", Decimal::new(25, 1))),
            (1, Size::G, line(11, "Button", Decimal::from(6))),
        ]
        .into_iter()
        .collect();
        let grid = SizeGrid::new().with(Size::P, 4).with(Size::G, 2);

        let result = expand(Some(1), &grid, &bom);

        assert_eq!(result.len(), 2);
        // 1.5 * 4 + 2.5 * 2
        assert_eq!(result[0].quantidade, Decimal::from(11));
        assert_eq!(result[1].quantidade, Decimal::from(12));
    }

    #[test]
    fn test_expand_without_model_is_empty() {
        let bom: BomTable = [(1, Size::M, line(10, "Fabric A", Decimal::from(2)))]
            .into_iter()
            .collect();
        let grid = SizeGrid::new().with(Size::M, 10);
        assert!(expand(None, &grid, &bom).is_empty());
    }

    #[test]
    fn test_expand_skips_zero_counts_and_unknown_bom() {
        let bom: BomTable = [(1, Size::M, line(10, "Fabric A", Decimal::from(2)))]
            .into_iter()
            .collect();
        let grid = SizeGrid::new().with(Size::M, 0).with(Size::XG, 5);
        assert!(expand(Some(1), &grid, &bom).is_empty());
        assert!(expand(Some(2), &SizeGrid::new().with(Size::M, 3), &bom).is_empty());
    }

    #[test]
    fn test_parse_size_grid_skips_invalid_entries() {
        let raw = json!({"P": 10, "M": -3, "G": 2.5, "GG": "4", "XXL": 1, "XG": 0});
        let (grid, issues) = parse_size_grid(raw.as_object().unwrap());

        assert_eq!(grid.get(Size::P), 10);
        assert_eq!(grid.get(Size::M), 0);
        assert_eq!(grid.get(Size::XG), 0);
        assert_eq!(grid.total_pieces(), 10);
        assert_eq!(issues.len(), 4);
        assert!(issues.contains(&SizeGridIssue::UnknownSize("XXL".to_string())));
    }

    #[test]
    fn test_empty_grid() {
        let (grid, issues) = parse_size_grid(&Map::new());
        assert!(grid.is_empty());
        assert!(issues.is_empty());
        assert!(SizeGrid::new().with(Size::P, 0).is_empty());
    }

    #[test]
    fn test_aggregate_sums_by_material() {
        let lines = vec![vec![entry(10, 20)], vec![entry(10, 5), entry(11, 3)]];
        let total = aggregate_lines(&lines);
        assert_eq!(total, vec![entry(10, 25), entry(11, 3)]);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_lines(&[]).is_empty());
        assert!(aggregate_lines(&[vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_requirement_entry_wire_shape() {
        let value = serde_json::to_value(RequirementEntry {
            material_id: 7,
            nome: "Linha".to_string(),
            quantidade: Decimal::new(12125, 3),
            unidade: "Tubo".to_string(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"material_id": 7, "nome": "Linha", "quantidade": 12.125, "unidade": "Tubo"})
        );
    }
}
