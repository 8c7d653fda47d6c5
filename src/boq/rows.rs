// Row construction: turns parsed tabular rows into BOQ and WBS lines
//
// Each row is validated on its own. Builders keep the hierarchy state of the
// batch (last node per level, known cost codes) and only update it for rows
// that were accepted, so a rejected row never becomes anyone's parent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::errors::RowError;
use super::types::{BoqLine, LineId, WbsLine};

pub const COL_BOQ_ID: &str = "BOQ ID";
pub const COL_ITEM_COST_CODE: &str = "Item Cost Code";
pub const COL_ITEM: &str = "Item";
pub const COL_BOQ_QTY: &str = "BOQ Qty";
pub const COL_SELLING_RATE: &str = "Selling Rate";
pub const COL_CONTRACT_PRICE: &str = "Original Contract Price";
pub const COL_DIV_NAME: &str = "DIV. Name";
pub const COL_BOQ_LEVEL: &str = "LvL";
pub const COL_UNIT: &str = "Unit";
pub const COL_ITEM_GROUP: &str = "Item Group";
pub const COL_ITEM_DESCRIPTION: &str = "Item Description";
pub const COL_RESOURCE_QTY: &str = "Resource QTY";
pub const COL_WASTE: &str = "Waste ratio";
pub const COL_TOTAL_RESOURCE_QTY: &str = "Total Resource QTY";
pub const COL_MATERIAL_RATE: &str = "Material Rate";
pub const COL_BUDGET_RATE: &str = "Budget Rate";
pub const COL_FINANCE_CODE: &str = "Finance Code";

/// A parsed input row with named columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Zero-based position in the source file
    pub index: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.cells.insert(column.to_string(), value.into());
        self
    }

    /// Trimmed, non-empty value of `column` (header match ignores case and padding)
    pub fn cell(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(header, _)| header.trim().eq_ignore_ascii_case(column))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("nan"))
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

/// Settings that shape row construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Rows between progress notifications
    pub progress_interval: usize,
    /// Deepest WBS level kept; deeper rows are clamped to it
    pub max_wbs_level: u32,
    /// Longest item name kept on a WBS line
    pub item_name_max_len: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            progress_interval: 20,
            max_wbs_level: 4,
            item_name_max_len: 140,
        }
    }
}

fn required<'a>(row: &'a RawRow, column: &str) -> Result<&'a str, RowError> {
    row.cell(column).ok_or_else(|| RowError::MissingField {
        column: column.to_string(),
    })
}

fn number(row: &RawRow, column: &str) -> Result<Option<f64>, RowError> {
    let Some(raw) = row.cell(column) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(RowError::InvalidNumber {
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn non_negative(row: &RawRow, column: &str) -> Result<f64, RowError> {
    let value = number(row, column)?.unwrap_or(0.0);
    if value < 0.0 {
        return Err(RowError::NegativeValue {
            column: column.to_string(),
            value,
        });
    }
    Ok(value)
}

fn optional_text(row: &RawRow, column: &str) -> Option<String> {
    row.cell(column).map(str::to_string)
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Builds BOQ lines from one import batch
#[derive(Debug, Default)]
pub struct BoqRowBuilder {
    last_by_level: BTreeMap<u32, LineId>,
    seen_boq_ids: HashSet<String>,
}

impl BoqRowBuilder {
    pub fn new(existing: &[BoqLine]) -> Self {
        Self {
            last_by_level: BTreeMap::new(),
            seen_boq_ids: existing.iter().map(|line| line.boq_id.clone()).collect(),
        }
    }

    pub fn build(&mut self, row: &RawRow) -> Result<BoqLine, RowError> {
        let boq_id = required(row, COL_BOQ_ID)?.to_string();
        let item_cost_code = required(row, COL_ITEM_COST_CODE)?.to_string();
        let quantity = non_negative(row, COL_BOQ_QTY)?;
        let selling_rate = non_negative(row, COL_SELLING_RATE)?;
        let original_contract_price = number(row, COL_CONTRACT_PRICE)?.unwrap_or(0.0);

        if self.seen_boq_ids.contains(&boq_id) {
            return Err(RowError::Duplicate {
                field: COL_BOQ_ID.to_string(),
                value: boq_id,
            });
        }

        // unreadable levels fall back to the top level
        let level = row
            .cell(COL_BOQ_LEVEL)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|lvl| lvl.is_finite() && *lvl >= 1.0)
            .map(|lvl| lvl as u32)
            .unwrap_or(1);

        let parent = self
            .last_by_level
            .range(..level)
            .next_back()
            .map(|(_, id)| id.clone());

        let line = BoqLine {
            line_id: LineId::generate(),
            boq_id: boq_id.clone(),
            item_cost_code,
            item_name: optional_text(row, COL_ITEM).unwrap_or_default(),
            quantity,
            selling_rate,
            original_contract_price,
            div_name: optional_text(row, COL_DIV_NAME).unwrap_or_default(),
            level,
            parent,
            is_group: false,
            uom: optional_text(row, COL_UNIT),
            item_group: optional_text(row, COL_ITEM_GROUP),
            linked_item: None,
        };

        self.seen_boq_ids.insert(boq_id);
        self.last_by_level.insert(level, line.line_id.clone());
        self.last_by_level.retain(|lvl, _| *lvl <= level);
        Ok(line)
    }

    /// Mark every line that another line points at as a group
    pub fn mark_groups(lines: &mut [BoqLine]) {
        let parents: HashSet<LineId> = lines.iter().filter_map(|l| l.parent.clone()).collect();
        for line in lines.iter_mut() {
            if parents.contains(&line.line_id) {
                line.is_group = true;
            }
        }
    }
}

/// Header names detected in a WBS sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WbsColumns {
    pub cost_code: Option<String>,
    pub level: Option<String>,
    pub boq_id: Option<String>,
    pub res_type: Option<String>,
}

impl WbsColumns {
    pub fn detect<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let headers: Vec<&str> = headers.into_iter().collect();
        let find = |pred: &dyn Fn(&str) -> bool| {
            headers
                .iter()
                .find(|h| pred(h.trim().to_lowercase().as_str()))
                .map(|h| h.trim().to_string())
        };
        Self {
            cost_code: find(&|h| h.contains("cost code")).or_else(|| find(&|h| h.contains("wbs"))),
            level: find(&|h| h.contains("level")),
            boq_id: find(&|h| h.contains("boq id")),
            res_type: find(&|h| h.contains("res") && h.contains("type")),
        }
    }
}

/// Builds WBS lines from one import batch
#[derive(Debug)]
pub struct WbsRowBuilder {
    settings: ImportSettings,
    columns: WbsColumns,
    // insertion order matters for the prefix scan
    known: Vec<(String, LineId, u32)>,
    by_code: HashMap<String, usize>,
    boq_index: HashMap<String, LineId>,
}

impl WbsRowBuilder {
    pub fn new(
        settings: ImportSettings,
        columns: WbsColumns,
        existing: &[WbsLine],
        boq_lines: &[BoqLine],
    ) -> Self {
        let mut builder = Self {
            settings,
            columns,
            known: Vec::new(),
            by_code: HashMap::new(),
            boq_index: boq_lines
                .iter()
                .map(|line| (line.boq_id.clone(), line.line_id.clone()))
                .collect(),
        };
        for line in existing {
            builder.remember(&line.cost_code, &line.line_id, line.level);
        }
        builder
    }

    fn remember(&mut self, code: &str, id: &LineId, level: u32) {
        self.by_code.insert(code.to_string(), self.known.len());
        self.known.push((code.to_string(), id.clone(), level));
    }

    fn resolve_parent(&self, code: &str, level: u32) -> Option<LineId> {
        if level <= 1 {
            return None;
        }
        if let Some((prefix, _)) = code.rsplit_once('-') {
            if let Some(&pos) = self.by_code.get(prefix) {
                return Some(self.known[pos].1.clone());
            }
        }
        self.known
            .iter()
            .find(|(known, _, known_level)| {
                known.len() < code.len() && code.starts_with(known.as_str()) && *known_level == level - 1
            })
            .map(|(_, id, _)| id.clone())
    }

    pub fn build(&mut self, row: &RawRow) -> Result<WbsLine, RowError> {
        let cost_column = self.columns.cost_code.as_deref().unwrap_or("Cost Code");
        let level_column = self.columns.level.as_deref().unwrap_or("Level");

        let code = required(row, cost_column)?.to_string();
        let raw_level = required(row, level_column)?;
        let excel_level = raw_level
            .parse::<f64>()
            .ok()
            .filter(|lvl| lvl.is_finite() && *lvl >= 0.0)
            .map(|lvl| lvl as u32)
            .ok_or_else(|| RowError::InvalidNumber {
                column: level_column.to_string(),
                value: raw_level.to_string(),
            })?;

        if self.by_code.contains_key(&code) {
            return Err(RowError::Duplicate {
                field: cost_column.to_string(),
                value: code,
            });
        }

        let level = excel_level.min(self.settings.max_wbs_level);
        let res_type = self
            .columns
            .res_type
            .as_deref()
            .and_then(|column| optional_text(row, column));
        let item_like = excel_level >= 5 || res_type.is_some();

        let boq_ref = self
            .columns
            .boq_id
            .as_deref()
            .and_then(|column| optional_text(row, column));
        let boq_line = boq_ref
            .as_deref()
            .and_then(|id| self.boq_index.get(id))
            .cloned();

        let (item_code, description) = if item_like {
            (
                row.cell(COL_ITEM)
                    .map(|item| truncate_chars(item, self.settings.item_name_max_len)),
                optional_text(row, COL_ITEM_DESCRIPTION),
            )
        } else {
            (None, None)
        };

        // unparseable optional figures are dropped, not fatal
        let lenient = |column: &str| number(row, column).ok().flatten();

        let mut line = WbsLine {
            line_id: LineId::generate(),
            parent: self.resolve_parent(&code, level),
            cost_code: code,
            level,
            is_group: !item_like,
            res_type,
            item_code,
            description,
            boq_ref,
            quantity: lenient(COL_BOQ_QTY),
            resource_qty: lenient(COL_RESOURCE_QTY),
            waste: lenient(COL_WASTE),
            unit_cost: lenient(COL_MATERIAL_RATE),
            unit_rate: lenient(COL_BUDGET_RATE),
            total_resource_qty: lenient(COL_TOTAL_RESOURCE_QTY),
            budget: None,
            finance_code: optional_text(row, COL_FINANCE_CODE),
            uom: optional_text(row, COL_UNIT),
            item_group: optional_text(row, COL_ITEM_GROUP),
            linked_item: None,
            boq_line,
            task: None,
        };
        line.derive_budget();

        self.remember(&line.cost_code, &line.line_id, line.level);
        Ok(line)
    }

    /// Lines that became parents during the import are groups
    pub fn mark_groups(lines: &mut [WbsLine]) {
        let parents: HashSet<LineId> = lines.iter().filter_map(|l| l.parent.clone()).collect();
        for line in lines.iter_mut() {
            if parents.contains(&line.line_id) {
                line.is_group = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boq_row(index: usize, boq_id: &str, code: &str, level: &str) -> RawRow {
        RawRow::new(index)
            .with(COL_BOQ_ID, boq_id)
            .with(COL_ITEM_COST_CODE, code)
            .with(COL_BOQ_LEVEL, level)
            .with(COL_ITEM, format!("Item {boq_id}"))
            .with(COL_BOQ_QTY, "10")
    }

    fn wbs_row(index: usize, code: &str, level: &str) -> RawRow {
        RawRow::new(index).with("Cost Code", code).with("Level", level)
    }

    fn wbs_builder(boq_lines: &[BoqLine]) -> WbsRowBuilder {
        let columns = WbsColumns::detect(["Cost Code", "Level", "BOQ ID", "Res. Type"]);
        WbsRowBuilder::new(ImportSettings::default(), columns, &[], boq_lines)
    }

    #[test]
    fn test_cell_lookup_ignores_case_padding_and_blanks() {
        let row = RawRow::new(0)
            .with(" boq id ", " B-1 ")
            .with("Unit", "   ")
            .with("Item", "nan");
        assert_eq!(row.cell("BOQ ID"), Some("B-1"));
        assert_eq!(row.cell("Unit"), None);
        assert_eq!(row.cell("Item"), None);
    }

    #[test]
    fn test_boq_row_requires_id_and_cost_code() {
        let mut builder = BoqRowBuilder::default();
        let row = RawRow::new(0).with(COL_BOQ_ID, "B-1");
        assert_eq!(
            builder.build(&row),
            Err(RowError::MissingField {
                column: COL_ITEM_COST_CODE.to_string()
            })
        );
    }

    #[test]
    fn test_boq_row_rejects_malformed_quantity() {
        let mut builder = BoqRowBuilder::default();
        let row = boq_row(0, "B-1", "C-1", "1").with(COL_BOQ_QTY, "ten");
        assert!(matches!(
            builder.build(&row),
            Err(RowError::InvalidNumber { .. })
        ));
        let row = boq_row(1, "B-2", "C-2", "1").with(COL_BOQ_QTY, "-3");
        assert!(matches!(
            builder.build(&row),
            Err(RowError::NegativeValue { .. })
        ));
    }

    #[test]
    fn test_boq_hierarchy_follows_levels() {
        let mut builder = BoqRowBuilder::default();
        let root = builder.build(&boq_row(0, "B-1", "C-1", "1")).unwrap();
        let child = builder.build(&boq_row(1, "B-2", "C-2", "2")).unwrap();
        let grandchild = builder.build(&boq_row(2, "B-3", "C-3", "3")).unwrap();
        let sibling = builder.build(&boq_row(3, "B-4", "C-4", "2")).unwrap();
        let unreadable = builder.build(&boq_row(4, "B-5", "C-5", "x")).unwrap();

        assert_eq!(root.parent, None);
        assert_eq!(child.parent, Some(root.line_id.clone()));
        assert_eq!(grandchild.parent, Some(child.line_id.clone()));
        assert_eq!(sibling.parent, Some(root.line_id.clone()));
        assert_eq!(unreadable.level, 1);
        assert_eq!(unreadable.parent, None);

        let mut lines = vec![root, child, grandchild, sibling, unreadable];
        BoqRowBuilder::mark_groups(&mut lines);
        let groups: Vec<bool> = lines.iter().map(|l| l.is_group).collect();
        assert_eq!(groups, vec![true, true, false, false, false]);
    }

    #[test]
    fn test_rejected_boq_row_does_not_become_a_parent() {
        let mut builder = BoqRowBuilder::default();
        let root = builder.build(&boq_row(0, "B-1", "C-1", "1")).unwrap();
        let bad = boq_row(1, "B-2", "C-2", "2").with(COL_BOQ_QTY, "??");
        assert!(builder.build(&bad).is_err());
        let child = builder.build(&boq_row(2, "B-3", "C-3", "3")).unwrap();
        assert_eq!(child.parent, Some(root.line_id));
    }

    #[test]
    fn test_duplicate_boq_id_is_rejected() {
        let mut builder = BoqRowBuilder::default();
        builder.build(&boq_row(0, "B-1", "C-1", "1")).unwrap();
        assert!(matches!(
            builder.build(&boq_row(1, "B-1", "C-9", "1")),
            Err(RowError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_wbs_column_detection() {
        let columns = WbsColumns::detect(["WBS Code", "Level No", "BOQ ID", "Res. Type", "Unit"]);
        assert_eq!(columns.cost_code.as_deref(), Some("WBS Code"));
        assert_eq!(columns.level.as_deref(), Some("Level No"));
        assert_eq!(columns.boq_id.as_deref(), Some("BOQ ID"));
        assert_eq!(columns.res_type.as_deref(), Some("Res. Type"));
    }

    #[test]
    fn test_wbs_parent_from_code_prefix() {
        let mut builder = wbs_builder(&[]);
        let root = builder.build(&wbs_row(0, "PRJ25", "1")).unwrap();
        let area = builder.build(&wbs_row(1, "PRJ25-01", "2")).unwrap();
        let work = builder.build(&wbs_row(2, "PRJ25-01-03", "3")).unwrap();
        assert_eq!(root.parent, None);
        assert_eq!(area.parent, Some(root.line_id.clone()));
        assert_eq!(work.parent, Some(area.line_id.clone()));
    }

    #[test]
    fn test_wbs_parent_from_prefix_scan() {
        let mut builder = wbs_builder(&[]);
        let root = builder.build(&wbs_row(0, "A1", "1")).unwrap();
        let child = builder.build(&wbs_row(1, "A101", "2")).unwrap();
        assert_eq!(child.parent, Some(root.line_id));
    }

    #[test]
    fn test_wbs_deep_levels_are_clamped_and_become_items() {
        let mut builder = wbs_builder(&[]);
        let line = builder
            .build(&wbs_row(0, "A-1-1-1-1", "6").with(COL_ITEM, "Cement bag"))
            .unwrap();
        assert_eq!(line.level, 4);
        assert!(!line.is_group);
        assert_eq!(line.item_code.as_deref(), Some("Cement bag"));
    }

    #[test]
    fn test_wbs_res_type_makes_item_and_truncates_name() {
        let mut builder = WbsRowBuilder::new(
            ImportSettings {
                item_name_max_len: 5,
                ..ImportSettings::default()
            },
            WbsColumns::detect(["Cost Code", "Level", "Res. Type"]),
            &[],
            &[],
        );
        let line = builder
            .build(
                &wbs_row(0, "A-1", "2")
                    .with("Res. Type", "Material")
                    .with(COL_ITEM, "Reinforcement steel"),
            )
            .unwrap();
        assert!(!line.is_group);
        assert_eq!(line.item_code.as_deref(), Some("Reinf"));
    }

    #[test]
    fn test_wbs_group_rows_ignore_item_columns() {
        let mut builder = wbs_builder(&[]);
        let line = builder
            .build(&wbs_row(0, "A-1", "2").with(COL_ITEM, "Cement"))
            .unwrap();
        assert!(line.is_group);
        assert_eq!(line.item_code, None);
    }

    #[test]
    fn test_wbs_row_links_boq_line() {
        let mut boq = BoqRowBuilder::default();
        let boq_line = boq.build(&boq_row(0, "B-7", "C-7", "1")).unwrap();
        let mut builder = wbs_builder(std::slice::from_ref(&boq_line));
        let line = builder
            .build(&wbs_row(0, "A-1", "5").with("BOQ ID", "B-7"))
            .unwrap();
        assert_eq!(line.boq_ref.as_deref(), Some("B-7"));
        assert_eq!(line.boq_line, Some(boq_line.line_id));
    }

    #[test]
    fn test_wbs_row_failures() {
        let mut builder = wbs_builder(&[]);
        assert!(matches!(
            builder.build(&RawRow::new(0).with("Level", "1")),
            Err(RowError::MissingField { .. })
        ));
        assert!(matches!(
            builder.build(&wbs_row(1, "A", "top")),
            Err(RowError::InvalidNumber { .. })
        ));
        builder.build(&wbs_row(2, "A", "1")).unwrap();
        assert!(matches!(
            builder.build(&wbs_row(3, "A", "1")),
            Err(RowError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_wbs_invalid_optional_numbers_are_ignored() {
        let mut builder = wbs_builder(&[]);
        let line = builder
            .build(
                &wbs_row(0, "A-1", "5")
                    .with(COL_RESOURCE_QTY, "lots")
                    .with(COL_BUDGET_RATE, "12.5"),
            )
            .unwrap();
        assert_eq!(line.resource_qty, None);
        assert_eq!(line.unit_rate, Some(12.5));
        assert_eq!(line.budget, None);
    }

    #[test]
    fn test_wbs_row_budget_figures() {
        let mut builder = wbs_builder(&[]);
        let line = builder
            .build(
                &wbs_row(0, "A-1", "5")
                    .with(COL_BOQ_QTY, "40")
                    .with(COL_WASTE, "1.1")
                    .with(COL_RESOURCE_QTY, "0.5")
                    .with(COL_BUDGET_RATE, "10"),
            )
            .unwrap();
        assert!((line.total_resource_qty.unwrap() - 22.0).abs() < 1e-9);
        assert!((line.budget.unwrap() - 220.0).abs() < 1e-9);

        let given = builder
            .build(
                &wbs_row(1, "A-2", "5")
                    .with(COL_TOTAL_RESOURCE_QTY, "8")
                    .with(COL_BUDGET_RATE, "3"),
            )
            .unwrap();
        assert_eq!(given.total_resource_qty, Some(8.0));
        assert_eq!(given.budget, Some(24.0));
    }
}
