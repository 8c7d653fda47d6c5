// Core types for the BOQ lifecycle: the record, its stage flags and line collections

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a BOQ record
    BoqId
);
string_id!(
    /// Identity of a single BOQ or WBS line
    LineId
);
string_id!(
    /// Reference to an item definition in the item catalog
    ItemRef
);
string_id!(
    /// Reference to a task created by the task service
    TaskRef
);

impl LineId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Independent completion gates of a BOQ record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageFlags {
    pub boq_details_created: bool,
    pub wbs_item_created: bool,
    pub details_fetched: bool,
    pub missing_item_created: bool,
    pub task_created: bool,
}

/// A flag combination the forward lifecycle can never produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagViolation {
    /// WBS lines imported without BOQ lines
    WbsWithoutBoq,
    /// Details fetched before both imports completed
    FetchedBeforeImports,
    /// Missing items created before details were fetched
    ItemsBeforeFetch,
    /// Tasks created before missing items were created
    TasksBeforeItems,
}

impl fmt::Display for FlagViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlagViolation::WbsWithoutBoq => "wbs_item_created is set while boq_details_created is not",
            FlagViolation::FetchedBeforeImports => {
                "details_fetched is set while an import has not completed"
            }
            FlagViolation::ItemsBeforeFetch => {
                "missing_item_created is set while details_fetched is not"
            }
            FlagViolation::TasksBeforeItems => {
                "task_created is set while missing_item_created is not"
            }
        };
        f.write_str(text)
    }
}

impl StageFlags {
    /// Flags of a freshly created record
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every flag set, the end of the forward lifecycle
    pub fn complete() -> Self {
        Self {
            boq_details_created: true,
            wbs_item_created: true,
            details_fetched: true,
            missing_item_created: true,
            task_created: true,
        }
    }

    pub fn check_invariants(&self) -> Vec<FlagViolation> {
        let mut violations = Vec::new();
        if self.wbs_item_created && !self.boq_details_created {
            violations.push(FlagViolation::WbsWithoutBoq);
        }
        if self.details_fetched && !(self.boq_details_created && self.wbs_item_created) {
            violations.push(FlagViolation::FetchedBeforeImports);
        }
        if self.missing_item_created && !self.details_fetched {
            violations.push(FlagViolation::ItemsBeforeFetch);
        }
        if self.task_created && !self.missing_item_created {
            violations.push(FlagViolation::TasksBeforeItems);
        }
        violations
    }

    pub fn is_consistent(&self) -> bool {
        self.check_invariants().is_empty()
    }
}

impl fmt::Display for StageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |b: bool| if b { 1 } else { 0 };
        write!(
            f,
            "boq={} wbs={} fetched={} items={} tasks={}",
            bit(self.boq_details_created),
            bit(self.wbs_item_created),
            bit(self.details_fetched),
            bit(self.missing_item_created),
            bit(self.task_created),
        )
    }
}

/// Default UOM / item group applied to lines that carry none
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDefaults {
    pub uom: Option<String>,
    pub item_group: Option<String>,
}

/// One bill-of-quantities line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoqLine {
    pub line_id: LineId,
    pub boq_id: String,
    pub item_cost_code: String,
    /// Item name or description as written in the bill
    pub item_name: String,
    pub quantity: f64,
    pub selling_rate: f64,
    pub original_contract_price: f64,
    pub div_name: String,
    pub level: u32,
    pub parent: Option<LineId>,
    pub is_group: bool,
    pub uom: Option<String>,
    pub item_group: Option<String>,
    pub linked_item: Option<ItemRef>,
}

/// One work-breakdown line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbsLine {
    pub line_id: LineId,
    pub cost_code: String,
    pub level: u32,
    pub parent: Option<LineId>,
    pub is_group: bool,
    pub res_type: Option<String>,
    pub item_code: Option<String>,
    pub description: Option<String>,
    /// BOQ ID as read from the import, used to resolve `boq_line`
    pub boq_ref: Option<String>,
    pub quantity: Option<f64>,
    pub resource_qty: Option<f64>,
    pub waste: Option<f64>,
    pub unit_cost: Option<f64>,
    /// Budget rate per resource unit
    pub unit_rate: Option<f64>,
    /// quantity * waste * resource_qty, or the sheet's own total when those are missing
    #[serde(default)]
    pub total_resource_qty: Option<f64>,
    /// unit_rate * total_resource_qty
    #[serde(default)]
    pub budget: Option<f64>,
    pub finance_code: Option<String>,
    pub uom: Option<String>,
    pub item_group: Option<String>,
    pub linked_item: Option<ItemRef>,
    pub boq_line: Option<LineId>,
    pub task: Option<TaskRef>,
}

impl WbsLine {
    /// Recompute the derived budget figures; zero or missing inputs leave them as they are
    pub fn derive_budget(&mut self) {
        let given = |value: Option<f64>| value.filter(|v| *v != 0.0);
        if let (Some(qty), Some(waste), Some(resource)) =
            (given(self.quantity), given(self.waste), given(self.resource_qty))
        {
            self.total_resource_qty = Some(qty * waste * resource);
        }
        if let (Some(rate), Some(total)) = (given(self.unit_rate), given(self.total_resource_qty)) {
            self.budget = Some(rate * total);
        }
    }
}

/// A bill of quantities for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoqRecord {
    pub identity: BoqId,
    pub project_ref: String,
    #[serde(default)]
    pub warehouse: Option<String>,
    /// Commit counter, bumped by every successful store commit
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub stage_flags: StageFlags,
    #[serde(default)]
    pub boq_defaults: LineDefaults,
    #[serde(default)]
    pub wbs_defaults: LineDefaults,
    #[serde(default)]
    pub boq_lines: Vec<BoqLine>,
    #[serde(default)]
    pub wbs_lines: Vec<WbsLine>,
}

impl BoqRecord {
    pub fn new(identity: BoqId, project_ref: impl Into<String>) -> Self {
        Self {
            identity,
            project_ref: project_ref.into(),
            warehouse: None,
            version: 0,
            stage_flags: StageFlags::empty(),
            boq_defaults: LineDefaults::default(),
            wbs_defaults: LineDefaults::default(),
            boq_lines: Vec::new(),
            wbs_lines: Vec::new(),
        }
    }

    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    pub fn find_boq_line_by_boq_id(&self, boq_id: &str) -> Option<&BoqLine> {
        self.boq_lines.iter().find(|line| line.boq_id == boq_id)
    }

    pub fn line_count(&self, which: LineCollection) -> usize {
        match which {
            LineCollection::BoqLines => self.boq_lines.len(),
            LineCollection::WbsLines => self.wbs_lines.len(),
        }
    }
}

/// Which line collection an import or reset targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCollection {
    BoqLines,
    WbsLines,
}

impl fmt::Display for LineCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineCollection::BoqLines => f.write_str("boq_lines"),
            LineCollection::WbsLines => f.write_str("wbs_lines"),
        }
    }
}

/// Which default `propagate_default` sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultTarget {
    BoqUom,
    BoqItemGroup,
    WbsUom,
    WbsItemGroup,
}

impl DefaultTarget {
    pub fn collection(&self) -> LineCollection {
        match self {
            DefaultTarget::BoqUom | DefaultTarget::BoqItemGroup => LineCollection::BoqLines,
            DefaultTarget::WbsUom | DefaultTarget::WbsItemGroup => LineCollection::WbsLines,
        }
    }
}

impl std::str::FromStr for DefaultTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "boq_uom" => Ok(DefaultTarget::BoqUom),
            "boq_item_group" => Ok(DefaultTarget::BoqItemGroup),
            "wbs_uom" => Ok(DefaultTarget::WbsUom),
            "wbs_item_group" => Ok(DefaultTarget::WbsItemGroup),
            other => Err(format!("unknown default target: {other}")),
        }
    }
}

/// Treats missing and blank strings alike
pub(crate) fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}
