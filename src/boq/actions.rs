// Precondition table: which lifecycle actions a set of stage flags allows

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::types::{LineCollection, StageFlags};

/// Transition actions offered on a BOQ record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    ImportBoqLines,
    ImportWbsLines,
    LoadFetchedDetails,
    CreateMissingItems,
    CreateTask,
}

pub type ActionSet = BTreeSet<Action>;

impl Action {
    pub const ALL: [Action; 5] = [
        Action::ImportBoqLines,
        Action::ImportWbsLines,
        Action::LoadFetchedDetails,
        Action::CreateMissingItems,
        Action::CreateTask,
    ];

    /// Evaluate this action's precondition against `flags`
    pub fn is_available(&self, flags: &StageFlags) -> bool {
        match self {
            Action::ImportBoqLines => !flags.boq_details_created,
            Action::ImportWbsLines => flags.boq_details_created && !flags.wbs_item_created,
            Action::LoadFetchedDetails => {
                flags.boq_details_created && flags.wbs_item_created && !flags.details_fetched
            }
            Action::CreateMissingItems => flags.details_fetched && !flags.missing_item_created,
            Action::CreateTask => flags.missing_item_created && !flags.task_created,
        }
    }

    pub fn precondition(&self) -> &'static str {
        match self {
            Action::ImportBoqLines => "BOQ lines not yet imported",
            Action::ImportWbsLines => "BOQ lines imported and WBS lines not yet imported",
            Action::LoadFetchedDetails => "both imports completed and details not yet fetched",
            Action::CreateMissingItems => "details fetched and missing items not yet created",
            Action::CreateTask => "missing items created and tasks not yet created",
        }
    }

    pub fn for_import(kind: LineCollection) -> Self {
        match kind {
            LineCollection::BoqLines => Action::ImportBoqLines,
            LineCollection::WbsLines => Action::ImportWbsLines,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::ImportBoqLines => "import-boq-lines",
            Action::ImportWbsLines => "import-wbs-lines",
            Action::LoadFetchedDetails => "load-fetched-details",
            Action::CreateMissingItems => "create-missing-items",
            Action::CreateTask => "create-task",
        };
        f.write_str(label)
    }
}

/// All actions whose precondition holds for `flags`; several may hold at once
pub fn available_actions(flags: &StageFlags) -> ActionSet {
    Action::ALL
        .iter()
        .copied()
        .filter(|action| action.is_available(flags))
        .collect()
}
