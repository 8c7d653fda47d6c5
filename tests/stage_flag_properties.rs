// Property-Based Testing for the BOQ lifecycle controller
// Checks the precondition table and the flag/line invariants under arbitrary inputs

use boq_lifecycle::boq::rows::{COL_BOQ_ID, COL_ITEM, COL_ITEM_COST_CODE, COL_UNIT};
use boq_lifecycle::boq::{
    available_actions, Action, BoqId, BoqLifecycleController, BoqRecord, DefaultTarget,
    InMemoryItemCatalog, InMemoryTaskService, LineCollection, RawRow, StageFlags,
};
use proptest::prelude::*;
use std::sync::Arc;

fn controller() -> BoqLifecycleController {
    BoqLifecycleController::new(
        Arc::new(InMemoryItemCatalog::new("Nos")),
        Arc::new(InMemoryTaskService::new()),
    )
}

fn flags_strategy() -> impl Strategy<Value = StageFlags> {
    prop::array::uniform5(any::<bool>()).prop_map(|[boq, wbs, fetched, items, tasks]| StageFlags {
        boq_details_created: boq,
        wbs_item_created: wbs,
        details_fetched: fetched,
        missing_item_created: items,
        task_created: tasks,
    })
}

// Rows that carry an id and a cost code, with or without a unit
fn valid_rows_strategy() -> impl Strategy<Value = Vec<RawRow>> {
    prop::collection::vec(
        prop::option::of(prop_oneof![Just("Nos"), Just("m3"), Just("  "), Just("Kg")]),
        1..12,
    )
    .prop_map(|units| {
        units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| {
                let row = RawRow::new(index)
                    .with(COL_BOQ_ID, format!("B-{index}"))
                    .with(COL_ITEM_COST_CODE, format!("CC-{index}"))
                    .with(COL_ITEM, format!("Item {index}"));
                match unit {
                    Some(unit) => row.with(COL_UNIT, unit),
                    None => row,
                }
            })
            .collect()
    })
}

// Rows that can never become lines
fn invalid_rows_strategy() -> impl Strategy<Value = Vec<RawRow>> {
    prop::collection::vec("[A-Za-z ]{0,12}", 0..10).prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(index, name)| RawRow::new(index).with(COL_ITEM, name))
            .collect()
    })
}

proptest! {
    #[test]
    fn available_actions_match_precondition_table(flags in flags_strategy()) {
        let actions = available_actions(&flags);
        let expected = [
            (Action::ImportBoqLines, !flags.boq_details_created),
            (Action::ImportWbsLines, flags.boq_details_created && !flags.wbs_item_created),
            (
                Action::LoadFetchedDetails,
                flags.boq_details_created && flags.wbs_item_created && !flags.details_fetched,
            ),
            (Action::CreateMissingItems, flags.details_fetched && !flags.missing_item_created),
            (Action::CreateTask, flags.missing_item_created && !flags.task_created),
        ];
        for (action, available) in expected {
            prop_assert_eq!(actions.contains(&action), available, "action {}", action);
        }
    }

    #[test]
    fn import_without_accepted_rows_changes_nothing(rows in invalid_rows_strategy()) {
        let mut record = BoqRecord::new(BoqId::new("BOQ-P"), "PRJ");
        let before = record.clone();

        let result = controller()
            .apply_import(&mut record, LineCollection::BoqLines, &rows)
            .unwrap();

        prop_assert!(result.succeeded.is_empty());
        prop_assert_eq!(result.failed.len(), rows.len());
        prop_assert_eq!(record, before);
    }

    #[test]
    fn resetting_boq_lines_clears_every_flag(
        flags in flags_strategy(),
        rows in valid_rows_strategy(),
    ) {
        let controller = controller();
        let mut record = BoqRecord::new(BoqId::new("BOQ-P"), "PRJ");
        controller.apply_import(&mut record, LineCollection::BoqLines, &rows).unwrap();
        record.stage_flags = flags;

        let summary = controller.reset_lines(&mut record, LineCollection::BoqLines);

        prop_assert_eq!(record.stage_flags, StageFlags::empty());
        prop_assert!(record.boq_lines.is_empty());
        prop_assert!(record.wbs_lines.is_empty());
        prop_assert_eq!(summary.previous_flags, flags);
        prop_assert_eq!(summary.removed_lines, rows.len());
    }

    #[test]
    fn boq_rows_import_again_after_reset(rows in valid_rows_strategy()) {
        let controller = controller();
        let mut record = BoqRecord::new(BoqId::new("BOQ-P"), "PRJ");
        controller.apply_import(&mut record, LineCollection::BoqLines, &rows).unwrap();
        controller.reset_lines(&mut record, LineCollection::BoqLines);

        let again = controller.apply_import(&mut record, LineCollection::BoqLines, &rows).unwrap();

        prop_assert!(again.failed.is_empty());
        prop_assert_eq!(record.boq_lines.len(), rows.len());
        prop_assert!(record.stage_flags.is_consistent());
    }

    #[test]
    fn resetting_wbs_lines_keeps_boq_flag(flags in flags_strategy()) {
        let mut record = BoqRecord::new(BoqId::new("BOQ-P"), "PRJ");
        record.stage_flags = flags;

        controller().reset_lines(&mut record, LineCollection::WbsLines);

        prop_assert_eq!(record.stage_flags.boq_details_created, flags.boq_details_created);
        prop_assert!(!record.stage_flags.wbs_item_created);
        prop_assert!(!record.stage_flags.details_fetched);
        prop_assert!(!record.stage_flags.missing_item_created);
        prop_assert!(!record.stage_flags.task_created);
    }

    #[test]
    fn propagate_default_never_overwrites_values(
        rows in valid_rows_strategy(),
        value in "[A-Za-z]{1,6}",
    ) {
        let controller = controller();
        let mut record = BoqRecord::new(BoqId::new("BOQ-P"), "PRJ");
        controller.apply_import(&mut record, LineCollection::BoqLines, &rows).unwrap();
        let before: Vec<Option<String>> = record.boq_lines.iter().map(|l| l.uom.clone()).collect();

        let updated = controller.propagate_default(&mut record, DefaultTarget::BoqUom, Some(value.clone()));

        let unset = before.iter().filter(|uom| uom.is_none()).count();
        prop_assert_eq!(updated, unset);
        for (old, line) in before.iter().zip(&record.boq_lines) {
            match old {
                Some(existing) => prop_assert_eq!(line.uom.as_ref(), Some(existing)),
                None => prop_assert_eq!(line.uom.as_deref(), Some(value.as_str())),
            }
        }
        prop_assert_eq!(record.boq_defaults.uom, Some(value));
    }
}
