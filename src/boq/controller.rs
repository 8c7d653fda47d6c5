// BOQ lifecycle controller
//
// Every operation validates its precondition first, talks to collaborators
// second and mutates the record last. Nothing that can fail runs after the
// first mutation, so callers observe either the old record or the fully
// updated one: flags never move without their lines.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::actions::{available_actions, Action, ActionSet};
use super::errors::{LifecycleError, RowError};
use super::progress::{NoopProgress, ProgressReporter};
use super::rows::{
    BoqRowBuilder, ImportSettings, RawRow, WbsColumns, WbsRowBuilder, COL_BOQ_ID,
};
use super::traits::{ItemCatalog, ItemSignature, ProgressSink, TaskService, WbsTaskRequest};
use super::types::{
    is_unset, BoqLine, BoqRecord, DefaultTarget, ItemRef, LineCollection, LineId, StageFlags,
    TaskRef, WbsLine,
};

/// Which line collections are scanned for unlinked items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingItemSource {
    Boq,
    Wbs,
    #[default]
    Both,
}

impl MissingItemSource {
    fn includes(&self, which: LineCollection) -> bool {
        matches!(
            (self, which),
            (MissingItemSource::Both, _)
                | (MissingItemSource::Boq, LineCollection::BoqLines)
                | (MissingItemSource::Wbs, LineCollection::WbsLines)
        )
    }
}

/// A successfully constructed line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LineEntry {
    Boq(BoqLine),
    Wbs(WbsLine),
}

impl LineEntry {
    pub fn line_id(&self) -> &LineId {
        match self {
            LineEntry::Boq(line) => &line.line_id,
            LineEntry::Wbs(line) => &line.line_id,
        }
    }
}

/// A rejected row and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub reason: RowError,
}

/// How an import batch ended, for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportOutcome {
    /// Every row was accepted
    Complete,
    /// Some rows were accepted, some rejected
    Partial,
    /// Rows were supplied but none was accepted
    Failed,
    /// The input had no rows
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub kind: LineCollection,
    pub succeeded: Vec<LineEntry>,
    pub failed: Vec<RowFailure>,
    pub total: usize,
}

impl ImportResult {
    pub fn outcome(&self) -> ImportOutcome {
        match (self.succeeded.len(), self.failed.len()) {
            (0, 0) => ImportOutcome::Empty,
            (0, _) => ImportOutcome::Failed,
            (_, 0) => ImportOutcome::Complete,
            _ => ImportOutcome::Partial,
        }
    }

    pub fn summary(&self) -> String {
        match self.outcome() {
            ImportOutcome::Complete => format!("Imported {} {} rows", self.succeeded.len(), self.kind),
            ImportOutcome::Partial => format!(
                "Imported {} of {} {} rows, {} failed",
                self.succeeded.len(),
                self.total,
                self.kind,
                self.failed.len()
            ),
            ImportOutcome::Failed => format!("No {} rows were imported", self.kind),
            ImportOutcome::Empty => format!("The {} input contained no rows", self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NoItemName,
    NoItemGroup,
}

/// A line a derivation could not act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub collection: LineCollection,
    pub line_id: LineId,
    pub reason: SkipReason,
}

/// Outcome of a derivation; an empty `created` is a success meaning nothing was needed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationResult<R> {
    pub created: Vec<R>,
    pub updated_lines: usize,
    pub skipped: Vec<SkippedLine>,
}

impl<R> DerivationResult<R> {
    fn nothing_needed(skipped: Vec<SkippedLine>) -> Self {
        Self {
            created: Vec::new(),
            updated_lines: 0,
            skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}

pub type ItemDerivation = DerivationResult<ItemRef>;
pub type TaskDerivation = DerivationResult<TaskRef>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub boq_lines: usize,
    pub wbs_lines: usize,
    /// WBS lines newly linked to their BOQ line
    pub relinked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub which: LineCollection,
    pub removed_lines: usize,
    /// Lines of the other collection removed along with `which`
    pub cascaded_lines: usize,
    pub previous_flags: StageFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub import: ImportSettings,
    pub missing_item_source: MissingItemSource,
}

/// Owns no record; every operation receives the record it acts on
#[derive(Clone)]
pub struct BoqLifecycleController {
    catalog: Arc<dyn ItemCatalog>,
    tasks: Arc<dyn TaskService>,
    progress: Arc<dyn ProgressSink>,
    settings: ControllerSettings,
}

impl std::fmt::Debug for BoqLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoqLifecycleController")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BoqLifecycleController {
    pub fn new(catalog: Arc<dyn ItemCatalog>, tasks: Arc<dyn TaskService>) -> Self {
        Self {
            catalog,
            tasks,
            progress: Arc::new(NoopProgress),
            settings: ControllerSettings::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn available_actions(&self, record: &BoqRecord) -> ActionSet {
        available_actions(&record.stage_flags)
    }

    fn require(&self, record: &BoqRecord, action: Action) -> Result<(), LifecycleError> {
        if action.is_available(&record.stage_flags) {
            return Ok(());
        }
        warn!(
            boq_id = %record.identity,
            action = %action,
            flags = %record.stage_flags,
            "Rejected action whose precondition does not hold"
        );
        Err(LifecycleError::precondition(action, record.stage_flags))
    }

    /// Construct lines from `rows`, commit accepted ones together with the stage flag
    pub fn apply_import(
        &self,
        record: &mut BoqRecord,
        kind: LineCollection,
        rows: &[RawRow],
    ) -> Result<ImportResult, LifecycleError> {
        self.require(record, Action::for_import(kind))?;

        let total = rows.len();
        let reporter = ProgressReporter::new(
            self.progress.as_ref(),
            format!("{}:{}", record.identity, kind),
            total,
            self.settings.import.progress_interval,
        );
        let mut failed = Vec::new();

        let succeeded: Vec<LineEntry> = match kind {
            LineCollection::BoqLines => {
                let mut builder = BoqRowBuilder::new(&record.boq_lines);
                let mut lines = Vec::new();
                for (position, row) in rows.iter().enumerate() {
                    match builder.build(row) {
                        Ok(line) => lines.push(LineEntry::Boq(line)),
                        Err(reason) => {
                            debug!(row = row.index, %reason, "BOQ row rejected");
                            failed.push(RowFailure { row_index: row.index, reason });
                        }
                    }
                    reporter.row_done(position + 1, row.cell(COL_BOQ_ID).unwrap_or("-"));
                }
                lines
            }
            LineCollection::WbsLines => {
                let columns = WbsColumns::detect(rows.iter().flat_map(|row| row.headers()));
                let mut builder = WbsRowBuilder::new(
                    self.settings.import.clone(),
                    columns,
                    &record.wbs_lines,
                    &record.boq_lines,
                );
                let mut lines = Vec::new();
                for (position, row) in rows.iter().enumerate() {
                    match builder.build(row) {
                        Ok(line) => {
                            reporter.row_done(position + 1, &line.cost_code);
                            lines.push(LineEntry::Wbs(line));
                        }
                        Err(reason) => {
                            debug!(row = row.index, %reason, "WBS row rejected");
                            failed.push(RowFailure { row_index: row.index, reason });
                            reporter.row_done(position + 1, "-");
                        }
                    }
                }
                lines
            }
        };

        let result = ImportResult {
            kind,
            succeeded,
            failed,
            total,
        };

        if result.succeeded.is_empty() {
            warn!(
                boq_id = %record.identity,
                kind = %kind,
                failed = result.failed.len(),
                "Import accepted no rows; record left unchanged"
            );
            return Ok(result);
        }

        match kind {
            LineCollection::BoqLines => {
                record.boq_lines.extend(result.succeeded.iter().filter_map(|entry| match entry {
                    LineEntry::Boq(line) => Some(line.clone()),
                    LineEntry::Wbs(_) => None,
                }));
                BoqRowBuilder::mark_groups(&mut record.boq_lines);
                record.stage_flags.boq_details_created = true;
            }
            LineCollection::WbsLines => {
                record.wbs_lines.extend(result.succeeded.iter().filter_map(|entry| match entry {
                    LineEntry::Wbs(line) => Some(line.clone()),
                    LineEntry::Boq(_) => None,
                }));
                WbsRowBuilder::mark_groups(&mut record.wbs_lines);
                record.stage_flags.wbs_item_created = true;
            }
        }

        info!(
            boq_id = %record.identity,
            kind = %kind,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            total = result.total,
            "Import committed"
        );
        Ok(result)
    }

    /// Set a default and fill it into every line whose field is unset; returns the filled count
    pub fn propagate_default(
        &self,
        record: &mut BoqRecord,
        target: DefaultTarget,
        value: Option<String>,
    ) -> usize {
        let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        match target {
            DefaultTarget::BoqUom => record.boq_defaults.uom = value.clone(),
            DefaultTarget::BoqItemGroup => record.boq_defaults.item_group = value.clone(),
            DefaultTarget::WbsUom => record.wbs_defaults.uom = value.clone(),
            DefaultTarget::WbsItemGroup => record.wbs_defaults.item_group = value.clone(),
        }

        let Some(value) = value else {
            return 0;
        };

        let fields: Vec<&mut Option<String>> = match target {
            DefaultTarget::BoqUom => record.boq_lines.iter_mut().map(|l| &mut l.uom).collect(),
            DefaultTarget::BoqItemGroup => {
                record.boq_lines.iter_mut().map(|l| &mut l.item_group).collect()
            }
            DefaultTarget::WbsUom => record.wbs_lines.iter_mut().map(|l| &mut l.uom).collect(),
            DefaultTarget::WbsItemGroup => {
                record.wbs_lines.iter_mut().map(|l| &mut l.item_group).collect()
            }
        };

        let mut updated = 0;
        for field in fields {
            if is_unset(field) {
                *field = Some(value.clone());
                updated += 1;
            }
        }

        debug!(boq_id = %record.identity, ?target, updated, "Default propagated");
        updated
    }

    /// Link WBS lines to their BOQ lines and mark details as fetched
    pub fn load_fetched_details(
        &self,
        record: &mut BoqRecord,
    ) -> Result<FetchSummary, LifecycleError> {
        self.require(record, Action::LoadFetchedDetails)?;

        let index: HashMap<&str, &LineId> = record
            .boq_lines
            .iter()
            .map(|line| (line.boq_id.as_str(), &line.line_id))
            .collect();
        let links: Vec<(usize, LineId)> = record
            .wbs_lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.boq_line.is_none())
            .filter_map(|(pos, line)| {
                let boq_ref = line.boq_ref.as_deref()?;
                index.get(boq_ref).map(|id| (pos, (*id).clone()))
            })
            .collect();

        let relinked = links.len();
        for (pos, id) in links {
            record.wbs_lines[pos].boq_line = Some(id);
        }
        record.stage_flags.details_fetched = true;

        let summary = FetchSummary {
            boq_lines: record.boq_lines.len(),
            wbs_lines: record.wbs_lines.len(),
            relinked,
        };
        info!(boq_id = %record.identity, ?summary, "Details fetched");
        Ok(summary)
    }

    /// Request one catalog item per distinct unlinked item name and link every line using it
    pub async fn derive_missing_items(
        &self,
        record: &mut BoqRecord,
    ) -> Result<ItemDerivation, LifecycleError> {
        self.require(record, Action::CreateMissingItems)?;

        let source = self.settings.missing_item_source;
        let mut skipped = Vec::new();
        let mut signatures: Vec<ItemSignature> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        let mut consider = |collection: LineCollection,
                            line_id: &LineId,
                            name: &str,
                            group: &Option<String>,
                            uom: &Option<String>| {
            let name = name.trim();
            if name.is_empty() {
                skipped.push(SkippedLine {
                    collection,
                    line_id: line_id.clone(),
                    reason: SkipReason::NoItemName,
                });
                return;
            }
            if seen.contains_key(name) {
                return;
            }
            let Some(group) = group.as_deref().map(str::trim).filter(|g| !g.is_empty()) else {
                skipped.push(SkippedLine {
                    collection,
                    line_id: line_id.clone(),
                    reason: SkipReason::NoItemGroup,
                });
                return;
            };
            seen.insert(name.to_string(), signatures.len());
            signatures.push(ItemSignature {
                name: name.to_string(),
                item_group: group.to_string(),
                uom: uom.clone().filter(|u| !u.trim().is_empty()),
            });
        };

        if source.includes(LineCollection::BoqLines) {
            for line in record.boq_lines.iter().filter(|l| l.linked_item.is_none()) {
                consider(
                    LineCollection::BoqLines,
                    &line.line_id,
                    line.item_name.as_str(),
                    &line.item_group,
                    &line.uom,
                );
            }
        }
        if source.includes(LineCollection::WbsLines) {
            // group lines carry no item by construction
            for line in record
                .wbs_lines
                .iter()
                .filter(|l| !l.is_group && l.linked_item.is_none())
            {
                let name = line.item_code.as_deref().unwrap_or_default();
                consider(LineCollection::WbsLines, &line.line_id, name, &line.item_group, &line.uom);
            }
        }

        if signatures.is_empty() {
            info!(boq_id = %record.identity, skipped = skipped.len(), "No missing items to create");
            return Ok(DerivationResult::nothing_needed(skipped));
        }

        let mut resolved: HashMap<String, ItemRef> = HashMap::new();
        let mut created = Vec::with_capacity(signatures.len());
        for signature in &signatures {
            let item = self
                .catalog
                .find_or_create_item(signature)
                .await
                .map_err(|e| LifecycleError::collaborator("item catalog", e))?;
            resolved.insert(signature.name.clone(), item.clone());
            created.push(item);
        }

        // all catalog calls succeeded; apply links and flag together
        let mut linked: HashSet<LineId> = HashSet::new();
        if source.includes(LineCollection::BoqLines) {
            for line in record.boq_lines.iter_mut().filter(|l| l.linked_item.is_none()) {
                if let Some(item) = resolved.get(line.item_name.trim()) {
                    line.linked_item = Some(item.clone());
                    linked.insert(line.line_id.clone());
                }
            }
        }
        if source.includes(LineCollection::WbsLines) {
            for line in record
                .wbs_lines
                .iter_mut()
                .filter(|l| !l.is_group && l.linked_item.is_none())
            {
                let name = line.item_code.as_deref().unwrap_or_default().trim();
                if let Some(item) = resolved.get(name) {
                    line.linked_item = Some(item.clone());
                    linked.insert(line.line_id.clone());
                }
            }
        }
        record.stage_flags.missing_item_created = true;

        // a line without a group still gets linked when another line named the same item
        skipped.retain(|s| !linked.contains(&s.line_id));
        let updated_lines = linked.len();

        info!(
            boq_id = %record.identity,
            created = created.len(),
            updated_lines,
            skipped = skipped.len(),
            "Missing items created"
        );
        Ok(DerivationResult {
            created,
            updated_lines,
            skipped,
        })
    }

    /// Open one task per leaf WBS line that has none yet
    pub async fn derive_tasks(
        &self,
        record: &mut BoqRecord,
    ) -> Result<TaskDerivation, LifecycleError> {
        self.require(record, Action::CreateTask)?;

        let requests: Vec<(usize, WbsTaskRequest)> = record
            .wbs_lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_group && line.task.is_none())
            .map(|(pos, line)| {
                let subject = match line.description.as_deref().or(line.item_code.as_deref()) {
                    Some(text) => format!("{} {}", line.cost_code, text),
                    None => line.cost_code.clone(),
                };
                let request = WbsTaskRequest {
                    boq: record.identity.clone(),
                    project_ref: record.project_ref.clone(),
                    wbs_line: line.line_id.clone(),
                    cost_code: line.cost_code.clone(),
                    subject,
                    item: line.linked_item.clone(),
                    warehouse: record.warehouse.clone(),
                };
                (pos, request)
            })
            .collect();

        if requests.is_empty() {
            info!(boq_id = %record.identity, "No WBS lines need a task");
            return Ok(DerivationResult::nothing_needed(Vec::new()));
        }

        let mut assigned = Vec::with_capacity(requests.len());
        for (pos, request) in &requests {
            let task = self
                .tasks
                .create_task(request)
                .await
                .map_err(|e| LifecycleError::collaborator("task service", e))?;
            assigned.push((*pos, task));
        }

        let created: Vec<TaskRef> = assigned.iter().map(|(_, task)| task.clone()).collect();
        for (pos, task) in assigned {
            record.wbs_lines[pos].task = Some(task);
        }
        record.stage_flags.task_created = true;

        info!(boq_id = %record.identity, created = created.len(), "Tasks created");
        Ok(DerivationResult {
            updated_lines: created.len(),
            created,
            skipped: Vec::new(),
        })
    }

    /// Clear a line collection and every flag that depended on it
    pub fn reset_lines(&self, record: &mut BoqRecord, which: LineCollection) -> ResetSummary {
        let previous_flags = record.stage_flags;
        let flags = &mut record.stage_flags;
        let (removed_lines, cascaded_lines) = match which {
            LineCollection::BoqLines => {
                // WBS lines go too: their flag is cleared with them
                let removed = (record.boq_lines.len(), record.wbs_lines.len());
                record.boq_lines.clear();
                record.wbs_lines.clear();
                flags.boq_details_created = false;
                removed
            }
            LineCollection::WbsLines => {
                let removed = record.wbs_lines.len();
                record.wbs_lines.clear();
                (removed, 0)
            }
        };
        flags.wbs_item_created = false;
        flags.details_fetched = false;
        flags.missing_item_created = false;
        flags.task_created = false;

        info!(
            boq_id = %record.identity,
            which = %which,
            removed_lines,
            cascaded_lines,
            previous = %previous_flags,
            "Lines reset"
        );
        ResetSummary {
            which,
            removed_lines,
            cascaded_lines,
            previous_flags,
        }
    }
}
