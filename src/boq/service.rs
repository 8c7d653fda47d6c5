// BOQ service - load a record, run one lifecycle command, commit the result

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use super::actions::ActionSet;
use super::controller::{
    BoqLifecycleController, FetchSummary, ImportResult, ItemDerivation, ResetSummary,
    TaskDerivation,
};
use super::errors::LifecycleError;
use super::rows::RawRow;
use super::traits::RecordStore;
use super::types::{BoqId, BoqRecord, DefaultTarget, LineCollection};
use crate::telemetry::{create_lifecycle_span, generate_correlation_id};

/// One user-triggered lifecycle operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleCommand {
    Import {
        kind: LineCollection,
        rows: Vec<RawRow>,
    },
    PropagateDefault {
        target: DefaultTarget,
        value: Option<String>,
    },
    LoadFetchedDetails,
    DeriveMissingItems,
    DeriveTasks,
    Reset {
        which: LineCollection,
    },
}

impl LifecycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleCommand::Import { .. } => "import",
            LifecycleCommand::PropagateDefault { .. } => "propagate_default",
            LifecycleCommand::LoadFetchedDetails => "load_fetched_details",
            LifecycleCommand::DeriveMissingItems => "derive_missing_items",
            LifecycleCommand::DeriveTasks => "derive_tasks",
            LifecycleCommand::Reset { .. } => "reset_lines",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOutcome {
    Imported(ImportResult),
    DefaultPropagated { target: DefaultTarget, updated: usize },
    DetailsFetched(FetchSummary),
    ItemsDerived(ItemDerivation),
    TasksDerived(TaskDerivation),
    Reset(ResetSummary),
}

impl CommandOutcome {
    /// One-line message for the user
    pub fn summary(&self) -> String {
        match self {
            CommandOutcome::Imported(result) => result.summary(),
            CommandOutcome::DefaultPropagated { target, updated } => {
                format!("Default {target:?} applied to {updated} lines")
            }
            CommandOutcome::DetailsFetched(summary) => format!(
                "Loaded {} BOQ lines and {} WBS lines, {} newly linked",
                summary.boq_lines, summary.wbs_lines, summary.relinked
            ),
            CommandOutcome::ItemsDerived(result) if result.is_empty() => {
                "No missing items found".to_string()
            }
            CommandOutcome::ItemsDerived(result) => format!(
                "Created {} items, linked {} lines, skipped {}",
                result.created.len(),
                result.updated_lines,
                result.skipped.len()
            ),
            CommandOutcome::TasksDerived(result) if result.is_empty() => {
                "No WBS lines need a task".to_string()
            }
            CommandOutcome::TasksDerived(result) => {
                format!("Created {} tasks", result.created.len())
            }
            CommandOutcome::Reset(summary) if summary.cascaded_lines > 0 => format!(
                "Removed {} {} and {} dependent wbs_lines",
                summary.removed_lines, summary.which, summary.cascaded_lines
            ),
            CommandOutcome::Reset(summary) => {
                format!("Removed {} {}", summary.removed_lines, summary.which)
            }
        }
    }
}

/// Result of a command together with the record as it now stands in the store
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    pub outcome: CommandOutcome,
    pub record: BoqRecord,
    pub committed: bool,
}

#[derive(Clone)]
pub struct BoqService {
    store: Arc<dyn RecordStore>,
    controller: BoqLifecycleController,
}

impl std::fmt::Debug for BoqService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoqService")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl BoqService {
    pub fn new(store: Arc<dyn RecordStore>, controller: BoqLifecycleController) -> Self {
        Self { store, controller }
    }

    pub fn controller(&self) -> &BoqLifecycleController {
        &self.controller
    }

    pub async fn create_record(&self, record: BoqRecord) -> Result<BoqRecord, LifecycleError> {
        let created = self.store.create(record).await?;
        info!(boq_id = %created.identity, project = %created.project_ref, "BOQ record created");
        Ok(created)
    }

    /// Load a record, refusing ones whose persisted flags break the stage invariants
    pub async fn load(&self, id: &BoqId) -> Result<BoqRecord, LifecycleError> {
        let record = self.store.load(id).await?;
        let violations = record.stage_flags.check_invariants();
        if !violations.is_empty() {
            warn!(boq_id = %id, ?violations, "Persisted record has inconsistent flags");
            return Err(LifecycleError::InvalidRecord {
                id: id.clone(),
                violations,
            });
        }
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<BoqId>, LifecycleError> {
        Ok(self.store.list().await?)
    }

    pub async fn available_actions(&self, id: &BoqId) -> Result<ActionSet, LifecycleError> {
        let record = self.load(id).await?;
        Ok(self.controller.available_actions(&record))
    }

    /// Run `command` against a working copy and commit it only when the
    /// command succeeded and changed something
    pub async fn run(
        &self,
        id: &BoqId,
        command: LifecycleCommand,
    ) -> Result<CommandReport, LifecycleError> {
        let correlation_id = generate_correlation_id();
        let span = create_lifecycle_span(command.name(), id.as_str(), Some(&correlation_id));
        self.run_inner(id, command).instrument(span).await
    }

    async fn run_inner(
        &self,
        id: &BoqId,
        command: LifecycleCommand,
    ) -> Result<CommandReport, LifecycleError> {
        let record = self.load(id).await?;
        let mut working = record.clone();

        let outcome = match command {
            LifecycleCommand::Import { kind, rows } => CommandOutcome::Imported(
                self.controller.apply_import(&mut working, kind, &rows)?,
            ),
            LifecycleCommand::PropagateDefault { target, value } => {
                let updated = self.controller.propagate_default(&mut working, target, value);
                CommandOutcome::DefaultPropagated { target, updated }
            }
            LifecycleCommand::LoadFetchedDetails => {
                CommandOutcome::DetailsFetched(self.controller.load_fetched_details(&mut working)?)
            }
            LifecycleCommand::DeriveMissingItems => CommandOutcome::ItemsDerived(
                self.controller.derive_missing_items(&mut working).await?,
            ),
            LifecycleCommand::DeriveTasks => {
                CommandOutcome::TasksDerived(self.controller.derive_tasks(&mut working).await?)
            }
            LifecycleCommand::Reset { which } => {
                CommandOutcome::Reset(self.controller.reset_lines(&mut working, which))
            }
        };

        if working == record {
            info!(boq_id = %id, "Command left the record unchanged; nothing to commit");
            return Ok(CommandReport {
                outcome,
                record,
                committed: false,
            });
        }

        let committed = self.store.commit(working).await?;
        info!(
            boq_id = %id,
            version = committed.version,
            flags = %committed.stage_flags,
            "{}",
            outcome.summary()
        );
        Ok(CommandReport {
            outcome,
            record: committed,
            committed: true,
        })
    }

    /// Run an import on a background task
    pub fn spawn_import(
        &self,
        id: BoqId,
        kind: LineCollection,
        rows: Vec<RawRow>,
    ) -> JoinHandle<Result<CommandReport, LifecycleError>> {
        let service = self.clone();
        tokio::spawn(async move {
            service
                .run(&id, LifecycleCommand::Import { kind, rows })
                .await
        })
    }
}
