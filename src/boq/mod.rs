// BOQ lifecycle domain: record model, precondition table, controller and collaborators

pub mod actions;
pub mod catalog;
pub mod controller;
pub mod errors;
pub mod parsers;
pub mod progress;
pub mod rows;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod mocks;

pub use actions::{available_actions, Action, ActionSet};
pub use catalog::{
    CatalogItem, FileItemCatalog, FileTaskService, InMemoryItemCatalog, InMemoryTaskService,
};
pub use controller::{
    BoqLifecycleController, ControllerSettings, DerivationResult, FetchSummary, ImportOutcome,
    ImportResult, ItemDerivation, LineEntry, MissingItemSource, ResetSummary, RowFailure,
    SkipReason, SkippedLine, TaskDerivation,
};
pub use errors::{LifecycleError, RowError, StoreError};
pub use parsers::{parser_for, CsvRowParser, JsonRowParser};
pub use progress::{ChannelProgress, NoopProgress, ProgressTracker, SessionStatus, TracingProgress};
pub use rows::{ImportSettings, RawRow};
pub use service::{BoqService, CommandOutcome, CommandReport, LifecycleCommand};
pub use store::{FileRecordStore, InMemoryRecordStore, LockedDocument};
pub use traits::{
    ItemCatalog, ItemSignature, ProgressSink, ProgressUpdate, RecordStore, RowParser, TaskService,
    WbsTaskRequest,
};
pub use types::{
    BoqId, BoqLine, BoqRecord, DefaultTarget, FlagViolation, ItemRef, LineCollection,
    LineDefaults, LineId, StageFlags, TaskRef, WbsLine,
};
