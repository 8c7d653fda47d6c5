// BOQ Lifecycle Library - Bill of Quantities / WBS import and derivation workflow
// This exposes the core components for testing and integration

pub mod boq;
pub mod config;
pub mod telemetry;

// Re-export key types for easy access
pub use boq::{
    available_actions, Action, ActionSet, BoqId, BoqLifecycleController, BoqRecord, BoqService,
    CommandOutcome, CommandReport, FileRecordStore, ImportResult, InMemoryItemCatalog,
    InMemoryRecordStore, InMemoryTaskService, LifecycleCommand, LifecycleError, LineCollection,
    RawRow, StageFlags,
};
pub use config::{config, init_config, BoqLifecycleConfig};
pub use telemetry::{
    create_lifecycle_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
