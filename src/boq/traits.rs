// Collaborator interfaces - the controller reaches external services only through these

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::errors::StoreError;
use super::rows::RawRow;
use super::types::{BoqId, BoqRecord, ItemRef, LineId, TaskRef};

/// Tabular input parser
pub trait RowParser: Send + Sync {
    /// Parse every data row of `path`; row-level problems surface later during construction
    fn parse(&self, path: &Path) -> Result<Vec<RawRow>>;
}

/// What identifies a missing item across lines
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemSignature {
    /// Trimmed item name, the deduplication key
    pub name: String,
    pub item_group: String,
    pub uom: Option<String>,
}

/// Item catalog
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Idempotent per signature name: repeated calls return the same reference
    async fn find_or_create_item(&self, signature: &ItemSignature) -> Result<ItemRef>;
}

/// What the task service needs to open a task for one WBS line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbsTaskRequest {
    pub boq: BoqId,
    pub project_ref: String,
    pub wbs_line: LineId,
    pub cost_code: String,
    pub subject: String,
    pub item: Option<ItemRef>,
    /// Warehouse of the BOQ record, where the task draws material from
    #[serde(default)]
    pub warehouse: Option<String>,
}

/// Task service
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, request: &WbsTaskRequest) -> Result<TaskRef>;
}

/// Record persistence with all-or-nothing commits
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a brand-new record
    async fn create(&self, record: BoqRecord) -> Result<BoqRecord, StoreError>;

    async fn load(&self, id: &BoqId) -> Result<BoqRecord, StoreError>;

    /// Replace the stored record if its version still equals `record.version`.
    /// Returns the committed record with its bumped version.
    async fn commit(&self, record: BoqRecord) -> Result<BoqRecord, StoreError>;

    async fn list(&self) -> Result<Vec<BoqId>, StoreError>;
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub session: String,
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
    pub message: String,
}

/// Fire-and-forget progress channel; delivery is not guaranteed
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}
