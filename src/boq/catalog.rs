// Reference item catalog and task service: in-process for tests, file-backed for the CLI

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::store::LockedDocument;
use super::traits::{ItemCatalog, ItemSignature, TaskService, WbsTaskRequest};
use super::types::{ItemRef, TaskRef};

/// An item definition held by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_ref: ItemRef,
    pub item_name: String,
    pub item_group: String,
    pub stock_uom: String,
}

/// Naming-series prefix for an item group: the configured group code, or the
/// initials of the group's words followed by a dash
pub fn series_prefix(item_group: &str, group_codes: &HashMap<String, String>) -> String {
    if let Some(code) = group_codes.get(item_group) {
        return code.clone();
    }
    let initials: String = item_group
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    format!("{initials}-")
}

#[derive(Debug, Clone)]
struct NamingRules {
    group_codes: HashMap<String, String>,
    default_stock_uom: String,
    max_name_len: usize,
}

impl NamingRules {
    fn new(default_stock_uom: String) -> Self {
        Self {
            group_codes: HashMap::new(),
            default_stock_uom,
            max_name_len: 140,
        }
    }

    /// Catalog name for `signature`, rejecting signatures no item can be made from
    fn item_name(&self, signature: &ItemSignature) -> Result<String> {
        let name: String = signature.name.trim().chars().take(self.max_name_len).collect();
        if name.is_empty() {
            bail!("item name is required");
        }
        if signature.item_group.trim().is_empty() {
            bail!("item group is required to create '{name}'");
        }
        Ok(name)
    }
}

/// Items by name plus the last number issued per naming series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CatalogState {
    by_name: HashMap<String, CatalogItem>,
    counters: HashMap<String, u32>,
}

impl CatalogState {
    fn find_or_create(&mut self, name: String, signature: &ItemSignature, rules: &NamingRules) -> ItemRef {
        if let Some(existing) = self.by_name.get(&name) {
            return existing.item_ref.clone();
        }

        let prefix = series_prefix(&signature.item_group, &rules.group_codes);
        let counter = self.counters.entry(prefix.clone()).or_insert(0);
        *counter += 1;
        let item_ref = ItemRef::new(format!("{prefix}{:05}", *counter));

        let item = CatalogItem {
            item_ref: item_ref.clone(),
            item_name: name.clone(),
            item_group: signature.item_group.clone(),
            stock_uom: signature
                .uom
                .clone()
                .unwrap_or_else(|| rules.default_stock_uom.clone()),
        };
        tracing::debug!(item = %item_ref, name = %name, "Catalog item created");
        self.by_name.insert(name, item);
        item_ref
    }

    fn items(&self) -> Vec<CatalogItem> {
        let mut items: Vec<CatalogItem> = self.by_name.values().cloned().collect();
        items.sort_by(|a, b| a.item_ref.cmp(&b.item_ref));
        items
    }
}

#[derive(Debug)]
pub struct InMemoryItemCatalog {
    state: Mutex<CatalogState>,
    rules: NamingRules,
}

impl InMemoryItemCatalog {
    pub fn new(default_stock_uom: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(CatalogState::default()),
            rules: NamingRules::new(default_stock_uom.into()),
        }
    }

    pub fn with_group_code(mut self, item_group: &str, prefix: &str) -> Self {
        self.rules.group_codes.insert(item_group.to_string(), prefix.to_string());
        self
    }

    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.rules.max_name_len = max_name_len;
        self
    }

    /// Register an item that already exists
    pub async fn insert(&self, item: CatalogItem) {
        let mut state = self.state.lock().await;
        state.by_name.insert(item.item_name.clone(), item);
    }

    pub async fn items(&self) -> Vec<CatalogItem> {
        self.state.lock().await.items()
    }
}

#[async_trait]
impl ItemCatalog for InMemoryItemCatalog {
    async fn find_or_create_item(&self, signature: &ItemSignature) -> Result<ItemRef> {
        let name = self.rules.item_name(signature)?;
        let mut state = self.state.lock().await;
        Ok(state.find_or_create(name, signature, &self.rules))
    }
}

/// Item catalog kept in a JSON file, so naming series continue across processes
#[derive(Debug, Clone)]
pub struct FileItemCatalog {
    document: LockedDocument,
    rules: NamingRules,
}

impl FileItemCatalog {
    pub fn open(path: impl Into<PathBuf>, default_stock_uom: impl Into<String>) -> Result<Self> {
        Ok(Self {
            document: LockedDocument::new(path)?,
            rules: NamingRules::new(default_stock_uom.into()),
        })
    }

    pub fn with_group_code(mut self, item_group: &str, prefix: &str) -> Self {
        self.rules.group_codes.insert(item_group.to_string(), prefix.to_string());
        self
    }

    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.rules.max_name_len = max_name_len;
        self
    }

    pub async fn items(&self) -> Result<Vec<CatalogItem>> {
        let state: CatalogState = self.document.read().await?;
        Ok(state.items())
    }
}

#[async_trait]
impl ItemCatalog for FileItemCatalog {
    async fn find_or_create_item(&self, signature: &ItemSignature) -> Result<ItemRef> {
        let name = self.rules.item_name(signature)?;
        let rules = self.rules.clone();
        let signature = signature.clone();
        let item_ref = self
            .document
            .update(move |state: &mut CatalogState| state.find_or_create(name, &signature, &rules))
            .await
            .with_context(|| format!("item catalog at {}", self.document.path().display()))?;
        Ok(item_ref)
    }
}

/// Every task issued so far, numbered `TASK-0001`, `TASK-0002`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TaskLedger {
    tasks: Vec<(TaskRef, WbsTaskRequest)>,
}

impl TaskLedger {
    fn issue(&mut self, request: WbsTaskRequest) -> TaskRef {
        let task = TaskRef::new(format!("TASK-{:04}", self.tasks.len() + 1));
        self.tasks.push((task.clone(), request));
        task
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskService {
    ledger: Mutex<TaskLedger>,
}

impl InMemoryTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tasks(&self) -> Vec<(TaskRef, WbsTaskRequest)> {
        self.ledger.lock().await.tasks.clone()
    }
}

#[async_trait]
impl TaskService for InMemoryTaskService {
    async fn create_task(&self, request: &WbsTaskRequest) -> Result<TaskRef> {
        Ok(self.ledger.lock().await.issue(request.clone()))
    }
}

/// Task service keeping its ledger in a JSON file
#[derive(Debug, Clone)]
pub struct FileTaskService {
    document: LockedDocument,
}

impl FileTaskService {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            document: LockedDocument::new(path)?,
        })
    }

    pub async fn tasks(&self) -> Result<Vec<(TaskRef, WbsTaskRequest)>> {
        let ledger: TaskLedger = self.document.read().await?;
        Ok(ledger.tasks)
    }
}

#[async_trait]
impl TaskService for FileTaskService {
    async fn create_task(&self, request: &WbsTaskRequest) -> Result<TaskRef> {
        let request = request.clone();
        let task = self
            .document
            .update(move |ledger: &mut TaskLedger| ledger.issue(request))
            .await
            .with_context(|| format!("task ledger at {}", self.document.path().display()))?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(name: &str, group: &str) -> ItemSignature {
        ItemSignature {
            name: name.to_string(),
            item_group: group.to_string(),
            uom: None,
        }
    }

    #[test]
    fn test_series_prefix_from_initials() {
        let codes = HashMap::new();
        assert_eq!(series_prefix("Construction Supplies", &codes), "CS-");
        assert_eq!(series_prefix("civil  works", &codes), "CW-");
    }

    #[test]
    fn test_series_prefix_prefers_group_code() {
        let mut codes = HashMap::new();
        codes.insert("Materials".to_string(), "MAT-".to_string());
        assert_eq!(series_prefix("Materials", &codes), "MAT-");
    }

    #[tokio::test]
    async fn test_catalog_is_idempotent_per_name() {
        let catalog = InMemoryItemCatalog::new("Nos");
        let first = catalog
            .find_or_create_item(&signature("Cement", "Construction Supplies"))
            .await
            .unwrap();
        let second = catalog
            .find_or_create_item(&signature(" Cement ", "Construction Supplies"))
            .await
            .unwrap();
        let other = catalog
            .find_or_create_item(&signature("Sand", "Construction Supplies"))
            .await
            .unwrap();
        assert_eq!(first, ItemRef::new("CS-00001"));
        assert_eq!(first, second);
        assert_eq!(other, ItemRef::new("CS-00002"));
        let items = catalog.items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].stock_uom, "Nos");
    }

    #[tokio::test]
    async fn test_catalog_finds_existing_items() {
        let catalog = InMemoryItemCatalog::new("Nos");
        catalog
            .insert(CatalogItem {
                item_ref: ItemRef::new("STL-001"),
                item_name: "Steel".to_string(),
                item_group: "Metals".to_string(),
                stock_uom: "Kg".to_string(),
            })
            .await;
        let found = catalog
            .find_or_create_item(&signature("Steel", "Metals"))
            .await
            .unwrap();
        assert_eq!(found, ItemRef::new("STL-001"));
    }

    #[tokio::test]
    async fn test_catalog_requires_group() {
        let catalog = InMemoryItemCatalog::new("Nos");
        assert!(catalog.find_or_create_item(&signature("Steel", " ")).await.is_err());
    }

    #[tokio::test]
    async fn test_task_numbering() {
        let service = InMemoryTaskService::new();
        let request = WbsTaskRequest {
            boq: "BOQ-1".into(),
            project_ref: "PRJ".to_string(),
            wbs_line: "L1".into(),
            cost_code: "W-01".to_string(),
            subject: "W-01".to_string(),
            item: None,
            warehouse: None,
        };
        assert_eq!(service.create_task(&request).await.unwrap(), TaskRef::new("TASK-0001"));
        assert_eq!(service.create_task(&request).await.unwrap(), TaskRef::new("TASK-0002"));
        assert_eq!(service.tasks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_file_catalog_continues_series_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog").join("items.json");

        let first = FileItemCatalog::open(&path, "Nos").unwrap();
        let cement = first
            .find_or_create_item(&signature("Cement", "Construction Supplies"))
            .await
            .unwrap();

        let second = FileItemCatalog::open(&path, "Nos").unwrap();
        let sand = second
            .find_or_create_item(&signature("Sand", "Construction Supplies"))
            .await
            .unwrap();
        let cement_again = second
            .find_or_create_item(&signature("Cement", "Construction Supplies"))
            .await
            .unwrap();

        assert_eq!(cement, ItemRef::new("CS-00001"));
        assert_eq!(sand, ItemRef::new("CS-00002"));
        assert_eq!(cement_again, cement);
        assert_eq!(second.items().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_catalog_validates_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        let catalog = FileItemCatalog::open(&path, "Nos").unwrap();
        assert!(catalog.find_or_create_item(&signature("Steel", "")).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_task_numbering_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let request = WbsTaskRequest {
            boq: "BOQ-1".into(),
            project_ref: "PRJ".to_string(),
            wbs_line: "L1".into(),
            cost_code: "W-01".to_string(),
            subject: "W-01".to_string(),
            item: None,
            warehouse: Some("Main Store".to_string()),
        };

        let first = FileTaskService::open(&path).unwrap();
        assert_eq!(first.create_task(&request).await.unwrap(), TaskRef::new("TASK-0001"));
        let second = FileTaskService::open(&path).unwrap();
        assert_eq!(second.create_task(&request).await.unwrap(), TaskRef::new("TASK-0002"));
        let tasks = second.tasks().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].1.warehouse.as_deref(), Some("Main Store"));
    }
}
