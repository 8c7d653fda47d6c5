use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use boq_lifecycle::boq::{
    BoqLifecycleController, BoqService, FileItemCatalog, FileRecordStore, FileTaskService,
    TracingProgress,
};
use boq_lifecycle::BoqLifecycleConfig;

pub mod lifecycle;
pub mod record;

/// Build a service over the file store and file-backed collaborators.
/// Catalog and task ledgers live under `<data_dir>/catalog/`.
pub fn build_service(config: &BoqLifecycleConfig, data_dir: Option<PathBuf>) -> Result<BoqService> {
    let data_dir = data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    let store = FileRecordStore::new(&data_dir)?;
    let ledgers = data_dir.join("catalog");

    let mut catalog = FileItemCatalog::open(
        ledgers.join("items.json"),
        config.derivation.default_stock_uom.clone(),
    )?
    .with_max_name_len(config.import.item_name_max_len);
    for (group, prefix) in &config.derivation.group_codes {
        catalog = catalog.with_group_code(group, prefix);
    }
    let tasks = FileTaskService::open(ledgers.join("tasks.json"))?;

    let controller = BoqLifecycleController::new(Arc::new(catalog), Arc::new(tasks))
        .with_progress(Arc::new(TracingProgress))
        .with_settings(config.controller_settings());

    tracing::debug!(data_dir = %data_dir.display(), "BOQ service ready");
    Ok(BoqService::new(Arc::new(store), controller))
}
