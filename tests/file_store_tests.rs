// File-backed record store: persistence across store instances and stale-writer rejection

use boq_lifecycle::boq::rows::{COL_BOQ_ID, COL_ITEM_COST_CODE};
use boq_lifecycle::boq::{
    BoqId, BoqLifecycleController, BoqRecord, BoqService, FileRecordStore, InMemoryItemCatalog,
    InMemoryTaskService, LifecycleCommand, LifecycleError, LineCollection, RawRow, RecordStore,
    StoreError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn service_over(dir: &TempDir) -> BoqService {
    let controller = BoqLifecycleController::new(
        Arc::new(InMemoryItemCatalog::new("Nos")),
        Arc::new(InMemoryTaskService::new()),
    );
    BoqService::new(Arc::new(FileRecordStore::new(dir.path()).unwrap()), controller)
}

#[tokio::test]
async fn test_records_survive_a_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let id = BoqId::new("BOQ-FS");
    {
        let service = service_over(&dir);
        service.create_record(BoqRecord::new(id.clone(), "PRJ")).await.unwrap();
        service
            .run(
                &id,
                LifecycleCommand::Import {
                    kind: LineCollection::BoqLines,
                    rows: vec![RawRow::new(0)
                        .with(COL_BOQ_ID, "B-1")
                        .with(COL_ITEM_COST_CODE, "CC-1")],
                },
            )
            .await
            .unwrap();
    }

    let reopened = service_over(&dir);
    let record = reopened.load(&id).await.unwrap();
    assert_eq!(record.version, 2);
    assert!(record.stage_flags.boq_details_created);
    assert_eq!(record.boq_lines.len(), 1);
    assert_eq!(reopened.list().await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_stale_writer_is_rejected() {
    let dir = TempDir::new().unwrap();
    let first = FileRecordStore::new(dir.path()).unwrap();
    let second = FileRecordStore::new(dir.path()).unwrap();
    let id = BoqId::new("BOQ-RACE");
    first.create(BoqRecord::new(id.clone(), "PRJ")).await.unwrap();

    let mut mine = first.load(&id).await.unwrap();
    let mut theirs = second.load(&id).await.unwrap();
    theirs.warehouse = Some("Yard".to_string());
    second.commit(theirs).await.unwrap();

    mine.warehouse = Some("Depot".to_string());
    let err = first.commit(mine).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { expected: 1, found: 2, .. }));
    assert_eq!(first.load(&id).await.unwrap().warehouse.as_deref(), Some("Yard"));
}

#[tokio::test]
async fn test_unknown_record_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let service = service_over(&dir);
    let err = service
        .run(&BoqId::new("missing"), LifecycleCommand::LoadFetchedDetails)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Store(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = service_over(&dir);
    service.create_record(BoqRecord::new(BoqId::new("BOQ-1"), "PRJ")).await.unwrap();
    let err = service
        .create_record(BoqRecord::new(BoqId::new("BOQ-1"), "PRJ"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Store(StoreError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_ids_differing_in_punctuation_stay_separate() {
    let dir = TempDir::new().unwrap();
    let service = service_over(&dir);
    let slash = BoqId::new("BOQ/1");
    let space = BoqId::new("BOQ 1");
    service.create_record(BoqRecord::new(slash.clone(), "PRJ")).await.unwrap();

    let err = service.run(&space, LifecycleCommand::LoadFetchedDetails).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Store(StoreError::NotFound(_))));

    service.create_record(BoqRecord::new(space.clone(), "PRJ")).await.unwrap();
    service
        .run(
            &space,
            LifecycleCommand::Import {
                kind: LineCollection::BoqLines,
                rows: vec![RawRow::new(0)
                    .with(COL_BOQ_ID, "B-1")
                    .with(COL_ITEM_COST_CODE, "CC-1")],
            },
        )
        .await
        .unwrap();

    let untouched = service.load(&slash).await.unwrap();
    assert_eq!(untouched.version, 1);
    assert!(untouched.boq_lines.is_empty());
    assert_eq!(service.load(&space).await.unwrap().boq_lines.len(), 1);
}
