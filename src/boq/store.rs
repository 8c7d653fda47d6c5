// Record stores: commits replace flags and lines of one record as a unit

use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::errors::StoreError;
use super::traits::RecordStore;
use super::types::{BoqId, BoqRecord};

fn check_version(id: &BoqId, expected: u64, found: u64) -> Result<(), StoreError> {
    if expected != found {
        return Err(StoreError::VersionConflict {
            id: id.clone(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<BoqId, BoqRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, mut record: BoqRecord) -> Result<BoqRecord, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.identity) {
            return Err(StoreError::AlreadyExists(record.identity));
        }
        record.version = 1;
        records.insert(record.identity.clone(), record.clone());
        Ok(record)
    }

    async fn load(&self, id: &BoqId) -> Result<BoqRecord, StoreError> {
        let records = self.records.read().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn commit(&self, mut record: BoqRecord) -> Result<BoqRecord, StoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .get(&record.identity)
            .ok_or_else(|| StoreError::NotFound(record.identity.clone()))?;
        check_version(&record.identity, record.version, stored.version)?;
        record.version += 1;
        records.insert(record.identity.clone(), record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<BoqId>, StoreError> {
        let records = self.records.read().await;
        let mut ids: Vec<BoqId> = records.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Run `f` with `lock_path` held exclusively
fn with_lock<T>(lock_path: &Path, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    let mut lock = FileLock::new(file);
    let _guard = lock.write().map_err(|e| StoreError::Lock {
        reason: format!("{}: {e}", lock_path.display()),
    })?;
    f()
}

/// Replace `path` by renaming a fully written temp file over it
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

/// A JSON document shared between processes. Updates hold `<file>.lock`
/// exclusively and are written with a temp file and rename.
#[derive(Debug, Clone)]
pub struct LockedDocument {
    path: PathBuf,
}

impl LockedDocument {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current content, or `T::default()` before the first write
    pub async fn read<T>(&self) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let path = self.path.clone();
        blocking(move || Self::read_or_default(&path)).await
    }

    /// Apply `f` to the current content; the document is rewritten only when `f` changed it
    pub async fn update<T, R, F>(&self, f: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path();
        blocking(move || {
            with_lock(&lock_path, || {
                let current: T = Self::read_or_default(&path)?;
                let mut next = current.clone();
                let result = f(&mut next);
                if next != current {
                    write_json(&path, &next)?;
                }
                Ok(result)
            })
        })
        .await
    }
}

/// One JSON document per record. Writers hold an exclusive file lock and
/// replace the document by renaming a fully written temp file.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    data_dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Percent-encodes every byte outside `[A-Za-z0-9_-]`, so distinct ids never share a file
    fn file_stem(id: &BoqId) -> String {
        let mut stem = String::with_capacity(id.as_str().len());
        for byte in id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("%{byte:02X}"));
            }
        }
        stem
    }

    fn record_path(&self, id: &BoqId) -> PathBuf {
        self.data_dir.join(format!("{}.json", Self::file_stem(id)))
    }

    fn lock_path(&self, id: &BoqId) -> PathBuf {
        self.data_dir.join(format!("{}.lock", Self::file_stem(id)))
    }

    fn read_record(path: &Path, id: &BoqId) -> Result<BoqRecord, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let record: BoqRecord = serde_json::from_str(&content)?;
        if record.identity != *id {
            warn!(
                requested = %id,
                stored = %record.identity,
                path = %path.display(),
                "Record file holds a different identity"
            );
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(record)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn create(&self, mut record: BoqRecord) -> Result<BoqRecord, StoreError> {
        let path = self.record_path(&record.identity);
        let lock_path = self.lock_path(&record.identity);
        blocking(move || {
            with_lock(&lock_path, || {
                if path.exists() {
                    return Err(StoreError::AlreadyExists(record.identity.clone()));
                }
                record.version = 1;
                write_json(&path, &record)?;
                info!(boq_id = %record.identity, path = %path.display(), "Record created");
                Ok(record)
            })
        })
        .await
    }

    async fn load(&self, id: &BoqId) -> Result<BoqRecord, StoreError> {
        let path = self.record_path(id);
        let id = id.clone();
        blocking(move || Self::read_record(&path, &id)).await
    }

    async fn commit(&self, mut record: BoqRecord) -> Result<BoqRecord, StoreError> {
        let path = self.record_path(&record.identity);
        let lock_path = self.lock_path(&record.identity);
        blocking(move || {
            with_lock(&lock_path, || {
                let stored = Self::read_record(&path, &record.identity)?;
                check_version(&record.identity, record.version, stored.version)?;
                record.version += 1;
                write_json(&path, &record)?;
                debug!(boq_id = %record.identity, version = record.version, "Record committed");
                Ok(record)
            })
        })
        .await
    }

    async fn list(&self) -> Result<Vec<BoqId>, StoreError> {
        let dir = self.data_dir.clone();
        blocking(move || {
            let mut ids = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let content = fs::read_to_string(&path)?;
                let record: BoqRecord = serde_json::from_str(&content)?;
                ids.push(record.identity);
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}
