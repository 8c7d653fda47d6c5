// Mock collaborators for testing - record every call, no side effects

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::boq::traits::*;
use crate::boq::types::{ItemRef, TaskRef};

/// Mock item catalog handing out `ITEM-<n>` references
#[derive(Debug, Default)]
pub struct MockItemCatalog {
    pub requests: Mutex<Vec<ItemSignature>>,
    pub items: Mutex<HashMap<String, ItemRef>>,
    pub failing: Mutex<Option<String>>,
}

impl MockItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request for `name`
    pub fn fail_on(&self, name: &str) {
        *self.failing.lock().unwrap() = Some(name.to_string());
    }

    pub fn requested_names(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|sig| sig.name.clone())
            .collect()
    }
}

#[async_trait]
impl ItemCatalog for MockItemCatalog {
    async fn find_or_create_item(&self, signature: &ItemSignature) -> Result<ItemRef> {
        self.requests.lock().unwrap().push(signature.clone());
        if self.failing.lock().unwrap().as_deref() == Some(signature.name.as_str()) {
            return Err(anyhow!("catalog unavailable for {}", signature.name));
        }
        let mut items = self.items.lock().unwrap();
        let next = items.len() + 1;
        Ok(items
            .entry(signature.name.clone())
            .or_insert_with(|| ItemRef::new(format!("ITEM-{next:04}")))
            .clone())
    }
}

/// Mock task service handing out `T-<n>` references
#[derive(Debug, Default)]
pub struct MockTaskService {
    pub requests: Mutex<Vec<WbsTaskRequest>>,
    pub failing: Mutex<Option<String>>,
}

impl MockTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the request for WBS cost code `code`
    pub fn fail_on(&self, code: &str) {
        *self.failing.lock().unwrap() = Some(code.to_string());
    }

    pub fn requested_cost_codes(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|req| req.cost_code.clone())
            .collect()
    }
}

#[async_trait]
impl TaskService for MockTaskService {
    async fn create_task(&self, request: &WbsTaskRequest) -> Result<TaskRef> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        if self.failing.lock().unwrap().as_deref() == Some(request.cost_code.as_str()) {
            return Err(anyhow!("task service rejected {}", request.cost_code));
        }
        Ok(TaskRef::new(format!("T-{}", requests.len())))
    }
}

/// Keeps every progress notification
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn percents(&self) -> Vec<u8> {
        self.updates.lock().unwrap().iter().map(|u| u.percent).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
