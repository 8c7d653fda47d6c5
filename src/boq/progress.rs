// Progress channel implementations for long-running imports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use super::traits::{ProgressSink, ProgressUpdate};

/// Drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, update: ProgressUpdate) {
        tracing::info!(
            session = %update.session,
            processed = update.processed,
            total = update.total,
            percent = update.percent,
            "{}",
            update.message
        );
    }
}

/// Forwards notifications to a tokio channel; a closed receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, update: ProgressUpdate) {
        let _ = self.sender.send(update);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
}

/// Snapshot of one import session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session: String,
    pub status: SessionStatus,
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
    pub last_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory tracker; keeps the percentage of a session non-decreasing even
/// when notifications arrive out of order
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    sessions: Arc<RwLock<HashMap<String, SessionProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_progress(&self, session: &str) -> Option<SessionProgress> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session).cloned()
    }

    pub fn complete_session(&self, session: &str, status: SessionStatus) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(progress) = sessions.get_mut(session) {
            progress.status = status;
            progress.completed_at = Some(Utc::now());
            if status == SessionStatus::Completed {
                progress.percent = 100;
            }
        }
    }

    /// Forget finished sessions older than `max_age_hours`
    pub fn cleanup_old_sessions(&self, max_age_hours: i64) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        sessions.retain(|_, progress| match progress.completed_at {
            Some(done) => (now - done).num_hours() < max_age_hours,
            None => true,
        });
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, update: ProgressUpdate) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let entry = sessions
            .entry(update.session.clone())
            .or_insert_with(|| SessionProgress {
                session: update.session.clone(),
                status: SessionStatus::InProgress,
                processed: 0,
                total: update.total,
                percent: 0,
                last_message: None,
                started_at: Utc::now(),
                completed_at: None,
            });
        if update.percent < entry.percent {
            return;
        }
        entry.processed = update.processed;
        entry.total = update.total;
        entry.percent = update.percent;
        entry.last_message = Some(update.message);
    }
}

/// Emits a notification every `interval` rows and on the last row
pub(crate) struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    session: String,
    total: usize,
    interval: usize,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, session: String, total: usize, interval: usize) -> Self {
        Self {
            sink,
            session,
            total,
            interval: interval.max(1),
        }
    }

    pub(crate) fn row_done(&self, processed: usize, label: &str) {
        if processed % self.interval != 0 && processed != self.total {
            return;
        }
        let percent = if self.total == 0 {
            100
        } else {
            ((processed * 100) / self.total).min(100) as u8
        };
        self.sink.report(ProgressUpdate {
            session: self.session.clone(),
            processed,
            total: self.total,
            percent,
            message: format!("Processing row {processed}/{} - {label}", self.total),
        });
    }
}
