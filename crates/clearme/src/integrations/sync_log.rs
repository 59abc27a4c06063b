use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::workflows::clearance::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Student,
    Clearance,
    Signature,
}

impl SyncType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "clearance" => Some(Self::Clearance),
            "signature" => Some(Self::Signature),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToExternal,
    FromExternal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
    Pending,
}

impl SyncStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Immutable record of one synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub direction: SyncDirection,
    pub status: SyncStatus,
    pub external_id: String,
    pub local_id: String,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncLogEntry {
    pub fn new(
        sync_type: SyncType,
        direction: SyncDirection,
        status: SyncStatus,
        local_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            direction,
            status,
            external_id: String::new(),
            local_id: local_id.into(),
            error_message: None,
            timestamp: now,
            retry_count: 0,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = external_id.into();
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub sync_type: Option<SyncType>,
    pub status: Option<SyncStatus>,
    pub limit: Option<usize>,
}

/// Append-only, observability-only log of sync attempts.
pub trait SyncLogStore: Send + Sync {
    fn record(&self, entry: SyncLogEntry) -> Result<(), RepositoryError>;
    /// Matching entries, most recent first.
    fn query(&self, filter: &SyncLogFilter) -> Result<Vec<SyncLogEntry>, RepositoryError>;
}

/// Record and swallow failures; the log must never fail the caller.
pub fn record_quietly(log: &dyn SyncLogStore, entry: SyncLogEntry) {
    if let Err(error) = log.record(entry) {
        warn!(%error, "failed to append sync log entry");
    }
}

/// In-memory ring that evicts the oldest entry beyond `capacity`.
#[derive(Debug)]
pub struct BoundedSyncLog {
    capacity: usize,
    entries: Mutex<VecDeque<SyncLogEntry>>,
}

impl BoundedSyncLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BoundedSyncLog {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SYNC_LOG_CAPACITY)
    }
}

impl SyncLogStore for BoundedSyncLog {
    fn record(&self, entry: SyncLogEntry) -> Result<(), RepositoryError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sync log mutex poisoned".to_string()))?;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    fn query(&self, filter: &SyncLogFilter) -> Result<Vec<SyncLogEntry>, RepositoryError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sync log mutex poisoned".to_string()))?;
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| filter.sync_type.map_or(true, |t| entry.sync_type == t))
            .filter(|entry| filter.status.map_or(true, |s| entry.status == s))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(local_id: &str, status: SyncStatus, minute: u32) -> SyncLogEntry {
        let at = Utc
            .with_ymd_and_hms(2025, 1, 15, 10, minute, 0)
            .single()
            .expect("valid timestamp");
        SyncLogEntry::new(
            SyncType::Clearance,
            SyncDirection::ToExternal,
            status,
            local_id,
            at,
        )
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let log = BoundedSyncLog::new(3);
        for (index, id) in ["a", "b", "c", "d"].iter().enumerate() {
            log.record(entry(id, SyncStatus::Success, index as u32))
                .expect("record");
        }

        let ids: Vec<String> = log
            .query(&SyncLogFilter::default())
            .expect("query")
            .into_iter()
            .map(|e| e.local_id)
            .collect();
        assert_eq!(ids, vec!["d", "c", "b"]);
    }

    #[test]
    fn filters_and_limits_most_recent_first() {
        let log = BoundedSyncLog::new(10);
        log.record(entry("a", SyncStatus::Failed, 0)).expect("record");
        log.record(entry("b", SyncStatus::Success, 1)).expect("record");
        log.record(entry("c", SyncStatus::Failed, 2)).expect("record");
        log.record(entry("d", SyncStatus::Failed, 3)).expect("record");

        let failed = log
            .query(&SyncLogFilter {
                status: Some(SyncStatus::Failed),
                limit: Some(2),
                ..SyncLogFilter::default()
            })
            .expect("query");
        let ids: Vec<&str> = failed.iter().map(|e| e.local_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c"]);

        let students = log
            .query(&SyncLogFilter {
                sync_type: Some(SyncType::Student),
                ..SyncLogFilter::default()
            })
            .expect("query");
        assert!(students.is_empty());
    }
}
