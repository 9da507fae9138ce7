//! Import history service
//!
//! Keeps the most recent commits in memory so admins can see what was
//! imported, by whom, and how it went.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ImportMode, ImportResult};

const MAX_HISTORY_SIZE: usize = 100;

/// Commit entry in history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub import_mode: ImportMode,
    /// "completed", "partial" or "failed"
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_rows: u32,
    pub successful_imports: u32,
    pub failed_imports: u32,
    pub created_customers: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryResponse {
    pub imports: Vec<ImportHistoryEntry>,
    pub total: usize,
}

pub struct ImportHistoryService {
    history: Arc<RwLock<VecDeque<ImportHistoryEntry>>>,
}

impl ImportHistoryService {
    pub fn new() -> Self {
        Self {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_HISTORY_SIZE))),
        }
    }

    /// Record a finished commit. `error` is set when nothing could be processed.
    pub fn record(
        &self,
        user_id: Uuid,
        filename: &str,
        import_mode: ImportMode,
        started_at: DateTime<Utc>,
        result: &ImportResult,
        error: Option<String>,
    ) -> Uuid {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;

        let status = if error.is_some() || result.successful_imports == 0 {
            "failed"
        } else if result.failed_imports > 0 {
            "partial"
        } else {
            "completed"
        };

        let id = Uuid::new_v4();
        self.add_entry(ImportHistoryEntry {
            id,
            user_id,
            filename: filename.to_string(),
            import_mode,
            status: status.to_string(),
            started_at,
            completed_at,
            duration_ms,
            total_rows: result.total_rows,
            successful_imports: result.successful_imports,
            failed_imports: result.failed_imports,
            created_customers: result.created_customers,
            error,
        });
        id
    }

    fn add_entry(&self, entry: ImportHistoryEntry) {
        let mut history = self.history.write();

        if history.len() >= MAX_HISTORY_SIZE {
            history.pop_back();
        }

        history.push_front(entry);
    }

    /// Most recent commits across all admins
    pub fn get_recent(&self, limit: usize) -> ImportHistoryResponse {
        let history = self.history.read();
        let imports: Vec<ImportHistoryEntry> = history.iter().take(limit).cloned().collect();
        let total = history.len();

        ImportHistoryResponse { imports, total }
    }

    pub fn get_recent_for_user(&self, user_id: Uuid, limit: usize) -> ImportHistoryResponse {
        let history = self.history.read();
        let imports: Vec<ImportHistoryEntry> = history
            .iter()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect();
        let total = imports.len();

        ImportHistoryResponse { imports, total }
    }
}

impl Default for ImportHistoryService {
    fn default() -> Self {
        Self::new()
    }
}

// Global instance for easy access
lazy_static::lazy_static! {
    pub static ref IMPORT_HISTORY: ImportHistoryService = ImportHistoryService::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(successful: u32, failed: u32) -> ImportResult {
        ImportResult {
            total_rows: successful + failed,
            successful_imports: successful,
            failed_imports: failed,
            ..Default::default()
        }
    }

    #[test]
    fn status_follows_counts() {
        let service = ImportHistoryService::new();
        let user_id = Uuid::new_v4();
        let mode = ImportMode::CreateCustomers;

        service.record(user_id, "a.csv", mode, Utc::now(), &result(3, 0), None);
        service.record(user_id, "b.csv", mode, Utc::now(), &result(2, 1), None);
        service.record(user_id, "c.csv", mode, Utc::now(), &result(0, 3), None);

        let history = service.get_recent(10);
        let statuses: Vec<&str> = history.imports.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["failed", "partial", "completed"]);
    }

    #[test]
    fn history_is_capped() {
        let service = ImportHistoryService::new();
        let user_id = Uuid::new_v4();
        for i in 0..150 {
            service.record(user_id, &format!("{}.csv", i), ImportMode::CustomerId, Utc::now(), &result(1, 0), None);
        }

        let history = service.get_recent(200);
        assert_eq!(history.imports.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.imports[0].filename, "149.csv");
    }

    #[test]
    fn get_recent_for_user_isolates_users() {
        let service = ImportHistoryService::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        service.record(user_a, "a.csv", ImportMode::CustomerId, Utc::now(), &result(1, 0), None);
        service.record(user_b, "b.csv", ImportMode::CustomerId, Utc::now(), &result(1, 0), None);
        service.record(user_a, "c.csv", ImportMode::CustomerId, Utc::now(), &result(1, 0), Some("x".into()));

        let history_a = service.get_recent_for_user(user_a, 50);
        assert_eq!(history_a.total, 2);
        assert!(history_a.imports.iter().all(|e| e.user_id == user_a));
        assert_eq!(history_a.imports[0].status, "failed");
    }
}
