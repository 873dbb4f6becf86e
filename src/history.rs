//! Read-only access to past scan records
//!
//! The history itself is owned elsewhere; the console only lists records and
//! forwards a record's `full_log` to a summarizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub low: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Human-readable, e.g. `8m 12s`
    #[serde(default)]
    pub duration: String,
    pub scan_type: String,
    pub status: String,
    #[serde(default)]
    pub findings: SeverityCounts,
    #[serde(default)]
    pub full_log: String,
}

/// History listing without the (potentially huge) log bodies.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub duration: String,
    pub scan_type: String,
    pub status: String,
    pub findings: SeverityCounts,
    pub has_log: bool,
}

impl From<&HistoryRecord> for HistoryEntry {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            target: record.target.clone(),
            started_at: record.started_at,
            duration: record.duration.clone(),
            scan_type: record.scan_type.clone(),
            status: record.status.clone(),
            findings: record.findings,
            has_log: !record.full_log.trim().is_empty(),
        }
    }
}

/// JSON-file snapshot of the history store, re-read on every query.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Newest first.
    pub fn list(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        let mut records = load_records(&self.path)?;
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records.iter().map(HistoryEntry::from).collect())
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<HistoryRecord>> {
        let records = load_records(&self.path)?;
        Ok(records.into_iter().find(|r| r.id == id))
    }
}

/// Missing file means an empty history.
pub fn load_records(path: &Path) -> anyhow::Result<Vec<HistoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let records: Vec<HistoryRecord> = serde_json::from_str(&raw)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        serde_json::json!([
            {
                "id": "SC-1024",
                "target": "192.168.1.50",
                "started_at": "2024-02-08T16:15:00Z",
                "duration": "3m 45s",
                "scan_type": "Network Discovery",
                "status": "Failed"
            },
            {
                "id": "SC-1025",
                "target": "dev-api.internal",
                "started_at": "2024-02-09T10:42:00Z",
                "finished_at": "2024-02-09T10:50:12Z",
                "duration": "8m 12s",
                "scan_type": "API Security Scan",
                "status": "Completed",
                "findings": {"critical": 1, "medium": 2, "low": 5},
                "full_log": "22/tcp open ssh\n"
            }
        ])
        .to_string()
    }

    fn temp_store(name: &str) -> (HistoryStore, PathBuf) {
        let path = std::env::temp_dir().join(format!("secops-history-{}-{}.json", name, std::process::id()));
        fs::write(&path, sample()).unwrap();
        (HistoryStore::new(&path), path)
    }

    #[test]
    fn missing_file_is_empty() {
        let store = HistoryStore::new("/nonexistent/secops/history.json");
        assert!(store.list().unwrap().is_empty());
        assert!(store.get("SC-1").unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first_without_logs() {
        let (store, path) = temp_store("list");
        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "SC-1025");
        assert!(entries[0].has_log);
        assert!(!entries[1].has_log);
        assert_eq!(entries[1].findings, SeverityCounts::default());
        fs::remove_file(path).ok();
    }

    #[test]
    fn get_returns_full_record() {
        let (store, path) = temp_store("get");
        let record = store.get("SC-1025").unwrap().unwrap();
        assert_eq!(record.full_log, "22/tcp open ssh\n");
        assert_eq!(record.findings.critical, 1);
        fs::remove_file(path).ok();
    }
}
