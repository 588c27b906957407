use chrono::{DateTime, Local};
use serde::Serialize;

/// The two independent sync flavours. Each has its own single-flight guard
/// and its own ledger row.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Incremental,
    Historical,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Incremental => "incremental",
            SyncKind::Historical => "historical",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "incremental" => Some(SyncKind::Incremental),
            "historical" => Some(SyncKind::Historical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Running,
    Completed,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Running => "running",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SyncState::Running),
            "completed" => Some(SyncState::Completed),
            "failed" => Some(SyncState::Failed),
            _ => None,
        }
    }
}

/// Ledger row shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub kind: SyncKind,
    pub state: SyncState,
    pub last_attempt_at: Option<DateTime<Local>>,
    pub last_success_at: Option<DateTime<Local>>,
    pub last_error: Option<String>,
    pub fetched: u64,
    pub ingested: u64,
    pub success_count: u64,
    pub error_count: u64,
}
