use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Gap severity. The derived ordering is the escalation order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// A trailing window where the gateway reports more punches than we hold.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataGap {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub window_hours: u32,
    pub expected: u64,
    pub actual: u64,
    pub missing: u64,
    pub missing_pct: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WindowPriority {
    Normal,
    Extended,
    Recovery,
}

impl WindowPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowPriority::Normal => "normal",
            WindowPriority::Extended => "extended",
            WindowPriority::Recovery => "recovery",
        }
    }
}

/// Time range the puller should fetch next.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PollingWindow {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub window_minutes: i64,
    pub reason: String,
    pub priority: WindowPriority,
}
