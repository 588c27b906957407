use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Restarting,
    Stopped,
}

/// Per-worker supervision record. Only the watchdog writes it.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Local>>,
    pub last_activity: Option<DateTime<Local>>,
    pub consecutive_failures: u32,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: None,
            last_activity: None,
            consecutive_failures: 0,
            error_count: 0,
            last_error: None,
        }
    }
}
