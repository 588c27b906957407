//! Unified application error type.
//! All modules (db, gateway, core, cli) return AppError so that every worker
//! can catch, classify and record failures the same way.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    #[error("Invalid punch direction: {0}")]
    InvalidDirection(String),

    // ---------------------------
    // Gateway errors
    // ---------------------------
    /// Connection resets, DNS failures, 5xx answers. Retried on the next tick.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    /// Rejected or expired credentials. Kept apart from `Network` so that
    /// credential rot is distinguishable from outages in the logs.
    #[error("Gateway authentication failed: {0}")]
    Auth(String),

    /// Malformed or partial gateway payload.
    #[error("Malformed gateway data: {0}")]
    Data(String),

    // ---------------------------
    // Worker / supervision errors
    // ---------------------------
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration")]
    ConfigLoad,

    #[error("Failed to save configuration")]
    ConfigSave,

    // ---------------------------
    // Export errors
    // ---------------------------
    #[error("Export error: {0}")]
    Export(String),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// Short machine-friendly label used in logs and in the sync ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Db(_) | AppError::Migration(_) => "storage",
            AppError::InvalidDate(_) | AppError::InvalidTime(_) | AppError::InvalidDirection(_) => {
                "parse"
            }
            AppError::Network(_) => "network",
            AppError::Timeout(_) => "timeout",
            AppError::Auth(_) => "auth",
            AppError::Data(_) => "data",
            AppError::Worker(_) | AppError::UnknownWorker(_) => "worker",
            AppError::Config(_) | AppError::ConfigLoad | AppError::ConfigSave => "config",
            AppError::Export(_) => "export",
            AppError::Other(_) => "internal",
        }
    }

    /// Transient failures are left to the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Timeout(_) | AppError::Auth(_)
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if e.is_decode() {
            AppError::Data(e.to_string())
        } else if e.status().map(|s| s.as_u16() == 401 || s.as_u16() == 403) == Some(true) {
            AppError::Auth(e.to_string())
        } else {
            AppError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Data(e.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(e: regex::Error) -> Self {
        AppError::Config(format!("invalid terminal pattern: {e}"))
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Export(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_classified() {
        assert!(AppError::Network("reset".into()).is_transient());
        assert!(AppError::Timeout("30s".into()).is_transient());
        assert!(AppError::Auth("expired".into()).is_transient());
        assert!(!AppError::Config("missing username".into()).is_transient());
        assert!(!AppError::Data("bad json".into()).is_transient());
    }

    #[test]
    fn auth_and_network_have_distinct_kinds() {
        assert_eq!(AppError::Auth("x".into()).kind(), "auth");
        assert_eq!(AppError::Network("x".into()).kind(), "network");
    }
}
