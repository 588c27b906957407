//! Wire types of the terminal gateway HTTP API.

use crate::errors::{AppError, AppResult};
use crate::models::direction::Direction;
use crate::models::punch::{PUNCH_TIME_FORMAT, RawPunchEvent};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TokenAuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenAuthResponse {
    pub token: Option<String>,
}

/// Paginated envelope returned by the transactions endpoint.
#[derive(Debug, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default)]
    pub count: u64,
    pub next: Option<String>,
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionItem {
    pub id: i64,
    pub emp_code: String,
    pub punch_time: String,
    pub punch_state: String,
    #[serde(default)]
    pub terminal_sn: String,
    #[serde(default)]
    pub terminal_alias: Option<String>,
}

impl TransactionItem {
    pub fn into_event(self) -> AppResult<RawPunchEvent> {
        let punch_time = NaiveDateTime::parse_from_str(self.punch_time.trim(), PUNCH_TIME_FORMAT)
            .map_err(|_| AppError::Data(format!("bad punch_time '{}'", self.punch_time)))?;
        let direction = Direction::from_punch_state(&self.punch_state)
            .ok_or_else(|| AppError::InvalidDirection(self.punch_state.clone()))?;
        if self.emp_code.trim().is_empty() {
            return Err(AppError::Data(format!("record {} has no emp_code", self.id)));
        }

        let alias = self
            .terminal_alias
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.terminal_sn.clone());

        Ok(RawPunchEvent::new(
            self.id,
            self.emp_code.trim(),
            punch_time,
            direction,
            self.terminal_sn,
        )
        .with_alias(alias))
    }
}
