use super::direction::Direction;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Timestamp format shared by the gateway and the staging table.
pub const PUNCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A raw punch as delivered by the terminal gateway.
///
/// Immutable once staged: later stitches only read it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RawPunchEvent {
    pub source_id: i64,         // ⇔ raw_punches.source_id (gateway id, monotonic)
    pub employee_code: String,  // ⇔ raw_punches.employee_code
    pub punch_time: NaiveDateTime, // ⇔ raw_punches.punch_time (TEXT "YYYY-MM-DD HH:MM:SS")
    pub direction: Direction,   // ⇔ raw_punches.direction ('in' | 'out')
    pub terminal_sn: String,    // ⇔ raw_punches.terminal_sn
    pub terminal_alias: String, // ⇔ raw_punches.terminal_alias
}

impl RawPunchEvent {
    pub fn new(
        source_id: i64,
        employee_code: impl Into<String>,
        punch_time: NaiveDateTime,
        direction: Direction,
        terminal_sn: impl Into<String>,
    ) -> Self {
        let terminal_sn = terminal_sn.into();
        Self {
            source_id,
            employee_code: employee_code.into(),
            punch_time,
            direction,
            terminal_alias: terminal_sn.clone(),
            terminal_sn,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.terminal_alias = alias.into();
        self
    }

    /// Calendar day the punch belongs to.
    pub fn work_date(&self) -> NaiveDate {
        self.punch_time.date()
    }

    pub fn punch_time_str(&self) -> String {
        self.punch_time.format(PUNCH_TIME_FORMAT).to_string()
    }

    /// Grouping key used by the stitcher.
    pub fn day_key(&self) -> (String, NaiveDate) {
        (self.employee_code.clone(), self.work_date())
    }
}
