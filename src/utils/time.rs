//! Time utilities: shift times, sync range bounds, hour formatting.

use crate::errors::{AppError, AppResult};
use crate::models::punch::PUNCH_TIME_FORMAT;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub fn parse_time(t: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|_| AppError::InvalidTime(t.to_string()))
}

/// Parse a sync bound. A bare date expands to the start of the day, or to
/// its last second when `end_of_day` is set.
pub fn parse_bound(s: &str, end_of_day: bool) -> AppResult<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, PUNCH_TIME_FORMAT) {
        return Ok(ts);
    }
    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))?;
    let t = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    t.map(|t| d.and_time(t))
        .ok_or_else(|| AppError::InvalidDate(s.to_string()))
}

/// 8.42 → "08h 25m"
pub fn hours2readable(hours: f64) -> String {
    let mins = (hours * 60.0).round() as i64;
    format!("{:02}h {:02}m", mins / 60, mins % 60)
}

pub fn hhmm(ts: Option<&NaiveDateTime>) -> String {
    ts.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}
