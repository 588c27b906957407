// src/export/model.rs

use crate::models::attendance::AttendanceRecord;
use crate::models::punch::PUNCH_TIME_FORMAT;
use serde::Serialize;

/// Flat attendance row for CSV / JSON.
#[derive(Serialize, Clone, Debug)]
pub struct AttendanceExport {
    pub employee_code: String,
    pub date: String,
    pub check_in: String,
    pub check_out: String,
    pub hours_worked: f64,
    pub status: String,
    pub source_ids: String,
}

impl From<&AttendanceRecord> for AttendanceExport {
    fn from(r: &AttendanceRecord) -> Self {
        let ts = |t: Option<chrono::NaiveDateTime>| {
            t.map(|t| t.format(PUNCH_TIME_FORMAT).to_string())
                .unwrap_or_default()
        };
        Self {
            employee_code: r.employee_code.clone(),
            date: r.date_str(),
            check_in: ts(r.check_in),
            check_out: ts(r.check_out),
            hours_worked: r.hours_worked,
            status: r.status.to_db_str().to_string(),
            source_ids: r
                .source_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
