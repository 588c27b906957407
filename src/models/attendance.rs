use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Incomplete,
    Absent,
}

impl AttendanceStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Incomplete => "incomplete",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "late" => Some(AttendanceStatus::Late),
            "incomplete" => Some(AttendanceStatus::Incomplete),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

/// One summary row per employee per calendar day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttendanceRecord {
    pub employee_code: String,
    pub date: NaiveDate,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub hours_worked: f64,
    pub status: AttendanceStatus,
    /// Every staged source id folded into this record, ascending.
    pub source_ids: Vec<i64>,
}

impl AttendanceRecord {
    pub fn absent(employee_code: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            employee_code: employee_code.into(),
            date,
            check_in: None,
            check_out: None,
            hours_worked: 0.0,
            status: AttendanceStatus::Absent,
            source_ids: Vec::new(),
        }
    }

    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Assigned shift used for lateness classification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmployeeShift {
    pub employee_code: String,
    pub shift_start: NaiveTime,
    pub shift_end: NaiveTime,
}
