//! Folds staged raw punches into one attendance record per employee per day.

use crate::config::StitcherConfig;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::AppResult;
use crate::models::attendance::{AttendanceRecord, AttendanceStatus, EmployeeShift};
use crate::models::punch::RawPunchEvent;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Rules applied when folding a day.
#[derive(Debug, Clone, Copy)]
pub struct StitchRules {
    pub grace_minutes: i64,
    pub max_hours: f64,
}

impl Default for StitchRules {
    fn default() -> Self {
        Self {
            grace_minutes: 15,
            max_hours: 12.0,
        }
    }
}

impl From<&StitcherConfig> for StitchRules {
    fn from(cfg: &StitcherConfig) -> Self {
        Self {
            grace_minutes: cfg.grace_minutes,
            max_hours: cfg.max_hours,
        }
    }
}

/// Build the attendance record of `employee_code` on `date`.
///
/// Every punch of the day is folded: first check-in, last check-out that
/// follows the last check-in. Punches for other employees or days are ignored.
/// Returns `None` when nothing of that day is present.
pub fn stitch(
    employee_code: &str,
    date: NaiveDate,
    day_records: &[RawPunchEvent],
    shift: Option<&EmployeeShift>,
    rules: &StitchRules,
) -> Option<AttendanceRecord> {
    let mut day: Vec<&RawPunchEvent> = day_records
        .iter()
        .filter(|e| e.employee_code == employee_code && e.work_date() == date)
        .collect();
    if day.is_empty() {
        return None;
    }
    day.sort_by_key(|e| (e.punch_time, e.source_id));

    // -----------------------------
    // First in / last out
    // -----------------------------
    let check_in = day.iter().filter(|e| e.direction.is_in()).map(|e| e.punch_time).min();
    let last_in = day.iter().filter(|e| e.direction.is_in()).map(|e| e.punch_time).max();
    let latest_out = day.iter().filter(|e| e.direction.is_out()).map(|e| e.punch_time).max();

    // An open check-in after the last check-out means the day is still running.
    let check_out = match (last_in, latest_out) {
        (Some(i), Some(o)) if o > i => Some(o),
        (None, Some(o)) => Some(o),
        _ => None,
    };

    // -----------------------------
    // Hours and status
    // -----------------------------
    let (hours_worked, status) = match (check_in, check_out) {
        (Some(cin), Some(cout)) => {
            let hours = (cout - cin).num_seconds() as f64 / 3600.0;
            let hours = round2(hours.clamp(0.0, rules.max_hours));

            let late = shift.is_some_and(|s| {
                let start = date.and_time(s.shift_start);
                cin > start + Duration::minutes(rules.grace_minutes)
            });
            let status = if late {
                AttendanceStatus::Late
            } else {
                AttendanceStatus::Present
            };
            (hours, status)
        }
        _ => (0.0, AttendanceStatus::Incomplete),
    };

    let mut source_ids: Vec<i64> = day.iter().map(|e| e.source_id).collect();
    source_ids.sort_unstable();
    source_ids.dedup();

    Some(AttendanceRecord {
        employee_code: employee_code.to_string(),
        date,
        check_in,
        check_out,
        hours_worked,
        status,
        source_ids,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Store-backed side of stitching.
#[derive(Clone)]
pub struct Stitcher {
    pool: DbPool,
    rules: StitchRules,
}

impl Stitcher {
    pub fn new(pool: DbPool, rules: StitchRules) -> Self {
        Self { pool, rules }
    }

    pub fn rules(&self) -> StitchRules {
        self.rules
    }

    /// Re-fold every listed employee+day from the staging table inside one
    /// transaction. Either every group is written and marked stitched, or
    /// nothing is.
    pub fn stitch_groups(&self, groups: &BTreeSet<(String, NaiveDate)>) -> AppResult<usize> {
        if groups.is_empty() {
            return Ok(0);
        }
        let rules = self.rules;

        self.pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut written = 0;

            for (employee, date) in groups {
                let punches = queries::load_day_punches(&tx, employee, date)?;
                let shift = queries::load_shift(&tx, employee)?;

                if let Some(rec) = stitch(employee, *date, &punches, shift.as_ref(), &rules) {
                    debug!(
                        employee = %rec.employee_code,
                        date = %rec.date,
                        status = rec.status.to_db_str(),
                        hours = rec.hours_worked,
                        "Stitched attendance"
                    );
                    queries::upsert_attendance(&tx, &rec)?;
                    written += 1;
                }
                queries::mark_day_stitched(&tx, employee, date)?;
            }

            tx.commit()?;
            Ok(written)
        })
    }

    /// Pick up groups whose stitch never committed.
    pub fn restitch_pending(&self, limit: usize) -> AppResult<usize> {
        let pending: BTreeSet<(String, NaiveDate)> = self
            .pool
            .with_conn(|conn| queries::unstitched_days(conn, limit))?
            .into_iter()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let n = self.stitch_groups(&pending)?;
        info!(groups = pending.len(), records = n, "Re-stitched pending days");
        Ok(n)
    }

    /// Mark shift-assigned employees without a record on `date` as absent.
    pub fn finalize_day(&self, date: NaiveDate) -> AppResult<usize> {
        self.pool.with_conn(|conn| {
            let tx = conn.transaction()?;
            let missing = queries::employees_missing_attendance(&tx, &date)?;
            for code in &missing {
                queries::upsert_attendance(&tx, &AttendanceRecord::absent(code.as_str(), date))?;
            }
            if !missing.is_empty() {
                oplog(
                    &tx,
                    "finalize",
                    &date.format("%Y-%m-%d").to_string(),
                    &format!("{} employee(s) marked absent", missing.len()),
                )?;
            }
            tx.commit()?;

            if !missing.is_empty() {
                info!(date = %date, absent = missing.len(), "Day finalized");
            }
            Ok(missing.len())
        })
    }
}
