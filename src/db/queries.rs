use crate::errors::{AppError, AppResult};
use crate::models::attendance::{AttendanceRecord, AttendanceStatus, EmployeeShift};
use crate::models::direction::Direction;
use crate::models::punch::{PUNCH_TIME_FORMAT, RawPunchEvent};
use crate::models::sync::{SyncKind, SyncState, SyncStatus};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

const DATE_FORMAT: &str = "%Y-%m-%d";
const SHIFT_FORMAT: &str = "%H:%M";

fn conversion_error(idx: usize, err: AppError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_ts(idx: usize, s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, PUNCH_TIME_FORMAT)
        .map_err(|_| conversion_error(idx, AppError::InvalidDate(s.to_string())))
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> Result<Option<NaiveDateTime>> {
    s.map(|v| parse_ts(idx, &v)).transpose()
}

fn parse_local(s: Option<String>) -> Option<DateTime<Local>> {
    s.and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Local))
}

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(PUNCH_TIME_FORMAT).to_string()
}

fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

pub fn map_punch_row(row: &Row) -> Result<RawPunchEvent> {
    let time_str: String = row.get("punch_time")?;
    let punch_time = parse_ts(2, &time_str)?;

    let dir_str: String = row.get("direction")?;
    let direction = Direction::from_db_str(&dir_str)
        .ok_or_else(|| conversion_error(4, AppError::InvalidDirection(dir_str.clone())))?;

    Ok(RawPunchEvent {
        source_id: row.get("source_id")?,
        employee_code: row.get("employee_code")?,
        punch_time,
        direction,
        terminal_sn: row.get("terminal_sn")?,
        terminal_alias: row.get("terminal_alias")?,
    })
}

/// Append-only staging insert. Already known source ids are ignored, which
/// keeps replays of overlapping windows harmless. Returns the number of new rows.
pub fn insert_raw_punches(conn: &Connection, events: &[RawPunchEvent]) -> AppResult<usize> {
    let now = Local::now().to_rfc3339();
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO raw_punches
            (source_id, employee_code, punch_time, work_date, direction,
             terminal_sn, terminal_alias, stitched, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
    )?;

    let mut inserted = 0;
    for ev in events {
        inserted += stmt.execute(params![
            ev.source_id,
            ev.employee_code,
            ev.punch_time_str(),
            fmt_date(&ev.work_date()),
            ev.direction.to_db_str(),
            ev.terminal_sn,
            ev.terminal_alias,
            now,
        ])?;
    }
    Ok(inserted)
}

pub fn insert_excluded(conn: &Connection, events: &[RawPunchEvent]) -> AppResult<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO excluded_punches (source_id, terminal_alias, punch_time)
         VALUES (?1, ?2, ?3)",
    )?;

    let mut inserted = 0;
    for ev in events {
        inserted += stmt.execute(params![ev.source_id, ev.terminal_alias, ev.punch_time_str()])?;
    }
    Ok(inserted)
}

/// Highest source id seen so far, staged or excluded: the continuity anchor
/// for the next fetch.
pub fn max_source_id(conn: &Connection) -> AppResult<Option<i64>> {
    let id: Option<i64> = conn.query_row(
        "SELECT MAX(id) FROM (
            SELECT MAX(source_id) AS id FROM raw_punches
            UNION ALL
            SELECT MAX(source_id) AS id FROM excluded_punches
         )",
        [],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn load_day_punches(
    conn: &Connection,
    employee_code: &str,
    date: &NaiveDate,
) -> AppResult<Vec<RawPunchEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM raw_punches
         WHERE employee_code = ?1 AND work_date = ?2
         ORDER BY source_id ASC",
    )?;

    let rows = stmt.query_map(params![employee_code, fmt_date(date)], map_punch_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn mark_day_stitched(conn: &Connection, employee_code: &str, date: &NaiveDate) -> AppResult<()> {
    conn.execute(
        "UPDATE raw_punches SET stitched = 1
         WHERE employee_code = ?1 AND work_date = ?2 AND stitched = 0",
        params![employee_code, fmt_date(date)],
    )?;
    Ok(())
}

/// Employee+day groups that hold staged punches not yet folded.
pub fn unstitched_days(conn: &Connection, limit: usize) -> AppResult<Vec<(String, NaiveDate)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT employee_code, work_date FROM raw_punches
         WHERE stitched = 0
         ORDER BY work_date ASC, employee_code ASC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit as i64], |row| {
        let code: String = row.get(0)?;
        let d: String = row.get(1)?;
        let date = NaiveDate::parse_from_str(&d, DATE_FORMAT)
            .map_err(|_| conversion_error(1, AppError::InvalidDate(d.clone())))?;
        Ok((code, date))
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Locally known punches (staged + excluded) with `start <= punch_time <= end`.
pub fn count_local_punches(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> AppResult<u64> {
    let (s, e) = (fmt_ts(start), fmt_ts(end));
    let staged: i64 = conn.query_row(
        "SELECT COUNT(*) FROM raw_punches WHERE punch_time >= ?1 AND punch_time <= ?2",
        params![s, e],
        |r| r.get(0),
    )?;
    let excluded: i64 = conn.query_row(
        "SELECT COUNT(*) FROM excluded_punches WHERE punch_time >= ?1 AND punch_time <= ?2",
        params![s, e],
        |r| r.get(0),
    )?;
    Ok((staged + excluded).max(0) as u64)
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

pub fn map_attendance_row(row: &Row) -> Result<AttendanceRecord> {
    let date_str: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|_| conversion_error(1, AppError::InvalidDate(date_str.clone())))?;

    let status_str: String = row.get("status")?;
    let status = AttendanceStatus::from_db_str(&status_str).ok_or_else(|| {
        conversion_error(
            5,
            AppError::Other(format!("Invalid attendance status: {}", status_str)),
        )
    })?;

    let ids_json: String = row.get("source_ids")?;
    let source_ids: Vec<i64> = serde_json::from_str(&ids_json)
        .map_err(|e| conversion_error(6, AppError::Data(e.to_string())))?;

    Ok(AttendanceRecord {
        employee_code: row.get("employee_code")?,
        date,
        check_in: parse_opt_ts(2, row.get("check_in")?)?,
        check_out: parse_opt_ts(3, row.get("check_out")?)?,
        hours_worked: row.get("hours_worked")?,
        status,
        source_ids,
    })
}

/// Insert or update in place, keyed by (employee_code, date).
pub fn upsert_attendance(conn: &Connection, rec: &AttendanceRecord) -> AppResult<()> {
    let ids = serde_json::to_string(&rec.source_ids)?;
    conn.execute(
        "INSERT INTO attendance
            (employee_code, date, check_in, check_out, hours_worked, status, source_ids, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(employee_code, date) DO UPDATE SET
            check_in = excluded.check_in,
            check_out = excluded.check_out,
            hours_worked = excluded.hours_worked,
            status = excluded.status,
            source_ids = excluded.source_ids,
            updated_at = excluded.updated_at",
        params![
            rec.employee_code,
            rec.date_str(),
            rec.check_in.as_ref().map(fmt_ts),
            rec.check_out.as_ref().map(fmt_ts),
            rec.hours_worked,
            rec.status.to_db_str(),
            ids,
            Local::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn load_attendance(
    conn: &Connection,
    employee_code: &str,
    date: &NaiveDate,
) -> AppResult<Option<AttendanceRecord>> {
    let mut stmt = conn
        .prepare_cached("SELECT * FROM attendance WHERE employee_code = ?1 AND date = ?2")?;
    let rec = stmt
        .query_row(params![employee_code, fmt_date(date)], map_attendance_row)
        .optional()?;
    Ok(rec)
}

pub fn list_attendance(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
    employee_code: Option<&str>,
) -> AppResult<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM attendance
         WHERE date >= ?1 AND date <= ?2
           AND (?3 IS NULL OR employee_code = ?3)
         ORDER BY date ASC, employee_code ASC",
    )?;

    let rows = stmt.query_map(
        params![fmt_date(from), fmt_date(to), employee_code],
        map_attendance_row,
    )?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn count_attendance(conn: &Connection, employee_code: &str, date: &NaiveDate) -> AppResult<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance WHERE employee_code = ?1 AND date = ?2",
        params![employee_code, fmt_date(date)],
        |r| r.get(0),
    )?;
    Ok(n as u64)
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

pub fn load_cursor(conn: &Connection) -> AppResult<Option<NaiveDateTime>> {
    let raw: Option<String> = conn
        .query_row("SELECT cursor FROM sync_cursor WHERE id = 1", [], |r| r.get(0))
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            NaiveDateTime::parse_from_str(&s, PUNCH_TIME_FORMAT)
                .map_err(|_| AppError::InvalidDate(s.clone()))?,
        )),
        None => Ok(None),
    }
}

pub fn save_cursor(conn: &Connection, cursor: &NaiveDateTime) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_cursor (id, cursor, updated_at) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at",
        params![fmt_ts(cursor), Local::now().to_rfc3339()],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync ledger
// ---------------------------------------------------------------------------

pub fn mark_sync_running(conn: &Connection, kind: SyncKind) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_status (kind, status, last_attempt_at) VALUES (?1, 'running', ?2)
         ON CONFLICT(kind) DO UPDATE SET status = 'running', last_attempt_at = excluded.last_attempt_at",
        params![kind.as_str(), Local::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn mark_sync_completed(
    conn: &Connection,
    kind: SyncKind,
    fetched: u64,
    ingested: u64,
) -> AppResult<()> {
    conn.execute(
        "UPDATE sync_status
         SET status = 'completed', last_success_at = ?2, last_error = NULL,
             fetched = ?3, ingested = ?4, success_count = success_count + 1
         WHERE kind = ?1",
        params![
            kind.as_str(),
            Local::now().to_rfc3339(),
            fetched as i64,
            ingested as i64
        ],
    )?;
    Ok(())
}

pub fn mark_sync_failed(
    conn: &Connection,
    kind: SyncKind,
    fetched: u64,
    ingested: u64,
    error: &str,
) -> AppResult<()> {
    conn.execute(
        "UPDATE sync_status
         SET status = 'failed', last_error = ?2, fetched = ?3, ingested = ?4,
             error_count = error_count + 1
         WHERE kind = ?1",
        params![kind.as_str(), error, fetched as i64, ingested as i64],
    )?;
    Ok(())
}

pub fn load_sync_status(conn: &Connection) -> AppResult<Vec<SyncStatus>> {
    let mut stmt = conn.prepare_cached(
        "SELECT kind, status, last_attempt_at, last_success_at, last_error,
                fetched, ingested, success_count, error_count
         FROM sync_status ORDER BY kind ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        let kind_str: String = row.get(0)?;
        let state_str: String = row.get(1)?;
        let kind = SyncKind::from_db_str(&kind_str).ok_or_else(|| {
            conversion_error(0, AppError::Other(format!("Invalid sync kind: {kind_str}")))
        })?;
        let state = SyncState::from_db_str(&state_str).ok_or_else(|| {
            conversion_error(1, AppError::Other(format!("Invalid sync state: {state_str}")))
        })?;
        Ok(SyncStatus {
            kind,
            state,
            last_attempt_at: parse_local(row.get(2)?),
            last_success_at: parse_local(row.get(3)?),
            last_error: row.get(4)?,
            fetched: row.get::<_, i64>(5)? as u64,
            ingested: row.get::<_, i64>(6)? as u64,
            success_count: row.get::<_, i64>(7)? as u64,
            error_count: row.get::<_, i64>(8)? as u64,
        })
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Shifts
// ---------------------------------------------------------------------------

fn map_shift_row(row: &Row) -> Result<EmployeeShift> {
    let start: String = row.get(1)?;
    let end: String = row.get(2)?;
    let shift_start = NaiveTime::parse_from_str(&start, SHIFT_FORMAT)
        .map_err(|_| conversion_error(1, AppError::InvalidTime(start.clone())))?;
    let shift_end = NaiveTime::parse_from_str(&end, SHIFT_FORMAT)
        .map_err(|_| conversion_error(2, AppError::InvalidTime(end.clone())))?;
    Ok(EmployeeShift {
        employee_code: row.get(0)?,
        shift_start,
        shift_end,
    })
}

pub fn upsert_shift(conn: &Connection, shift: &EmployeeShift) -> AppResult<()> {
    conn.execute(
        "INSERT INTO employee_shifts (employee_code, shift_start, shift_end) VALUES (?1, ?2, ?3)
         ON CONFLICT(employee_code) DO UPDATE SET
            shift_start = excluded.shift_start, shift_end = excluded.shift_end",
        params![
            shift.employee_code,
            shift.shift_start.format(SHIFT_FORMAT).to_string(),
            shift.shift_end.format(SHIFT_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn load_shift(conn: &Connection, employee_code: &str) -> AppResult<Option<EmployeeShift>> {
    let mut stmt = conn.prepare_cached(
        "SELECT employee_code, shift_start, shift_end FROM employee_shifts WHERE employee_code = ?1",
    )?;
    Ok(stmt.query_row([employee_code], map_shift_row).optional()?)
}

pub fn list_shifts(conn: &Connection) -> AppResult<Vec<EmployeeShift>> {
    let mut stmt = conn.prepare_cached(
        "SELECT employee_code, shift_start, shift_end FROM employee_shifts ORDER BY employee_code",
    )?;
    let rows = stmt.query_map([], map_shift_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Shift-assigned employees with no attendance row on `date`.
pub fn employees_missing_attendance(conn: &Connection, date: &NaiveDate) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.employee_code FROM employee_shifts s
         WHERE NOT EXISTS (
            SELECT 1 FROM attendance a
            WHERE a.employee_code = s.employee_code AND a.date = ?1
         )
         ORDER BY s.employee_code",
    )?;
    let rows = stmt.query_map([fmt_date(date)], |row| row.get::<_, String>(0))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::run_pending_migrations;

    fn conn() -> Connection {
        let mut c = Connection::open_in_memory().unwrap();
        run_pending_migrations(&mut c).unwrap();
        c
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, PUNCH_TIME_FORMAT).unwrap()
    }

    #[test]
    fn staging_ignores_known_source_ids() {
        let c = conn();
        let ev = RawPunchEvent::new(7, "E001", ts("2025-01-10 09:05:00"), Direction::In, "T1");
        assert_eq!(insert_raw_punches(&c, &[ev.clone()]).unwrap(), 1);
        assert_eq!(insert_raw_punches(&c, &[ev]).unwrap(), 0);
        assert_eq!(max_source_id(&c).unwrap(), Some(7));
    }

    #[test]
    fn continuity_anchor_includes_excluded_punches() {
        let c = conn();
        assert_eq!(max_source_id(&c).unwrap(), None);
        let staged = RawPunchEvent::new(7, "E001", ts("2025-01-10 09:05:00"), Direction::In, "T1");
        let door = RawPunchEvent::new(9, "E001", ts("2025-01-10 09:06:00"), Direction::In, "T9")
            .with_alias("Door lock");
        insert_raw_punches(&c, &[staged]).unwrap();
        insert_excluded(&c, &[door]).unwrap();
        assert_eq!(max_source_id(&c).unwrap(), Some(9));
    }

    #[test]
    fn cursor_roundtrips_through_single_row() {
        let c = conn();
        assert!(load_cursor(&c).unwrap().is_none());
        save_cursor(&c, &ts("2025-01-10 09:00:00")).unwrap();
        save_cursor(&c, &ts("2025-01-10 13:00:01")).unwrap();
        assert_eq!(load_cursor(&c).unwrap(), Some(ts("2025-01-10 13:00:01")));
        let rows: i64 = c
            .query_row("SELECT COUNT(*) FROM sync_cursor", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn sync_ledger_tracks_counts_and_errors() {
        let c = conn();
        mark_sync_running(&c, SyncKind::Incremental).unwrap();
        mark_sync_failed(&c, SyncKind::Incremental, 0, 0, "timeout").unwrap();
        mark_sync_running(&c, SyncKind::Incremental).unwrap();
        mark_sync_completed(&c, SyncKind::Incremental, 10, 8).unwrap();

        let rows = load_sync_status(&c).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.state, SyncState::Completed);
        assert_eq!(row.error_count, 1);
        assert_eq!(row.success_count, 1);
        assert_eq!(row.ingested, 8);
        assert!(row.last_error.is_none());
        assert!(row.last_success_at.is_some());
    }

    #[test]
    fn local_count_includes_excluded_punches() {
        let c = conn();
        let a = RawPunchEvent::new(1, "E001", ts("2025-01-10 09:05:00"), Direction::In, "T1");
        let b = RawPunchEvent::new(2, "E002", ts("2025-01-10 09:10:00"), Direction::In, "L1")
            .with_alias("Main door lock");
        insert_raw_punches(&c, &[a]).unwrap();
        insert_excluded(&c, &[b]).unwrap();

        let n = count_local_punches(&c, &ts("2025-01-10 09:00:00"), &ts("2025-01-10 10:00:00"))
            .unwrap();
        assert_eq!(n, 2);
    }
}
