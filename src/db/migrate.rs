use crate::errors::{AppError, AppResult};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

/// Ensure that the `log` table exists: it also records applied migrations.
fn ensure_log_table(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> AppResult<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

fn mark_applied(conn: &Connection, version: &str, message: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [version, message],
    )?;
    Ok(())
}

/// Staging, attendance and the single-row cursor.
const CREATE_CORE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS raw_punches (
        source_id      INTEGER PRIMARY KEY,
        employee_code  TEXT NOT NULL,
        punch_time     TEXT NOT NULL,
        work_date      TEXT NOT NULL,
        direction      TEXT NOT NULL CHECK (direction IN ('in','out')),
        terminal_sn    TEXT NOT NULL DEFAULT '',
        terminal_alias TEXT NOT NULL DEFAULT '',
        stitched       INTEGER NOT NULL DEFAULT 0,
        ingested_at    TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_raw_emp_date ON raw_punches(employee_code, work_date);
    CREATE INDEX IF NOT EXISTS idx_raw_time ON raw_punches(punch_time);
    CREATE INDEX IF NOT EXISTS idx_raw_unstitched ON raw_punches(stitched) WHERE stitched = 0;

    CREATE TABLE IF NOT EXISTS attendance (
        employee_code TEXT NOT NULL,
        date          TEXT NOT NULL,
        check_in      TEXT,
        check_out     TEXT,
        hours_worked  REAL NOT NULL DEFAULT 0,
        status        TEXT NOT NULL CHECK (status IN ('present','late','incomplete','absent')),
        source_ids    TEXT NOT NULL DEFAULT '[]',
        updated_at    TEXT NOT NULL,
        PRIMARY KEY (employee_code, date)
    );

    CREATE TABLE IF NOT EXISTS sync_cursor (
        id         INTEGER PRIMARY KEY CHECK (id = 1),
        cursor     TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// Sync ledger and reference data.
const CREATE_LEDGER_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS sync_status (
        kind            TEXT PRIMARY KEY CHECK (kind IN ('incremental','historical')),
        status          TEXT NOT NULL CHECK (status IN ('running','completed','failed')),
        last_attempt_at TEXT,
        last_success_at TEXT,
        last_error      TEXT,
        fetched         INTEGER NOT NULL DEFAULT 0,
        ingested        INTEGER NOT NULL DEFAULT 0,
        success_count   INTEGER NOT NULL DEFAULT 0,
        error_count     INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS employee_shifts (
        employee_code TEXT PRIMARY KEY,
        shift_start   TEXT NOT NULL,
        shift_end     TEXT NOT NULL
    );
"#;

/// Punches dropped by the device-class filter, kept for count reconciliation.
const CREATE_EXCLUDED_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS excluded_punches (
        source_id      INTEGER PRIMARY KEY,
        terminal_alias TEXT NOT NULL DEFAULT '',
        punch_time     TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_excluded_time ON excluded_punches(punch_time);
"#;

const MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "20250110_0001_core_tables",
        CREATE_CORE_TABLES,
        "Created staging, attendance and cursor tables",
    ),
    (
        "20250112_0002_ledger_and_shifts",
        CREATE_LEDGER_TABLES,
        "Created sync_status and employee_shifts tables",
    ),
    (
        "20250203_0003_excluded_punches",
        CREATE_EXCLUDED_TABLE,
        "Created excluded_punches ledger",
    ),
];

/// Public entry point: run all pending migrations.
///
/// Invoked by db::initialize::init_db().
pub fn run_pending_migrations(conn: &mut Connection) -> AppResult<()> {
    ensure_log_table(conn)?;

    for (version, sql, message) in MIGRATIONS {
        if is_applied(conn, version)? {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| AppError::Migration(format!("{version}: {e}")))?;
        mark_applied(&tx, version, message)?;
        tx.commit()?;

        info!(migration = version, "{}", message);
    }

    Ok(())
}
