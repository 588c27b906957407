#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use rbiosync::db::initialize::init_db;
use rbiosync::db::pool::DbPool;
use rbiosync::models::direction::Direction;
use rbiosync::models::punch::RawPunchEvent;
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

pub fn rbs() -> Command {
    cargo_bin_cmd!("rbiosync")
}

/// A fresh database path inside its own temp dir. Keep the `TempDir` alive
/// for the duration of the test.
pub fn setup_test_db() -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("rbiosync_test.sqlite");
    (dir, db.to_string_lossy().to_string())
}

/// Initialize a database through the CLI (`--test` skips the config file).
pub fn init_db_cli(db_path: &str) {
    rbs()
        .args(["--db", db_path, "--test", "init"])
        .assert()
        .success();
}

/// In-process pool with the full schema.
pub fn memory_pool() -> DbPool {
    let pool = DbPool::in_memory().expect("in-memory db");
    init_db(&pool).expect("migrations");
    pool
}

pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn punch(id: i64, emp: &str, ts: NaiveDateTime, dir: Direction) -> RawPunchEvent {
    RawPunchEvent::new(id, emp, ts, dir, "SN-01").with_alias("Main entrance")
}
