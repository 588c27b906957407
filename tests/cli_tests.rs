mod common;

use common::{init_db_cli, rbs, setup_test_db};
use predicates::prelude::*;
use std::fs;

/// Assign a shift and finalize a day: the only way to get attendance rows
/// from the CLI without a gateway.
fn seed_absence(db: &str) {
    rbs()
        .args(["--db", db, "shift", "--employee", "E001", "--start", "09:00", "--end", "17:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("assigned to E001"));

    rbs()
        .args(["--db", db, "finalize", "--date", "2025-01-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 employee(s) marked absent"));
}

#[test]
fn init_creates_database() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);
    assert!(std::path::Path::new(&db).exists());
}

#[test]
fn list_on_empty_database() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);

    rbs()
        .args(["--db", &db, "list", "--period", "2025-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No attendance records"));
}

#[test]
fn shift_list_shows_assignment() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);
    seed_absence(&db);

    rbs()
        .args(["--db", &db, "shift", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("E001").and(predicate::str::contains("09:00")));
}

#[test]
fn finalized_day_lists_absent_employee() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);
    seed_absence(&db);

    rbs()
        .args(["--db", &db, "list", "--period", "2025-01-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("E001").and(predicate::str::contains("absent")));

    // A second finalize finds nobody left to mark
    rbs()
        .args(["--db", &db, "finalize", "--date", "2025-01-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 employee(s) marked absent"));
}

#[test]
fn finalize_rejects_bad_date() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);

    rbs()
        .args(["--db", &db, "finalize", "--date", "2025-13-40"])
        .assert()
        .failure();
}

#[test]
fn shift_rejects_bad_time() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);

    rbs()
        .args(["--db", &db, "shift", "--employee", "E9", "--start", "25:00", "--end", "17:00"])
        .assert()
        .failure();
}

#[test]
fn export_csv_writes_rows() {
    let (dir, db) = setup_test_db();
    init_db_cli(&db);
    seed_absence(&db);

    let out = dir.path().join("attendance.csv");
    let out_str = out.to_string_lossy().to_string();

    rbs()
        .args([
            "--db", &db, "export", "--format", "csv", "--file", &out_str, "--range", "2025-01",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CSV export completed"));

    let content = fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("employee_code,date,check_in,check_out,hours_worked,status"));
    assert!(content.contains("E001,2025-01-10"));
    assert!(content.contains("absent"));
}

#[test]
fn export_json_writes_array() {
    let (dir, db) = setup_test_db();
    init_db_cli(&db);
    seed_absence(&db);

    let out = dir.path().join("attendance.json");
    let out_str = out.to_string_lossy().to_string();

    rbs()
        .args([
            "--db", &db, "export", "--format", "json", "--file", &out_str, "--range", "2025",
        ])
        .assert()
        .success();

    let content = fs::read_to_string(&out).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(rows.as_array().map(|a| a.len()), Some(1));
    assert_eq!(rows[0]["status"], "absent");
}

#[test]
fn export_requires_absolute_path() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);

    rbs()
        .args(["--db", &db, "export", "--file", "relative.csv"])
        .assert()
        .failure();
}

#[test]
fn status_before_first_sync() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);

    rbs()
        .args(["--db", &db, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not set").and(predicate::str::contains("No sync has run yet")));
}

#[test]
fn log_records_operations() {
    let (_dir, db) = setup_test_db();
    init_db_cli(&db);
    seed_absence(&db);

    rbs()
        .args(["--db", &db, "log", "--print"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("shift"))
                .and(predicate::str::contains("finalize")),
        );
}
