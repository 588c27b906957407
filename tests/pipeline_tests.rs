mod common;

use common::{at, memory_pool, punch};
use rbiosync::config::{GatewayConfig, PullerConfig};
use rbiosync::core::puller::{DeviceFilter, PullOutcome, Puller};
use rbiosync::core::stitcher::{StitchRules, Stitcher};
use rbiosync::db::pool::DbPool;
use rbiosync::db::queries::{load_attendance, load_cursor, load_sync_status, save_cursor};
use rbiosync::errors::AppError;
use rbiosync::gateway::MemoryGateway;
use rbiosync::models::attendance::AttendanceStatus;
use rbiosync::models::direction::Direction;
use rbiosync::models::sync::{SyncKind, SyncState};
use std::sync::Arc;

fn puller(pool: &DbPool, gateway: Arc<MemoryGateway>) -> Puller {
    Puller::new(
        pool.clone(),
        gateway,
        Stitcher::new(pool.clone(), StitchRules::default()),
        DeviceFilter::from_config(&GatewayConfig::default()).unwrap(),
        PullerConfig::default(),
        100,
    )
}

fn day() -> chrono::NaiveDate {
    at(10, 0, 0).date()
}

#[tokio::test]
async fn punches_flow_from_gateway_to_attendance() {
    let pool = memory_pool();
    pool.with_conn(|conn| save_cursor(conn, &at(10, 9, 0))).unwrap();

    let gateway = Arc::new(MemoryGateway::with_events(vec![
        punch(101, "E001", at(10, 9, 5), Direction::In),
        punch(102, "E001", at(10, 12, 0), Direction::Out),
        punch(103, "E001", at(10, 13, 0), Direction::In),
    ]));
    let puller = puller(&pool, gateway);

    let outcome = puller.pull_incremental_at(at(10, 14, 0), None).await.unwrap();
    assert_eq!(
        outcome,
        PullOutcome::Completed {
            fetched: 3,
            ingested: 3
        }
    );

    let rec = pool
        .with_conn(|conn| load_attendance(conn, "E001", &day()))
        .unwrap()
        .expect("attendance row");
    // The last punch is a check-in: the day is still open
    assert_eq!(rec.check_in, Some(at(10, 9, 5)));
    assert_eq!(rec.check_out, None);
    assert_eq!(rec.status, AttendanceStatus::Incomplete);
    assert_eq!(rec.hours_worked, 0.0);
    assert_eq!(rec.source_ids, vec![101, 102, 103]);

    let cursor = pool.with_conn(|conn| load_cursor(conn)).unwrap();
    assert_eq!(cursor, Some(at(10, 13, 0) + chrono::Duration::seconds(1)));
}

#[tokio::test]
async fn closing_punch_completes_the_day_on_next_run() {
    let pool = memory_pool();
    pool.with_conn(|conn| save_cursor(conn, &at(10, 8, 0))).unwrap();

    let gateway = Arc::new(MemoryGateway::with_events(vec![
        punch(1, "E002", at(10, 8, 30), Direction::In),
    ]));
    let puller = puller(&pool, gateway.clone());
    puller.pull_incremental_at(at(10, 10, 0), None).await.unwrap();

    gateway.push(vec![punch(2, "E002", at(10, 17, 0), Direction::Out)]);
    puller.pull_incremental_at(at(10, 18, 0), None).await.unwrap();

    let rec = pool
        .with_conn(|conn| load_attendance(conn, "E002", &day()))
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AttendanceStatus::Present);
    assert_eq!(rec.hours_worked, 8.5);
    assert_eq!(rec.source_ids, vec![1, 2]);
}

#[tokio::test]
async fn failed_stitch_keeps_cursor_and_staged_punches() {
    let pool = memory_pool();
    pool.with_conn(|conn| save_cursor(conn, &at(10, 9, 0))).unwrap();
    pool.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER block_attendance BEFORE INSERT ON attendance
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )?;
        Ok(())
    })
    .unwrap();

    let gateway = Arc::new(MemoryGateway::with_events(vec![
        punch(201, "E003", at(10, 9, 10), Direction::In),
        punch(202, "E003", at(10, 11, 10), Direction::Out),
    ]));
    let stitcher = Stitcher::new(pool.clone(), StitchRules::default());
    let puller = puller(&pool, gateway);

    let res = puller.pull_incremental_at(at(10, 12, 0), None).await;
    assert!(res.is_err());

    // Cursor untouched, punches staged but not stitched
    let cursor = pool.with_conn(|conn| load_cursor(conn)).unwrap();
    assert_eq!(cursor, Some(at(10, 9, 0)));
    let unstitched: i64 = pool
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM raw_punches WHERE stitched = 0",
                [],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(unstitched, 2);

    let ledger = pool.with_conn(|conn| load_sync_status(conn)).unwrap();
    let inc = ledger.iter().find(|s| s.kind == SyncKind::Incremental).unwrap();
    assert_eq!(inc.state, SyncState::Failed);

    // Once the store accepts writes again the stitcher catches up
    pool.with_conn(|conn| {
        conn.execute_batch("DROP TRIGGER block_attendance;")?;
        Ok(())
    })
    .unwrap();
    assert_eq!(stitcher.restitch_pending(100).unwrap(), 1);

    let rec = pool
        .with_conn(|conn| load_attendance(conn, "E003", &day()))
        .unwrap()
        .unwrap();
    assert_eq!(rec.hours_worked, 2.0);
}

#[tokio::test]
async fn rejected_credentials_leave_cursor_alone() {
    let pool = memory_pool();
    pool.with_conn(|conn| save_cursor(conn, &at(10, 9, 0))).unwrap();

    let gateway = Arc::new(MemoryGateway::with_events(vec![punch(
        1,
        "E004",
        at(10, 9, 30),
        Direction::In,
    )]));
    gateway.reject_auth(true);
    let puller = puller(&pool, gateway);

    let err = puller.pull_incremental_at(at(10, 12, 0), None).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));

    let cursor = pool.with_conn(|conn| load_cursor(conn)).unwrap();
    assert_eq!(cursor, Some(at(10, 9, 0)));

    let ledger = pool.with_conn(|conn| load_sync_status(conn)).unwrap();
    let inc = ledger.iter().find(|s| s.kind == SyncKind::Incremental).unwrap();
    assert_eq!(inc.state, SyncState::Failed);
    assert_eq!(inc.error_count, 1);
    assert!(inc.last_error.is_some());
}

#[tokio::test]
async fn backfill_stitches_without_moving_cursor() {
    let pool = memory_pool();
    pool.with_conn(|conn| save_cursor(conn, &at(12, 8, 0))).unwrap();

    let gateway = Arc::new(MemoryGateway::with_events(vec![
        punch(11, "E005", at(5, 9, 0), Direction::In),
        punch(12, "E005", at(5, 17, 0), Direction::Out),
    ]));
    let puller = puller(&pool, gateway);

    let outcome = puller.pull_range(at(5, 0, 0), at(5, 23, 59), None).await.unwrap();
    assert!(matches!(outcome, PullOutcome::Completed { ingested: 2, .. }));

    let cursor = pool.with_conn(|conn| load_cursor(conn)).unwrap();
    assert_eq!(cursor, Some(at(12, 8, 0)));

    let rec = pool
        .with_conn(|conn| load_attendance(conn, "E005", &at(5, 0, 0).date()))
        .unwrap()
        .unwrap();
    assert_eq!(rec.hours_worked, 8.0);
}
