use crate::config::Config;
use crate::db::initialize::open;
use crate::db::queries::{load_cursor, load_sync_status};
use crate::errors::AppResult;
use crate::models::health::HealthStatus;
use crate::models::sync::SyncState;
use crate::ui::messages::{field, header, info};
use crate::utils::colors::{GREEN, GREY, RED, YELLOW, color_for_health, paint};
use crate::utils::table::{Column, Table};
use serde_json::Value;
use std::time::Duration;

const DAEMON_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle the `status` command: ledger, cursor and live worker health.
pub async fn handle(cfg: &Config) -> AppResult<()> {
    let pool = open(&cfg.database)?;
    let (ledger, cursor) = pool.with_conn(|conn| Ok((load_sync_status(conn)?, load_cursor(conn)?)))?;

    header("Sync status");
    field(
        "Cursor",
        cursor
            .map(|c| c.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| paint("not set (first run)", GREY)),
    );

    if ledger.is_empty() {
        info("No sync has run yet.");
    } else {
        let mut table = Table::new(vec![
            Column::new("KIND", 12),
            Column::new("STATE", 11),
            Column::new("LAST SUCCESS", 21),
            Column::new("FETCHED", 8),
            Column::new("NEW", 6),
            Column::new("OK/ERR", 9),
            Column::new("LAST ERROR", 0),
        ]);
        for s in ledger {
            let color = match s.state {
                SyncState::Completed => GREEN,
                SyncState::Failed => RED,
                SyncState::Running => YELLOW,
            };
            table.add_row(vec![
                s.kind.as_str().to_string(),
                paint(s.state.as_str(), color),
                s.last_success_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into()),
                s.fetched.to_string(),
                s.ingested.to_string(),
                format!("{}/{}", s.success_count, s.error_count),
                s.last_error.unwrap_or_default(),
            ]);
        }
        print!("{}", table.render());
    }

    println!();
    print_daemon_health(&cfg.admin.bind).await;
    Ok(())
}

async fn print_daemon_health(bind: &str) {
    let url = format!("http://{bind}/health");
    let report = match fetch_health(&url).await {
        Some(v) => v,
        None => {
            info(format!("Daemon not reachable at {bind}"));
            return;
        }
    };

    header("Workers");
    let mut table = Table::new(vec![
        Column::new("WORKER", 14),
        Column::new("STATUS", 11),
        Column::new("FAILURES", 9),
        Column::new("ERRORS", 7),
        Column::new("LAST ERROR", 0),
    ]);
    for w in report["workers"].as_array().into_iter().flatten() {
        let status = w["status"].as_str().unwrap_or("unknown");
        let color = serde_json::from_value::<HealthStatus>(w["status"].clone())
            .map(color_for_health)
            .unwrap_or(GREY);
        table.add_row(vec![
            w["name"].as_str().unwrap_or("?").to_string(),
            paint(status, color),
            w["consecutive_failures"].to_string(),
            w["error_count"].to_string(),
            w["last_error"].as_str().unwrap_or("").to_string(),
        ]);
    }
    print!("{}", table.render());
}

async fn fetch_health(url: &str) -> Option<Value> {
    let client = reqwest::Client::builder()
        .timeout(DAEMON_PROBE_TIMEOUT)
        .build()
        .ok()?;
    let resp = client.get(url).send().await.ok()?;
    resp.json::<Value>().await.ok()
}
