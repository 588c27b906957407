use crate::config::Config;
use crate::core::gaps::GapDetector;
use crate::db::initialize::open;
use crate::errors::AppResult;
use crate::gateway::HttpGateway;
use crate::ui::messages::{field, header, success, warning};
use crate::utils::colors::{color_for_severity, paint};
use crate::utils::table::{Column, Table};
use chrono::Local;
use std::sync::Arc;

const TS: &str = "%Y-%m-%d %H:%M";

/// Handle the `gaps` command: one detection cycle, read-only.
pub async fn handle(cfg: &Config) -> AppResult<()> {
    let pool = open(&cfg.database)?;
    let gateway = Arc::new(HttpGateway::new(&cfg.gateway)?);
    let detector = GapDetector::new(pool, gateway, cfg.gap_detector.clone());

    let cycle = detector.run_cycle_at(Local::now().naive_local()).await;

    if let Some(err) = &cycle.error {
        warning(format!("Gap detection failed: {err}"));
    } else if cycle.gaps.is_empty() {
        success("No gaps detected in the configured windows.");
    } else {
        header("Detected gaps");
        let mut table = Table::new(vec![
            Column::new("WINDOW", 7),
            Column::new("FROM", 17),
            Column::new("TO", 17),
            Column::new("EXPECTED", 9),
            Column::new("LOCAL", 7),
            Column::new("MISSING", 8),
            Column::new("%", 7),
            Column::new("SEVERITY", 0),
        ]);
        for g in &cycle.gaps {
            table.add_row(vec![
                format!("{}h", g.window_hours),
                g.start.format(TS).to_string(),
                g.end.format(TS).to_string(),
                g.expected.to_string(),
                g.actual.to_string(),
                g.missing.to_string(),
                format!("{:.1}", g.missing_pct),
                paint(g.severity.as_str(), color_for_severity(g.severity)),
            ]);
        }
        print!("{}", table.render());
    }

    println!();
    header("Recommended polling window");
    let w = &cycle.window;
    field("From", w.start_time.format(TS));
    field("To", w.end_time.format(TS));
    field("Minutes", w.window_minutes);
    field("Priority", w.priority.as_str());
    field("Reason", &w.reason);
    if let Some(start) = cycle.recovery_start {
        field("Recovery start", start.format(TS));
    }
    Ok(())
}
