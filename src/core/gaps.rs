//! Gap detection: compare gateway counts with what we hold locally over
//! trailing windows and recommend the next polling window.

use crate::config::{GapDetectorConfig, SeverityThresholds};
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::AppResult;
use crate::gateway::{TerminalGateway, TimeRange};
use crate::models::gap::{DataGap, PollingWindow, Severity, WindowPriority};
use chrono::{DateTime, Duration, Local, NaiveDateTime};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Severity of a window missing `missing` of `expected` records.
/// Thresholds are evaluated from the most severe down.
pub fn classify_severity(missing: u64, missing_pct: f64, t: &SeverityThresholds) -> Severity {
    if missing_pct > t.critical_pct || missing > t.critical_count {
        Severity::Critical
    } else if missing_pct > t.high_pct || missing > t.high_count {
        Severity::High
    } else if missing_pct > t.medium_pct || missing > t.medium_count {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// First critical gap, else first high gap, else the first gap detected.
pub fn pick_worst(gaps: &[DataGap]) -> Option<&DataGap> {
    gaps.iter()
        .find(|g| g.severity == Severity::Critical)
        .or_else(|| gaps.iter().find(|g| g.severity == Severity::High))
        .or_else(|| gaps.first())
}

/// Polling window recommended for `gaps` at `now`.
pub fn select_window(gaps: &[DataGap], now: NaiveDateTime, cfg: &GapDetectorConfig) -> PollingWindow {
    let end = now - Duration::minutes(cfg.end_buffer_minutes);

    let Some(worst) = pick_worst(gaps) else {
        let start = now - Duration::minutes(cfg.normal_window_minutes);
        return PollingWindow {
            start_time: start,
            end_time: end,
            window_minutes: (end - start).num_minutes(),
            reason: "no gaps detected".to_string(),
            priority: WindowPriority::Normal,
        };
    };

    let buffer = (cfg.buffer_minutes_per_hour * i64::from(worst.window_hours)).min(cfg.max_buffer_minutes);
    let start = worst.start - Duration::minutes(buffer);
    let priority = if worst.severity == Severity::Critical {
        WindowPriority::Recovery
    } else {
        WindowPriority::Extended
    };

    PollingWindow {
        start_time: start,
        end_time: end,
        window_minutes: (end - start).num_minutes(),
        reason: format!(
            "{} gap in last {}h: {} of {} records missing ({:.1}%)",
            worst.severity.as_str(),
            worst.window_hours,
            worst.missing,
            worst.expected,
            worst.missing_pct
        ),
        priority,
    }
}

/// Window used when detection itself failed.
pub fn fallback_window(now: NaiveDateTime, cfg: &GapDetectorConfig) -> PollingWindow {
    let end = now - Duration::minutes(cfg.end_buffer_minutes);
    PollingWindow {
        start_time: end - Duration::minutes(cfg.fallback_window_minutes),
        end_time: end,
        window_minutes: cfg.fallback_window_minutes,
        reason: "gap detection failed, using fallback window".to_string(),
        priority: WindowPriority::Extended,
    }
}

/// Result of the last detection cycle, served to operators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GapSnapshot {
    pub checked_at: Option<DateTime<Local>>,
    pub gaps: Vec<DataGap>,
    pub window: Option<PollingWindow>,
    pub last_error: Option<String>,
}

pub struct GapDetector {
    pool: DbPool,
    gateway: Arc<dyn TerminalGateway>,
    cfg: RwLock<GapDetectorConfig>,
    last: RwLock<GapSnapshot>,
}

impl GapDetector {
    pub fn new(pool: DbPool, gateway: Arc<dyn TerminalGateway>, cfg: GapDetectorConfig) -> Self {
        Self {
            pool,
            gateway,
            cfg: RwLock::new(cfg),
            last: RwLock::new(GapSnapshot::default()),
        }
    }

    pub fn config(&self) -> GapDetectorConfig {
        self.cfg
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn update_config(&self, cfg: GapDetectorConfig) {
        if let Ok(mut slot) = self.cfg.write() {
            *slot = cfg;
            info!("Gap detector configuration updated");
        }
    }

    pub fn snapshot(&self) -> GapSnapshot {
        self.last
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub async fn detect_gaps(&self) -> AppResult<Vec<DataGap>> {
        self.detect_gaps_at(Local::now().naive_local()).await
    }

    /// Trailing windows end at the cursor: later punches are simply not
    /// pulled yet.
    pub async fn detect_gaps_at(&self, now: NaiveDateTime) -> AppResult<Vec<DataGap>> {
        let cfg = self.config();
        let cursor = self.pool.with_conn(|conn| queries::load_cursor(conn))?;

        let mut end = now - Duration::minutes(cfg.end_buffer_minutes);
        if let Some(c) = cursor {
            end = end.min(c);
        }

        let mut windows = cfg.windows_hours.clone();
        windows.sort_unstable();
        windows.dedup();

        let mut gaps = Vec::new();
        for hours in windows.into_iter().filter(|h| *h > 0) {
            let start = now - Duration::hours(i64::from(hours));
            if start >= end {
                continue;
            }
            let range = TimeRange::new(start, end);

            let expected = self.gateway.count(&range).await?;
            let actual = self
                .pool
                .with_conn(|conn| queries::count_local_punches(conn, &range.start, &range.end))?;

            debug!(window_hours = hours, expected, actual, "Gap window checked");
            if expected <= actual {
                continue;
            }

            let missing = expected - actual;
            let missing_pct = missing as f64 * 100.0 / expected as f64;
            let severity = classify_severity(missing, missing_pct, &cfg.thresholds);
            gaps.push(DataGap {
                start,
                end,
                window_hours: hours,
                expected,
                actual,
                missing,
                missing_pct,
                severity,
            });
        }

        if !gaps.is_empty() {
            warn!(gaps = gaps.len(), "Data gaps detected");
        }
        Ok(gaps)
    }

    pub async fn compute_optimal_polling_window(&self) -> PollingWindow {
        self.run_cycle_at(Local::now().naive_local()).await.window
    }

    /// Detect, pick the window and keep the snapshot. `recovery_start` is set
    /// when the worst gap is severe enough to redirect the puller.
    pub async fn run_cycle_at(&self, now: NaiveDateTime) -> GapCycle {
        let cfg = self.config();

        let cycle = match self.detect_gaps_at(now).await {
            Ok(gaps) => {
                let window = select_window(&gaps, now, &cfg);
                let recovery_start = pick_worst(&gaps)
                    .filter(|g| g.severity >= cfg.recovery_min_severity)
                    .map(|_| window.start_time);
                GapCycle {
                    gaps,
                    window,
                    recovery_start,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Gap detection failed");
                GapCycle {
                    gaps: Vec::new(),
                    window: fallback_window(now, &cfg),
                    recovery_start: None,
                    error: Some(e.to_string()),
                }
            }
        };

        if let Ok(mut last) = self.last.write() {
            *last = GapSnapshot {
                checked_at: Some(Local::now()),
                gaps: cycle.gaps.clone(),
                window: Some(cycle.window.clone()),
                last_error: cycle.error.clone(),
            };
        }
        cycle
    }
}

#[derive(Debug, Clone)]
pub struct GapCycle {
    pub gaps: Vec<DataGap>,
    pub window: PollingWindow,
    pub recovery_start: Option<NaiveDateTime>,
    pub error: Option<String>,
}
