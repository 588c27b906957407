//! Incremental and historical ingestion from the terminal gateway.
//!
//! A run resolves its time range, pages through the gateway, filters
//! non-attendance devices, stages the new punches and stitches the touched
//! days. The cursor only moves once every page of a run has been staged and
//! stitched.

use crate::config::{GatewayConfig, PullerConfig};
use crate::core::continuity::verify_and_filter;
use crate::core::stitcher::Stitcher;
use crate::db::log::oplog;
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::gateway::{TerminalGateway, TimeRange};
use crate::models::punch::RawPunchEvent;
use crate::models::sync::SyncKind;
use chrono::{Duration, Local, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    Completed { fetched: u64, ingested: u64 },
    AlreadyRunning,
}

/// Terminals whose alias matches one of these patterns are not attendance
/// devices (door locks, access panels) and are kept out of staging.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    patterns: Vec<Regex>,
}

impl DeviceFilter {
    pub fn new(patterns: &[String]) -> AppResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn from_config(cfg: &GatewayConfig) -> AppResult<Self> {
        Self::new(&cfg.excluded_terminal_patterns)
    }

    pub fn is_excluded(&self, ev: &RawPunchEvent) -> bool {
        self.patterns.iter().any(|re| re.is_match(&ev.terminal_alias))
    }

    /// Split into (attendance, excluded).
    pub fn split(&self, events: Vec<RawPunchEvent>) -> (Vec<RawPunchEvent>, Vec<RawPunchEvent>) {
        events.into_iter().partition(|e| !self.is_excluded(e))
    }
}

/// Clears the running flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RunCounters {
    fetched: u64,
    ingested: u64,
}

pub struct Puller {
    pool: DbPool,
    gateway: Arc<dyn TerminalGateway>,
    stitcher: Stitcher,
    filter: DeviceFilter,
    cfg: PullerConfig,
    page_size: u32,
    incremental_running: AtomicBool,
    historical_running: AtomicBool,
    override_start: Mutex<Option<NaiveDateTime>>,
}

impl Puller {
    pub fn new(
        pool: DbPool,
        gateway: Arc<dyn TerminalGateway>,
        stitcher: Stitcher,
        filter: DeviceFilter,
        cfg: PullerConfig,
        page_size: u32,
    ) -> Self {
        Self {
            pool,
            gateway,
            stitcher,
            filter,
            cfg,
            page_size: page_size.max(1),
            incremental_running: AtomicBool::new(false),
            historical_running: AtomicBool::new(false),
            override_start: Mutex::new(None),
        }
    }

    fn flag(&self, kind: SyncKind) -> &AtomicBool {
        match kind {
            SyncKind::Incremental => &self.incremental_running,
            SyncKind::Historical => &self.historical_running,
        }
    }

    pub fn is_running(&self, kind: SyncKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    /// Start the next incremental run from `start` instead of the cursor.
    pub fn set_override(&self, start: NaiveDateTime) {
        if let Ok(mut slot) = self.override_start.lock() {
            info!(start = %start, "Polling window override set");
            *slot = Some(start);
        }
    }

    pub fn pending_override(&self) -> Option<NaiveDateTime> {
        self.override_start.lock().ok().and_then(|s| *s)
    }

    fn clear_override(&self, used: NaiveDateTime) {
        if let Ok(mut slot) = self.override_start.lock()
            && *slot == Some(used)
        {
            *slot = None;
        }
    }

    pub fn cursor(&self) -> AppResult<Option<NaiveDateTime>> {
        self.pool.with_conn(|conn| queries::load_cursor(conn))
    }

    /// Range for an incremental run started at `now`. The flag tells whether
    /// the override was used.
    pub fn resolve_range(&self, now: NaiveDateTime) -> AppResult<(TimeRange, Option<NaiveDateTime>)> {
        let end = now - Duration::seconds(self.cfg.commit_buffer_secs.max(0));

        if let Some(start) = self.pending_override() {
            return Ok((TimeRange::new(start, end), Some(start)));
        }

        let start = match self.cursor()? {
            Some(cursor) => cursor,
            None => now - Duration::hours(self.cfg.first_run_lookback_hours.max(1)),
        };
        Ok((TimeRange::new(start, end), None))
    }

    // ---------------------------------------------------------------------
    // Incremental
    // ---------------------------------------------------------------------

    pub async fn pull_incremental(&self, limit: Option<u32>) -> AppResult<PullOutcome> {
        self.pull_incremental_at(Local::now().naive_local(), limit).await
    }

    pub async fn pull_incremental_at(
        &self,
        now: NaiveDateTime,
        limit: Option<u32>,
    ) -> AppResult<PullOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.incremental_running) else {
            debug!("Incremental sync already running");
            return Ok(PullOutcome::AlreadyRunning);
        };

        let kind = SyncKind::Incremental;
        self.pool.with_conn(|conn| queries::mark_sync_running(conn, kind))?;

        let mut counters = RunCounters::default();
        let (range, used_override) = match self.resolve_range(now) {
            Ok(r) => r,
            Err(e) => return self.finish(kind, None, counters, Err(e)),
        };

        if range.start > range.end {
            debug!(range = %range, "Nothing to fetch yet");
            return self.finish(kind, Some(&range), counters, Ok(()));
        }

        let result = self.run_incremental(&range, limit, &mut counters).await;
        if result.is_ok()
            && let Some(start) = used_override
        {
            self.clear_override(start);
        }
        self.finish(kind, Some(&range), counters, result)
    }

    async fn run_incremental(
        &self,
        range: &TimeRange,
        limit: Option<u32>,
        counters: &mut RunCounters,
    ) -> AppResult<()> {
        let page_size = limit.unwrap_or(self.page_size).max(1);

        // 1) Authenticate
        self.gateway.authenticate().await?;

        // 2) Page through the range, staging and stitching page by page
        let mut page = 1u32;
        let mut known_pages: Option<u32> = None;
        let mut latest: Option<NaiveDateTime> = None;
        let mut ascending = true;
        let mut truncated = false;
        loop {
            let fetched = match self.gateway.fetch_page(range, page, page_size).await {
                Ok(p) => p,
                Err(AppError::Data(msg)) if known_pages.is_some_and(|k| page < k) => {
                    warn!(page, range = %range, error = %msg, "Skipping malformed page");
                    page += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            known_pages = Some(pages_for(fetched.total, page_size));
            let received = fetched.events.len() + fetched.malformed;
            counters.fetched += received as u64;

            let page_earliest = fetched.events.iter().map(|e| e.punch_time).min();
            if let (Some(prev), Some(first)) = (latest, page_earliest)
                && first < prev
            {
                ascending = false;
            }

            let (inserted, page_latest) = self.commit_page(fetched.events)?;
            counters.ingested += inserted as u64;
            latest = latest.max(page_latest);

            if !fetched.has_next || received < page_size as usize {
                break;
            }
            if page >= self.cfg.max_pages_per_run {
                truncated = true;
                break;
            }
            page += 1;
        }

        // 3) Cursor, once every page of the run has committed. A run cut by
        // the page cap only moves it when pages arrived oldest first, since
        // the unread pages could otherwise hold older punches.
        if truncated && !ascending {
            warn!(range = %range, "Page cap reached on an unordered listing, cursor kept");
            return Ok(());
        }
        if let Some(latest) = latest {
            self.advance_cursor(latest + Duration::seconds(1))?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Historical
    // ---------------------------------------------------------------------

    /// Backfill `[from, to]`. Never moves the cursor.
    pub async fn pull_range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: Option<u32>,
    ) -> AppResult<PullOutcome> {
        if from > to {
            return Err(AppError::InvalidDate(format!(
                "range start {from} is after its end {to}"
            )));
        }
        let Some(_guard) = FlightGuard::acquire(&self.historical_running) else {
            debug!("Historical sync already running");
            return Ok(PullOutcome::AlreadyRunning);
        };

        let kind = SyncKind::Historical;
        self.pool.with_conn(|conn| queries::mark_sync_running(conn, kind))?;

        let range = TimeRange::new(from, to);
        let mut counters = RunCounters::default();
        let result = self.run_historical(&range, limit, &mut counters).await;
        self.finish(kind, Some(&range), counters, result)
    }

    async fn run_historical(
        &self,
        range: &TimeRange,
        limit: Option<u32>,
        counters: &mut RunCounters,
    ) -> AppResult<()> {
        let page_size = limit.unwrap_or(self.page_size).max(1);
        self.gateway.authenticate().await?;

        // 1) Collect every page first
        let mut all = Vec::new();
        let mut page = 1u32;
        let mut known_pages: Option<u32> = None;
        loop {
            let fetched = match self.gateway.fetch_page(range, page, page_size).await {
                Ok(p) => p,
                Err(AppError::Data(msg)) if known_pages.is_some_and(|k| page < k) => {
                    warn!(page, range = %range, error = %msg, "Skipping malformed page");
                    page += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            known_pages = Some(pages_for(fetched.total, page_size));
            let received = fetched.events.len() + fetched.malformed;
            counters.fetched += received as u64;
            all.extend(fetched.events);

            if !fetched.has_next || received < page_size as usize {
                break;
            }
            page += 1;
        }

        // 2) Stage and stitch once
        counters.ingested = self.commit_page(all)?.0 as u64;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Shared
    // ---------------------------------------------------------------------

    /// Filter, stage and stitch one batch. Returns the number of new rows
    /// and the newest punch time of the batch, excluded devices included.
    fn commit_page(&self, events: Vec<RawPunchEvent>) -> AppResult<(usize, Option<NaiveDateTime>)> {
        if events.is_empty() {
            return Ok((0, None));
        }
        let latest = events.iter().map(|e| e.punch_time).max();

        // 1) Device-class filter
        let (attendance, excluded) = self.filter.split(events);

        // 2) Continuity + staging
        let (fresh, inserted) = self.pool.with_conn(|conn| {
            // Anchor taken before this batch's excluded punches land
            let last_known = queries::max_source_id(conn)?;
            if !excluded.is_empty() {
                let n = queries::insert_excluded(conn, &excluded)?;
                debug!(excluded = n, "Recorded non-attendance punches");
            }
            let fresh = verify_and_filter(attendance, last_known);
            let inserted = queries::insert_raw_punches(conn, &fresh)?;
            Ok((fresh, inserted))
        })?;

        // 3) Stitch every touched employee+day
        let groups: BTreeSet<_> = fresh.iter().map(|e| e.day_key()).collect();
        self.stitcher.stitch_groups(&groups)?;

        Ok((inserted, latest))
    }

    /// Forward-only cursor write.
    fn advance_cursor(&self, next: NaiveDateTime) -> AppResult<()> {
        self.pool.with_conn(|conn| {
            let current = queries::load_cursor(conn)?;
            if current.is_none_or(|c| next > c) {
                queries::save_cursor(conn, &next)?;
            }
            Ok(())
        })
    }

    /// Write the ledger and the operation log, then hand back the outcome.
    fn finish(
        &self,
        kind: SyncKind,
        range: Option<&TimeRange>,
        counters: RunCounters,
        result: AppResult<()>,
    ) -> AppResult<PullOutcome> {
        let target = range.map(|r| r.to_string()).unwrap_or_default();

        match result {
            Ok(()) => {
                info!(
                    kind = kind.as_str(),
                    range = %target,
                    fetched = counters.fetched,
                    ingested = counters.ingested,
                    "Sync completed"
                );
                self.pool.with_conn(|conn| {
                    queries::mark_sync_completed(conn, kind, counters.fetched, counters.ingested)?;
                    oplog(
                        conn,
                        &format!("sync_{}", kind.as_str()),
                        &target,
                        &format!("fetched={} ingested={}", counters.fetched, counters.ingested),
                    )
                })?;
                Ok(PullOutcome::Completed {
                    fetched: counters.fetched,
                    ingested: counters.ingested,
                })
            }
            Err(e) => {
                match &e {
                    AppError::Auth(_) | AppError::Config(_) => error!(
                        kind = kind.as_str(),
                        error = %e,
                        "Gateway credentials rejected or missing"
                    ),
                    err if err.is_transient() => warn!(
                        kind = kind.as_str(),
                        range = %target,
                        error = %e,
                        "Gateway unreachable, will retry next cycle"
                    ),
                    _ => error!(kind = kind.as_str(), range = %target, error = %e, "Sync failed"),
                }

                let message = e.to_string();
                self.pool.with_conn(|conn| {
                    queries::mark_sync_failed(
                        conn,
                        kind,
                        counters.fetched,
                        counters.ingested,
                        &message,
                    )?;
                    oplog(conn, &format!("sync_{}_failed", kind.as_str()), &target, &message)
                })?;
                Err(e)
            }
        }
    }
}

fn pages_for(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    total.div_ceil(size).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stitcher::StitchRules;
    use crate::db::initialize::init_db;
    use crate::gateway::MemoryGateway;
    use crate::models::direction::Direction;
    use crate::models::sync::SyncState;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn setup(events: Vec<RawPunchEvent>) -> (DbPool, Arc<MemoryGateway>, Puller) {
        setup_with(events, PullerConfig::default())
    }

    fn setup_with(
        events: Vec<RawPunchEvent>,
        cfg: PullerConfig,
    ) -> (DbPool, Arc<MemoryGateway>, Puller) {
        let pool = DbPool::in_memory().unwrap();
        init_db(&pool).unwrap();
        let gateway = Arc::new(MemoryGateway::with_events(events));
        let filter = DeviceFilter::from_config(&GatewayConfig::default()).unwrap();
        let puller = Puller::new(
            pool.clone(),
            gateway.clone(),
            Stitcher::new(pool.clone(), StitchRules::default()),
            filter,
            cfg,
            100,
        );
        (pool, gateway, puller)
    }

    #[test]
    fn device_filter_matches_alias() {
        let filter = DeviceFilter::from_config(&GatewayConfig::default()).unwrap();
        let lobby = RawPunchEvent::new(1, "E1", ts(9, 0, 0), Direction::In, "SN1").with_alias("Lobby");
        let door = RawPunchEvent::new(2, "E1", ts(9, 0, 0), Direction::In, "SN2")
            .with_alias("Back DOOR lock");
        assert!(!filter.is_excluded(&lobby));
        assert!(filter.is_excluded(&door));
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        let err = DeviceFilter::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(pages_for(0, 100), 0);
        assert_eq!(pages_for(100, 100), 1);
        assert_eq!(pages_for(101, 100), 2);
    }

    #[tokio::test]
    async fn first_run_uses_lookback_and_buffer() {
        let (_pool, gateway, puller) = setup(Vec::new());
        let now = ts(12, 0, 0);
        puller.pull_incremental_at(now, None).await.unwrap();

        let seen = gateway.ranges_seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].start, now - Duration::hours(24));
        assert_eq!(seen[0].end, ts(11, 59, 0));
    }

    #[tokio::test]
    async fn cursor_advances_past_latest_punch() {
        let (pool, _gw, puller) = setup(vec![
            RawPunchEvent::new(1, "E001", ts(9, 0, 0), Direction::In, "T1"),
            RawPunchEvent::new(2, "E001", ts(10, 30, 0), Direction::Out, "T1"),
        ]);
        let out = puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 2, ingested: 2 });
        assert_eq!(puller.cursor().unwrap(), Some(ts(10, 30, 1)));

        let status = pool.with_conn(|c| queries::load_sync_status(c)).unwrap();
        assert_eq!(status[0].state, SyncState::Completed);
    }

    #[tokio::test]
    async fn second_run_starts_at_cursor() {
        let (_pool, gateway, puller) = setup(vec![RawPunchEvent::new(
            1,
            "E001",
            ts(9, 0, 0),
            Direction::In,
            "T1",
        )]);
        puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap();
        puller.pull_incremental_at(ts(12, 5, 0), None).await.unwrap();
        let seen = gateway.ranges_seen();
        assert_eq!(seen[1].start, ts(9, 0, 1));
    }

    #[tokio::test]
    async fn excluded_devices_are_not_staged() {
        let (pool, _gw, puller) = setup(vec![
            RawPunchEvent::new(1, "E001", ts(9, 0, 0), Direction::In, "T1").with_alias("Door 2"),
            RawPunchEvent::new(2, "E001", ts(9, 1, 0), Direction::In, "T2").with_alias("Lobby"),
        ]);
        let out = puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 2, ingested: 1 });

        let local = pool
            .with_conn(|c| queries::count_local_punches(c, &ts(0, 0, 0), &ts(23, 59, 59)))
            .unwrap();
        assert_eq!(local, 2);
        let staged = pool
            .with_conn(|c| queries::load_day_punches(c, "E001", &ts(0, 0, 0).date()))
            .unwrap();
        assert_eq!(staged.len(), 1);
        // Cursor still moves past the excluded punch
        assert_eq!(puller.cursor().unwrap(), Some(ts(9, 1, 1)));
    }

    #[tokio::test]
    async fn pagination_stops_at_short_page() {
        let events = (1..=5)
            .map(|i| RawPunchEvent::new(i, "E001", ts(9, i as u32, 0), Direction::In, "T1"))
            .collect();
        let (_pool, gateway, puller) = setup(events);
        let out = puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 5, ingested: 5 });
        assert_eq!(gateway.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn network_failure_marks_failed_and_keeps_cursor() {
        let (pool, gateway, puller) = setup(vec![RawPunchEvent::new(
            1,
            "E001",
            ts(9, 0, 0),
            Direction::In,
            "T1",
        )]);
        gateway.fail_next_fetches(1);
        let err = puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(puller.cursor().unwrap(), None);

        let status = pool.with_conn(|c| queries::load_sync_status(c)).unwrap();
        assert_eq!(status[0].state, SyncState::Failed);
        assert!(status[0].last_error.as_deref().unwrap_or("").contains("timed out"));
        assert!(!puller.is_running(SyncKind::Incremental));
    }

    fn four_punches() -> Vec<RawPunchEvent> {
        vec![
            RawPunchEvent::new(1, "E001", ts(9, 0, 0), Direction::In, "T1"),
            RawPunchEvent::new(2, "E002", ts(9, 10, 0), Direction::In, "T1"),
            RawPunchEvent::new(3, "E003", ts(9, 20, 0), Direction::In, "T1"),
            RawPunchEvent::new(4, "E004", ts(9, 30, 0), Direction::In, "T1"),
        ]
    }

    fn staged_count(pool: &DbPool) -> i64 {
        pool.with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM raw_punches", [], |r| r.get(0))?))
            .unwrap()
    }

    #[tokio::test]
    async fn failure_on_later_page_keeps_cursor() {
        let (pool, gateway, puller) = setup(four_punches());
        pool.with_conn(|c| queries::save_cursor(c, &ts(8, 0, 0))).unwrap();
        gateway.newest_first(true);
        gateway.fail_page_once(2);

        let err = puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap_err();
        assert!(err.is_transient());
        // Page 1 is staged but the cursor has not moved
        assert_eq!(staged_count(&pool), 2);
        assert_eq!(puller.cursor().unwrap(), Some(ts(8, 0, 0)));

        // The retry covers the same range and picks up the rest
        puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(staged_count(&pool), 4);
        assert_eq!(puller.cursor().unwrap(), Some(ts(9, 30, 1)));
    }

    #[tokio::test]
    async fn newest_first_listing_is_fully_staged() {
        let (pool, gateway, puller) = setup(four_punches());
        gateway.newest_first(true);

        let out = puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 4, ingested: 4 });
        assert_eq!(staged_count(&pool), 4);
        assert_eq!(puller.cursor().unwrap(), Some(ts(9, 30, 1)));
    }

    #[tokio::test]
    async fn page_cap_on_unordered_listing_keeps_cursor() {
        let events = (1..=6)
            .map(|i| RawPunchEvent::new(i, "E001", ts(9, i as u32, 0), Direction::In, "T1"))
            .collect();
        let cfg = PullerConfig {
            max_pages_per_run: 2,
            ..PullerConfig::default()
        };
        let (pool, gateway, puller) = setup_with(events, cfg);
        pool.with_conn(|c| queries::save_cursor(c, &ts(8, 0, 0))).unwrap();
        gateway.newest_first(true);

        puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(staged_count(&pool), 4);
        assert_eq!(puller.cursor().unwrap(), Some(ts(8, 0, 0)));
    }

    #[tokio::test]
    async fn page_cap_on_ordered_listing_moves_cursor() {
        let events = (1..=6)
            .map(|i| RawPunchEvent::new(i, "E001", ts(9, i as u32, 0), Direction::In, "T1"))
            .collect();
        let cfg = PullerConfig {
            max_pages_per_run: 2,
            ..PullerConfig::default()
        };
        let (_pool, _gw, puller) = setup_with(events, cfg);

        puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(puller.cursor().unwrap(), Some(ts(9, 4, 1)));
    }

    #[tokio::test]
    async fn malformed_middle_page_is_skipped() {
        let events = (1..=5)
            .map(|i| RawPunchEvent::new(i, "E001", ts(9, i as u32, 0), Direction::In, "T1"))
            .collect();
        let (pool, gateway, puller) = setup(events);
        gateway.malformed_page(2);

        let out = puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 3, ingested: 3 });
        assert_eq!(gateway.fetch_calls(), 3);
        assert_eq!(staged_count(&pool), 3);
    }

    #[tokio::test]
    async fn malformed_first_page_fails_the_run() {
        let (pool, gateway, puller) = setup(four_punches());
        gateway.malformed_page(1);

        let err = puller.pull_incremental_at(ts(12, 0, 0), Some(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Data(_)));
        assert_eq!(staged_count(&pool), 0);
        assert_eq!(puller.cursor().unwrap(), None);
    }

    #[tokio::test]
    async fn override_is_used_then_consumed() {
        let (_pool, gateway, puller) = setup(Vec::new());
        puller.set_override(ts(6, 0, 0));
        puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap();
        assert_eq!(gateway.ranges_seen()[0].start, ts(6, 0, 0));
        assert_eq!(puller.pending_override(), None);
    }

    #[tokio::test]
    async fn historical_run_leaves_cursor_alone() {
        let (pool, _gw, puller) = setup(vec![
            RawPunchEvent::new(1, "E001", ts(9, 0, 0), Direction::In, "T1"),
            RawPunchEvent::new(2, "E001", ts(17, 0, 0), Direction::Out, "T1"),
        ]);
        let out = puller
            .pull_range(ts(0, 0, 0), ts(23, 59, 59), Some(1))
            .await
            .unwrap();
        assert_eq!(out, PullOutcome::Completed { fetched: 2, ingested: 2 });
        assert_eq!(puller.cursor().unwrap(), None);

        let rec = pool
            .with_conn(|c| queries::load_attendance(c, "E001", &ts(0, 0, 0).date()))
            .unwrap()
            .unwrap();
        assert_eq!(rec.hours_worked, 8.0);
    }

    #[tokio::test]
    async fn concurrent_trigger_reports_already_running() {
        let (_pool, _gw, puller) = setup(Vec::new());
        let _held = FlightGuard::acquire(&puller.incremental_running).unwrap();
        let out = puller.pull_incremental_at(ts(12, 0, 0), None).await.unwrap();
        assert_eq!(out, PullOutcome::AlreadyRunning);
        // The other kind is independent
        let hist = puller.pull_range(ts(0, 0, 0), ts(1, 0, 0), None).await.unwrap();
        assert!(matches!(hist, PullOutcome::Completed { .. }));
    }
}
