//! In-memory gateway used by tests.
//!
//! Behaves like the HTTP gateway (inclusive ranges, 1-based pages,
//! `count`/`next` envelope) and can be told to fail in the ways the real one
//! does.

use super::{PunchPage, TerminalGateway, TimeRange};
use crate::errors::{AppError, AppResult};
use crate::models::punch::RawPunchEvent;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryGateway {
    events: Mutex<Vec<RawPunchEvent>>,
    ranges_seen: Mutex<Vec<TimeRange>>,
    reject_auth: AtomicBool,
    /// Number of upcoming fetches answered with a network error.
    failing_fetches: AtomicU32,
    /// Extra records reported by `count` but never served: simulates a gateway
    /// that holds data we cannot page through.
    hidden_records: AtomicU64,
    /// Serve the listing newest punch first.
    newest_first: AtomicBool,
    /// Page answered once with a timeout (0 = none).
    failing_page: AtomicU32,
    /// Page always answered with undecodable data (0 = none).
    malformed_page: AtomicU32,
    fetch_calls: AtomicU32,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<RawPunchEvent>) -> Self {
        let gw = Self::new();
        gw.push(events);
        gw
    }

    pub fn push(&self, events: Vec<RawPunchEvent>) {
        if let Ok(mut guard) = self.events.lock() {
            guard.extend(events);
            guard.sort_by_key(|e| e.source_id);
        }
    }

    pub fn reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn hide_records(&self, n: u64) {
        self.hidden_records.store(n, Ordering::SeqCst);
    }

    pub fn newest_first(&self, on: bool) {
        self.newest_first.store(on, Ordering::SeqCst);
    }

    /// The next fetch of `page` times out; later fetches of it succeed.
    pub fn fail_page_once(&self, page: u32) {
        self.failing_page.store(page, Ordering::SeqCst);
    }

    pub fn malformed_page(&self, page: u32) {
        self.malformed_page.store(page, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Ranges requested through `fetch_page`, in call order.
    pub fn ranges_seen(&self) -> Vec<TimeRange> {
        self.ranges_seen
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    fn in_range(&self, range: &TimeRange) -> AppResult<Vec<RawPunchEvent>> {
        let guard = self
            .events
            .lock()
            .map_err(|_| AppError::Other("memory gateway poisoned".into()))?;
        Ok(guard
            .iter()
            .filter(|e| range.contains(&e.punch_time))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TerminalGateway for MemoryGateway {
    async fn authenticate(&self) -> AppResult<()> {
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(AppError::Auth("invalid credentials".into()));
        }
        Ok(())
    }

    async fn fetch_page(
        &self,
        range: &TimeRange,
        page: u32,
        page_size: u32,
    ) -> AppResult<PunchPage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.ranges_seen.lock() {
            seen.push(*range);
        }

        let pending = self.failing_fetches.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_fetches.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::Timeout(format!("fetch of {range} timed out")));
        }

        if page > 0
            && self
                .failing_page
                .compare_exchange(page, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(AppError::Timeout(format!("page {page} of {range} timed out")));
        }
        if page > 0 && self.malformed_page.load(Ordering::SeqCst) == page {
            return Err(AppError::Data(format!("page {page} of {range} is not valid JSON")));
        }

        let mut all = self.in_range(range)?;
        if self.newest_first.load(Ordering::SeqCst) {
            all.sort_by(|a, b| b.punch_time.cmp(&a.punch_time));
        }
        let size = page_size.max(1) as usize;
        let offset = (page.max(1) as usize - 1) * size;

        let events: Vec<RawPunchEvent> = all.iter().skip(offset).take(size).cloned().collect();

        Ok(PunchPage {
            has_next: offset + events.len() < all.len(),
            total: all.len() as u64,
            events,
            malformed: 0,
        })
    }

    async fn count(&self, range: &TimeRange) -> AppResult<u64> {
        let served = self.in_range(range)?.len() as u64;
        Ok(served + self.hidden_records.load(Ordering::SeqCst))
    }
}
