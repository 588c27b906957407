//! External terminal gateway seam.
//!
//! The puller and the gap detector only see [`TerminalGateway`]; the HTTP
//! client and the in-memory gateway are interchangeable behind it.

pub mod http;
pub mod memory;
pub mod payload;

use crate::errors::AppResult;
use crate::models::punch::{PUNCH_TIME_FORMAT, RawPunchEvent};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

/// Inclusive time range sent to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}",
            self.start.format(PUNCH_TIME_FORMAT),
            self.end.format(PUNCH_TIME_FORMAT)
        )
    }
}

/// One page of punches.
#[derive(Debug, Clone, Default)]
pub struct PunchPage {
    pub events: Vec<RawPunchEvent>,
    /// Total records the gateway reports for the whole range.
    pub total: u64,
    pub has_next: bool,
    /// Records dropped because they could not be decoded.
    pub malformed: usize,
}

#[async_trait]
pub trait TerminalGateway: Send + Sync {
    /// Obtain (or refresh) the access token.
    async fn authenticate(&self) -> AppResult<()>;

    /// Fetch page `page` (1-based) of punches inside `range`.
    async fn fetch_page(&self, range: &TimeRange, page: u32, page_size: u32)
    -> AppResult<PunchPage>;

    /// Number of punches the gateway holds inside `range`.
    async fn count(&self, range: &TimeRange) -> AppResult<u64>;
}
