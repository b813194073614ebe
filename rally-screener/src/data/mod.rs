//! Market data module.
//!
//! Defines the daily OHLCV types and the `MarketDataSource` abstraction the
//! screener runs against, plus the concrete sources and the guard layer.
//!
//! # Sources
//! - **snapshot**: JSON market snapshot (offline runs, fixtures)
//! - **http**: REST market-data gateway
//!
//! Either one can be wrapped in [`GuardedSource`] for timeouts, rate limiting,
//! retries, and caching.

mod cache;
mod guard;
mod http;
mod provider;
mod rate_limiter;
mod snapshot;

pub use cache::{CacheStats, DataCache};
pub use guard::{GuardConfig, GuardedSource};
pub use http::HttpMarketSource;
pub use provider::{FetchErrorKind, MarketDataSource, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use snapshot::{MarketSnapshot, SnapshotSource, TickerSnapshot};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Identifier of a tradable instrument (e.g. "005930").
pub type Ticker = String;

/// One trading day of OHLCV data for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date
    pub date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Shares traded
    pub volume: f64,
}

impl PricePoint {
    /// Create a point.
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Traded value in currency (close x volume).
    pub fn trading_value(&self) -> f64 {
        self.close * self.volume
    }
}

/// Close price of a ticker on the evaluation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: Ticker,
    pub price: f64,
}

// ============================================================================
// Series Helpers
// ============================================================================

/// Sort a series by date and drop duplicate dates, keeping the last one seen.
pub fn normalize_series(mut series: Vec<PricePoint>) -> Vec<PricePoint> {
    // Stable sort keeps provider order among equal dates, so the later
    // duplicate is the one retained below.
    series.sort_by_key(|p| p.date);
    let mut out: Vec<PricePoint> = Vec::with_capacity(series.len());
    for point in series {
        match out.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => out.push(point),
        }
    }
    out
}

/// The last `days` points dated on or before `as_of`.
///
/// Expects a normalized (date-ascending) series. Returns fewer than `days`
/// points when less history is available.
pub fn trailing_window(series: &[PricePoint], as_of: NaiveDate, days: usize) -> &[PricePoint] {
    let end = series.partition_point(|p| p.date <= as_of);
    let start = end.saturating_sub(days);
    &series[start..end]
}

/// Calendar days to request so that `trading_days` sessions are covered.
///
/// Five sessions per seven calendar days plus two weeks of slack for holidays.
/// `None` when the span does not fit a [`Duration`].
pub fn calendar_span(trading_days: usize) -> Option<Duration> {
    let days = trading_days.checked_mul(7)?.div_ceil(5).checked_add(14)?;
    Duration::try_days(i64::try_from(days).ok()?)
}

/// First calendar date to request for `trading_days` sessions ending at
/// `as_of`, clamped to [`NaiveDate::MIN`].
pub fn history_start(as_of: NaiveDate, trading_days: usize) -> NaiveDate {
    calendar_span(trading_days)
        .and_then(|span| as_of.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

// ============================================================================
// Tests
// ============================================================================
