//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rally_screener::data::{MarketSnapshot, PricePoint, SnapshotSource, TickerSnapshot};

pub const MARKET: &str = "KOSPI";

/// Evaluation date used across tests.
pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
}

/// Shape of a ticker's 60-session lookback window.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub low: f64,
    pub high: f64,
    pub current: f64,
    /// Trading value (close x volume) of every session
    pub trading_value: f64,
    pub market_cap: Option<f64>,
    /// Drop the evaluation-date session
    pub skip_as_of: bool,
}

impl WindowSpec {
    pub fn new(low: f64, high: f64, current: f64) -> Self {
        Self {
            low,
            high,
            current,
            trading_value: 5.0e9,
            market_cap: Some(1.0e11),
            skip_as_of: false,
        }
    }

    pub fn liquidity(mut self, trading_value: f64, market_cap: f64) -> Self {
        self.trading_value = trading_value;
        self.market_cap = Some(market_cap);
        self
    }

    pub fn no_market_cap(mut self) -> Self {
        self.market_cap = None;
        self
    }

    pub fn without_as_of(mut self) -> Self {
        self.skip_as_of = true;
        self
    }

    /// 60 daily sessions ending at [`as_of`] whose window low, high and last
    /// close are exactly `low`, `high` and `current`.
    pub fn bars(&self) -> Vec<PricePoint> {
        let mid = (self.low + self.high) / 2.0;
        (0..60i64)
            .rev()
            .filter(|i| !(self.skip_as_of && *i == 0))
            .map(|i| {
                let date = as_of() - Duration::days(i);
                let (low, high, close) = match i {
                    40 => (self.low, mid, mid),
                    20 => (mid, self.high, mid),
                    0 => (self.current, self.current, self.current),
                    _ => (mid, mid, mid),
                };
                PricePoint::new(date, close, high, low, close, self.trading_value / close)
            })
            .collect()
    }

    pub fn ticker(&self, ticker: &str) -> TickerSnapshot {
        let snapshot = TickerSnapshot::new(ticker, format!("{} Corp", ticker), MARKET).with_bars(self.bars());
        match self.market_cap {
            Some(cap) => snapshot.with_market_cap(cap),
            None => snapshot,
        }
    }
}

/// Build an in-memory source from `(ticker, spec)` pairs.
pub fn snapshot_source(specs: &[(&str, WindowSpec)]) -> SnapshotSource {
    let snapshot = specs
        .iter()
        .fold(MarketSnapshot::new(), |s, (ticker, spec)| s.with_ticker(spec.ticker(ticker)));
    SnapshotSource::new(snapshot)
}

/// One ticker stopping at each stage, plus one that passes.
///
/// - `X`: low 100, high 150, close 135 (passes)
/// - `W`: same window, close 125 (fails the rise condition)
/// - `Y`: 1.0e9 average value against a 6.0e10 cap (fails liquidity)
/// - `Z`: no session on the evaluation date (fails universe)
pub fn funnel_source() -> SnapshotSource {
    snapshot_source(&[
        ("X", WindowSpec::new(100.0, 150.0, 135.0)),
        ("W", WindowSpec::new(100.0, 150.0, 125.0)),
        ("Y", WindowSpec::new(100.0, 150.0, 135.0).liquidity(1.0e9, 6.0e10)),
        ("Z", WindowSpec::new(100.0, 150.0, 135.0).without_as_of()),
    ])
}
