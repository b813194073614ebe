//! JSON market snapshot source.
//!
//! A snapshot is a self-contained dump of a market: ticker identity, daily
//! bars, and market capitalization history. It backs offline CLI runs and
//! every test fixture.
//!
//! ```json
//! {
//!   "tickers": [
//!     {
//!       "ticker": "005930",
//!       "name": "Samsung Electronics",
//!       "market": "KOSPI",
//!       "market_caps": { "2024-05-02": 4.2e14 },
//!       "bars": [
//!         { "date": "2024-05-02", "open": 77000, "high": 78000,
//!           "low": 76500, "close": 77600, "volume": 12000000 }
//!       ]
//!     }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use rally_common::error::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use super::provider::{MarketDataSource, ProviderError};
use super::{normalize_series, PricePoint, Ticker};

/// Market name that lists every ticker regardless of market.
const ALL_MARKETS: &str = "ALL";

/// One ticker inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub ticker: Ticker,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market: String,
    /// Constant market cap, used when `market_caps` has nothing on or before the date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    /// Dated market cap history
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub market_caps: BTreeMap<NaiveDate, f64>,
    #[serde(default)]
    pub bars: Vec<PricePoint>,
}

impl TickerSnapshot {
    pub fn new(ticker: impl Into<Ticker>, name: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            market: market.into(),
            market_cap: None,
            market_caps: BTreeMap::new(),
            bars: Vec::new(),
        }
    }

    /// Set a constant market cap.
    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// Record the market cap effective from `date`.
    pub fn with_market_cap_on(mut self, date: NaiveDate, market_cap: f64) -> Self {
        self.market_caps.insert(date, market_cap);
        self
    }

    pub fn with_bar(mut self, bar: PricePoint) -> Self {
        self.bars.push(bar);
        self
    }

    pub fn with_bars(mut self, bars: impl IntoIterator<Item = PricePoint>) -> Self {
        self.bars.extend(bars);
        self
    }

    /// Latest market cap dated on or before `as_of`, else the constant one.
    pub fn market_cap_as_of(&self, as_of: NaiveDate) -> Option<f64> {
        self.market_caps
            .range(..=as_of)
            .next_back()
            .map(|(_, cap)| *cap)
            .or(self.market_cap)
    }

    fn in_market(&self, market: &str) -> bool {
        market.eq_ignore_ascii_case(ALL_MARKETS) || self.market.eq_ignore_ascii_case(market)
    }
}

/// A full market snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub tickers: Vec<TickerSnapshot>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, ticker: TickerSnapshot) -> Self {
        self.tickers.push(ticker);
        self
    }

    /// Load a snapshot from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> rally_common::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(rally_common::Error::NotFound(format!("snapshot {}", path.display())));
        }
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&content).context(format!("Failed to parse snapshot {}", path.display()))
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> rally_common::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).context(format!("Failed to write snapshot {}", path.display()))
    }
}

/// In-memory [`MarketDataSource`] over a [`MarketSnapshot`].
pub struct SnapshotSource {
    tickers: HashMap<Ticker, TickerSnapshot>,
}

impl SnapshotSource {
    /// Index a snapshot. Bars are sorted and deduplicated by date; a ticker
    /// listed twice keeps its last entry.
    pub fn new(snapshot: MarketSnapshot) -> Self {
        let tickers = snapshot
            .tickers
            .into_iter()
            .map(|mut t| {
                t.bars = normalize_series(std::mem::take(&mut t.bars));
                (t.ticker.clone(), t)
            })
            .collect();
        Self { tickers }
    }

    /// Load and index a snapshot file.
    pub fn from_file(path: impl AsRef<Path>) -> rally_common::Result<Self> {
        let snapshot = MarketSnapshot::from_file(path)?;
        let source = Self::new(snapshot);
        debug!(tickers = source.len(), "Loaded market snapshot");
        Ok(source)
    }

    /// Number of tickers in the snapshot.
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    fn lookup(&self, ticker: &str) -> Result<&TickerSnapshot, ProviderError> {
        self.tickers
            .get(ticker)
            .ok_or_else(|| ProviderError::DataUnavailable(format!("unknown ticker {}", ticker)))
    }
}

#[async_trait]
impl MarketDataSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn list_tickers(
        &self,
        _as_of: NaiveDate,
        market: &str,
    ) -> Result<Vec<Ticker>, ProviderError> {
        let mut tickers: Vec<Ticker> = self
            .tickers
            .values()
            .filter(|t| t.in_market(market))
            .map(|t| t.ticker.clone())
            .collect();
        tickers.sort();
        Ok(tickers)
    }

    async fn get_daily_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let snapshot = self.lookup(ticker)?;
        Ok(snapshot
            .bars
            .iter()
            .filter(|p| p.date >= from && p.date <= to)
            .cloned()
            .collect())
    }

    async fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Result<f64, ProviderError> {
        self.lookup(ticker)?
            .market_cap_as_of(as_of)
            .ok_or_else(|| {
                ProviderError::DataUnavailable(format!("no market cap for {} as of {}", ticker, as_of))
            })
    }

    async fn get_ticker_name(&self, ticker: &str) -> Result<String, ProviderError> {
        let snapshot = self.lookup(ticker)?;
        if snapshot.name.is_empty() {
            Ok(snapshot.ticker.clone())
        } else {
            Ok(snapshot.name.clone())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn bar(d: u32, close: f64) -> PricePoint {
        PricePoint::new(day(d), close, close, close, close, 1000.0)
    }

    fn sample() -> SnapshotSource {
        SnapshotSource::new(
            MarketSnapshot::new()
                .with_ticker(
                    TickerSnapshot::new("000660", "SK hynix", "KOSPI")
                        .with_market_cap(1.0e12)
                        .with_bars(vec![bar(3, 3.0), bar(2, 2.0)]),
                )
                .with_ticker(
                    TickerSnapshot::new("035720", "", "KOSDAQ")
                        .with_market_cap_on(day(1), 5.0e11)
                        .with_market_cap_on(day(3), 6.0e11),
                ),
        )
    }

    #[tokio::test]
    async fn test_list_tickers_by_market() {
        let source = sample();
        assert_eq!(source.list_tickers(day(3), "KOSPI").await.unwrap(), vec!["000660"]);
        assert_eq!(source.list_tickers(day(3), "kosdaq").await.unwrap(), vec!["035720"]);
        assert_eq!(
            source.list_tickers(day(3), "ALL").await.unwrap(),
            vec!["000660", "035720"]
        );
        assert!(source.list_tickers(day(3), "NASDAQ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_series_is_sorted_and_ranged() {
        let source = sample();
        let series = source.get_daily_series("000660", day(1), day(3)).await.unwrap();
        assert_eq!(series.iter().map(|p| p.date).collect::<Vec<_>>(), vec![day(2), day(3)]);

        let empty = source.get_daily_series("000660", day(4), day(4)).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_data_unavailable() {
        let source = sample();
        let err = source.get_daily_series("999999", day(1), day(3)).await.unwrap_err();
        assert!(matches!(err, ProviderError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_market_cap_as_of() {
        let source = sample();
        assert_eq!(source.get_market_cap("035720", day(2)).await.unwrap(), 5.0e11);
        assert_eq!(source.get_market_cap("035720", day(9)).await.unwrap(), 6.0e11);
        assert!(source.get_market_cap("035720", NaiveDate::from_ymd_opt(2024, 4, 30).unwrap())
            .await
            .is_err());
        assert_eq!(source.get_market_cap("000660", day(2)).await.unwrap(), 1.0e12);
    }

    #[test]
    fn test_ticker_name_falls_back_to_ticker() {
        let source = sample();
        let name = |t| tokio_test::block_on(source.get_ticker_name(t)).unwrap();
        assert_eq!(name("000660"), "SK hynix");
        assert_eq!(name("035720"), "035720");
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");

        let snapshot = MarketSnapshot::new().with_ticker(
            TickerSnapshot::new("000660", "SK hynix", "KOSPI")
                .with_market_cap(1.0e12)
                .with_bar(bar(2, 2.0)),
        );
        snapshot.save(&path).unwrap();

        let source = SnapshotSource::from_file(&path).unwrap();
        assert_eq!(source.len(), 1);
        let missing = SnapshotSource::from_file(dir.path().join("missing.json")).err().unwrap();
        assert!(matches!(missing, rally_common::Error::NotFound(_)));
        assert_eq!(missing.exit_code(), 3);
    }
}
