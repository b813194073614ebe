//! Integration tests for unreliable market data sources.
//!
//! Per-ticker failures must become `Skipped` outcomes without affecting other
//! tickers; the guard layer must turn hangs into timeouts and retry flaky calls.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use rally_common::{Config, ScreenerConfig};
use rally_screener::data::{
    FetchErrorKind, GuardConfig, GuardedSource, MarketDataSource, PricePoint, ProviderError,
    SnapshotSource, Ticker,
};
use rally_screener::screener::{FilterStage, ScreenerEngine, TickerOutcome};

use common::{as_of, funnel_source, snapshot_source, WindowSpec};

// ============================================================================
// Faulty Source
// ============================================================================

/// How a ticker misbehaves.
#[derive(Debug, Clone)]
enum Fault {
    /// Every series request fails with a network error
    SeriesDown,
    /// Only the multi-day history request fails
    HistoryDown,
    /// The first `n` market cap requests fail, then succeed
    FlakyCap(u32),
    /// Series requests never complete
    Hang,
    /// Name lookups fail
    NoName,
}

/// Snapshot source with per-ticker fault injection.
struct FaultySource {
    inner: SnapshotSource,
    faults: HashMap<String, Fault>,
    list_fails: bool,
    cap_calls: AtomicU32,
}

impl FaultySource {
    fn new(inner: SnapshotSource) -> Self {
        Self {
            inner,
            faults: HashMap::new(),
            list_fails: false,
            cap_calls: AtomicU32::new(0),
        }
    }

    fn with_fault(mut self, ticker: &str, fault: Fault) -> Self {
        self.faults.insert(ticker.to_string(), fault);
        self
    }

    fn failing_listing(mut self) -> Self {
        self.list_fails = true;
        self
    }
}

#[async_trait]
impl MarketDataSource for FaultySource {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn list_tickers(
        &self,
        as_of: NaiveDate,
        market: &str,
    ) -> Result<Vec<Ticker>, ProviderError> {
        if self.list_fails {
            return Err(ProviderError::Unavailable("listing service down".into()));
        }
        self.inner.list_tickers(as_of, market).await
    }

    async fn get_daily_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        match self.faults.get(ticker) {
            Some(Fault::SeriesDown) => Err(ProviderError::Network("connection reset".into())),
            Some(Fault::HistoryDown) if from != to => {
                Err(ProviderError::Network("connection reset".into()))
            }
            Some(Fault::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung call completed")
            }
            _ => self.inner.get_daily_series(ticker, from, to).await,
        }
    }

    async fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Result<f64, ProviderError> {
        if let Some(Fault::FlakyCap(failures)) = self.faults.get(ticker) {
            let call = self.cap_calls.fetch_add(1, Ordering::SeqCst);
            if call < *failures {
                return Err(ProviderError::Unavailable("503 Service Unavailable".into()));
            }
        }
        self.inner.get_market_cap(ticker, as_of).await
    }

    async fn get_ticker_name(&self, ticker: &str) -> Result<String, ProviderError> {
        if let Some(Fault::NoName) = self.faults.get(ticker) {
            return Err(ProviderError::Network("name service down".into()));
        }
        self.inner.get_ticker_name(ticker).await
    }
}

fn passing_pair() -> SnapshotSource {
    snapshot_source(&[
        ("A", WindowSpec::new(100.0, 150.0, 135.0)),
        ("B", WindowSpec::new(100.0, 150.0, 140.0)),
    ])
}

fn fast_guard(max_retries: u32) -> GuardConfig {
    GuardConfig {
        timeout: Duration::from_millis(100),
        max_retries,
        retry_backoff: Duration::from_millis(1),
        ..GuardConfig::default()
    }
}

// ============================================================================
// Skipped outcomes
// ============================================================================

#[tokio::test]
async fn test_transient_universe_failure_is_isolated() {
    let source = FaultySource::new(passing_pair()).with_fault("A", Fault::SeriesDown);
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(source));

    let run = engine.run(as_of()).await.unwrap();

    match &run.outcomes["A"] {
        TickerOutcome::Skipped {
            stage,
            kind,
            message,
        } => {
            assert_eq!(*stage, FilterStage::Universe);
            assert_eq!(*kind, FetchErrorKind::Transient);
            assert!(message.contains("connection reset"));
        }
        other => panic!("unexpected outcome for A: {:?}", other),
    }
    assert!(run.outcomes["B"].is_passed());
    assert_eq!(run.results.len(), 1);

    let universe = run.stage(FilterStage::Universe).unwrap();
    assert_eq!((universe.skipped, universe.filtered, universe.passed), (1, 0, 1));
}

#[tokio::test]
async fn test_history_failure_is_attributed_to_liquidity() {
    let source = FaultySource::new(passing_pair()).with_fault("B", Fault::HistoryDown);
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(source));

    let run = engine.run(as_of()).await.unwrap();
    assert!(matches!(
        run.outcomes["B"],
        TickerOutcome::Skipped {
            stage: FilterStage::Liquidity,
            kind: FetchErrorKind::Transient,
            ..
        }
    ));
    assert!(run.outcomes["A"].is_passed());
}

#[tokio::test]
async fn test_missing_market_cap_is_data_unavailable() {
    let source = snapshot_source(&[
        ("A", WindowSpec::new(100.0, 150.0, 135.0)),
        ("C", WindowSpec::new(100.0, 150.0, 135.0).no_market_cap()),
    ]);
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(source));

    let run = engine.run(as_of()).await.unwrap();
    assert!(matches!(
        run.outcomes["C"],
        TickerOutcome::Skipped {
            stage: FilterStage::Liquidity,
            kind: FetchErrorKind::DataUnavailable,
            ..
        }
    ));
    let skipped: Vec<_> = run.skipped().map(|(t, ..)| t.clone()).collect();
    assert_eq!(skipped, vec!["C"]);
}

#[tokio::test]
async fn test_listing_failure_fails_the_run() {
    let source = FaultySource::new(funnel_source()).failing_listing();
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(source));

    let err = engine.run(as_of()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to list KOSPI tickers"));
}

#[tokio::test]
async fn test_name_failure_falls_back_to_ticker() {
    let source = FaultySource::new(passing_pair()).with_fault("A", Fault::NoName);
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(source));

    let run = engine.run(as_of()).await.unwrap();
    let a = run.results.iter().find(|r| r.ticker == "A").unwrap();
    assert_eq!(a.name, "A");
}

// ============================================================================
// Guarded source
// ============================================================================

#[tokio::test]
async fn test_hanging_call_times_out_as_transient() {
    let source = FaultySource::new(passing_pair()).with_fault("A", Fault::Hang);
    let guarded = GuardedSource::new(source, fast_guard(0));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(guarded));

    let run = engine.run(as_of()).await.unwrap();
    match &run.outcomes["A"] {
        TickerOutcome::Skipped { kind, message, .. } => {
            assert_eq!(*kind, FetchErrorKind::Transient);
            assert!(message.contains("Timed out"));
        }
        other => panic!("unexpected outcome for A: {:?}", other),
    }
    assert!(run.outcomes["B"].is_passed());
}

#[tokio::test]
async fn test_retries_recover_flaky_source() {
    let source = FaultySource::new(passing_pair()).with_fault("A", Fault::FlakyCap(2));
    let guarded = Arc::new(GuardedSource::new(source, fast_guard(2)));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::clone(&guarded));

    let run = engine.run(as_of()).await.unwrap();
    assert!(run.outcomes["A"].is_passed());
    assert_eq!(run.skipped_count(), 0);

    let metrics = guarded.metrics().summary().await;
    assert_eq!(metrics.retry_count, 2);
    assert_eq!(metrics.error_count, 2);
}

#[tokio::test]
async fn test_without_retries_flaky_source_is_skipped() {
    let source = FaultySource::new(passing_pair()).with_fault("A", Fault::FlakyCap(1));
    let guarded = GuardedSource::new(source, fast_guard(0));
    let engine = ScreenerEngine::new(ScreenerConfig::default(), Arc::new(guarded));

    let run = engine.run(as_of()).await.unwrap();
    assert!(matches!(
        run.outcomes["A"],
        TickerOutcome::Skipped {
            stage: FilterStage::Liquidity,
            kind: FetchErrorKind::Transient,
            ..
        }
    ));
}

#[tokio::test]
async fn test_screen_applies_source_config() {
    let mut config = Config::default();
    config.source.max_retries = 3;
    config.source.retry_backoff_ms = 1;
    config.screener.max_output_count = 1;

    let source = FaultySource::new(passing_pair()).with_fault("B", Fault::FlakyCap(2));
    let report = rally_screener::screen(&config, source, as_of()).await.unwrap();

    assert_eq!(report.run().results.len(), 2);
    // B rises 40%, A 35%
    assert_eq!(report.ranked().len(), 1);
    assert_eq!(report.ranked()[0].ticker, "B");
}
