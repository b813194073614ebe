//! Screener engine module.
//!
//! The orchestrator that threads every listed ticker through the universe,
//! liquidity and price-action stages and records one outcome per ticker.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use rally_common::logging::{generate_run_id, short_id};
use rally_common::ScreenerConfig;

use crate::data::{
    history_start, normalize_series, FetchErrorKind, MarketDataSource, ProviderError, Ticker,
};

use super::filters::{FilterReason, FilterStage, ScreenFilters, StageSummary};

// ============================================================================
// Screen Result
// ============================================================================

/// A ticker that passed every stage.
///
/// Percentages are in percent units and come from the same low/high/close
/// triple that decided the price-action stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    pub ticker: Ticker,
    pub name: String,
    /// Close on the evaluation date
    pub current_price: f64,
    /// `(current / low - 1) * 100`
    pub rise_from_low_pct: f64,
    /// `(1 - current / high) * 100`
    pub drop_from_high_pct: f64,
    /// Mean `close * volume` over the liquidity window
    pub avg_trading_value: f64,
    pub market_cap: f64,
}

// ============================================================================
// Ticker Outcome
// ============================================================================

/// How the evaluation of one ticker ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickerOutcome {
    /// Survived every stage
    Passed(ScreenResult),
    /// Evaluated and rejected
    Filtered {
        stage: FilterStage,
        reason: FilterReason,
    },
    /// Could not be evaluated
    Skipped {
        stage: FilterStage,
        kind: FetchErrorKind,
        message: String,
    },
}

impl TickerOutcome {
    /// Stage the ticker stopped at; `None` when it passed.
    pub fn stage(&self) -> Option<FilterStage> {
        match self {
            Self::Passed(_) => None,
            Self::Filtered { stage, .. } | Self::Skipped { stage, .. } => Some(*stage),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Early exit of a per-ticker evaluation.
enum Rejection {
    Filtered(FilterStage, FilterReason),
    Skipped(FilterStage, ProviderError),
}

impl From<Rejection> for TickerOutcome {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Filtered(stage, reason) => Self::Filtered { stage, reason },
            Rejection::Skipped(stage, err) => Self::Skipped {
                stage,
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

// ============================================================================
// Screener Run
// ============================================================================

/// Result of one screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerRun {
    pub run_id: String,
    pub as_of: NaiveDate,
    pub market: String,
    /// Passing tickers, ordered by ticker
    pub results: Vec<ScreenResult>,
    /// Exactly one outcome per listed ticker
    pub outcomes: BTreeMap<Ticker, TickerOutcome>,
    /// Funnel counts in pipeline order
    pub stages: Vec<StageSummary>,
    pub total_tickers: usize,
    pub config_summary: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenerRun {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} tickers in {:.1}s: {} passed, {} skipped",
            self.total_tickers,
            self.duration_secs,
            self.results.len(),
            self.skipped_count()
        )
    }

    /// Tickers that could not be evaluated, with where and why.
    pub fn skipped(&self) -> impl Iterator<Item = (&Ticker, FilterStage, FetchErrorKind, &str)> {
        self.outcomes.iter().filter_map(|(ticker, outcome)| match outcome {
            TickerOutcome::Skipped {
                stage,
                kind,
                message,
            } => Some((ticker, *stage, *kind, message.as_str())),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_skipped()).count()
    }

    /// Summary of one stage.
    pub fn stage(&self, stage: FilterStage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Funnel counts from the outcome ledger.
pub fn summarize_stages<'a>(outcomes: impl IntoIterator<Item = &'a TickerOutcome>) -> Vec<StageSummary> {
    let mut summaries: Vec<StageSummary> = FilterStage::ALL.iter().map(|s| StageSummary::new(*s)).collect();

    for outcome in outcomes {
        let stopped_at = outcome.stage();
        for summary in summaries.iter_mut() {
            match stopped_at {
                Some(stage) if stage < summary.stage => break,
                Some(stage) if stage == summary.stage => {
                    summary.input += 1;
                    if outcome.is_skipped() {
                        summary.skipped += 1;
                    } else {
                        summary.filtered += 1;
                    }
                }
                _ => {
                    summary.input += 1;
                    summary.passed += 1;
                }
            }
        }
    }

    summaries
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The main screener engine.
///
/// Runs the funnel per ticker:
/// 1. Universe: fetch `[as_of, as_of]`, apply the price ceiling
/// 2. Liquidity: fetch one history series and the market cap
/// 3. Price action: evaluate the lookback window of the same history
///
/// Per-ticker failures become `Skipped` outcomes; only a failed universe
/// listing fails the run.
pub struct ScreenerEngine<S: MarketDataSource> {
    source: Arc<S>,
    filters: ScreenFilters,
}

impl<S: MarketDataSource> ScreenerEngine<S> {
    /// Create a new screener engine.
    pub fn new(config: ScreenerConfig, source: Arc<S>) -> Self {
        Self {
            source,
            filters: ScreenFilters::new(config),
        }
    }

    pub fn config(&self) -> &ScreenerConfig {
        self.filters.config()
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Screen the configured market as of `as_of`.
    pub async fn run(&self, as_of: NaiveDate) -> Result<ScreenerRun> {
        let started_at = Utc::now();
        let run_id = generate_run_id();
        let config = self.config();

        info!(
            run_id = short_id(&run_id),
            market = %config.market,
            %as_of,
            source = self.source.name(),
            thresholds = %config.summary(),
            "Starting screening run"
        );

        let mut tickers = self
            .source
            .list_tickers(as_of, &config.market)
            .await
            .with_context(|| format!("Failed to list {} tickers as of {}", config.market, as_of))?;
        tickers.sort();
        tickers.dedup();

        info!(
            run_id = short_id(&run_id),
            count = tickers.len(),
            "Universe listed"
        );

        let concurrency = config.concurrency.max(1);
        let evaluated: Vec<(Ticker, TickerOutcome)> = stream::iter(tickers.iter())
            .map(|ticker| async move { (ticker.clone(), self.evaluate(ticker, as_of).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let outcomes: BTreeMap<Ticker, TickerOutcome> = evaluated.into_iter().collect();
        let results: Vec<_> = outcomes
            .values()
            .filter_map(|o| match o {
                TickerOutcome::Passed(result) => Some(result.clone()),
                _ => None,
            })
            .collect();
        let stages = summarize_stages(outcomes.values());

        for summary in &stages {
            info!(
                run_id = short_id(&run_id),
                stage = %summary.stage,
                input = summary.input,
                passed = summary.passed,
                filtered = summary.filtered,
                skipped = summary.skipped,
                "Stage complete"
            );
        }

        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let run = ScreenerRun {
            run_id,
            as_of,
            market: config.market.clone(),
            results,
            outcomes,
            stages,
            total_tickers: tickers.len(),
            config_summary: config.summary(),
            started_at,
            completed_at,
            duration_secs,
        };

        info!(
            run_id = short_id(&run.run_id),
            passed = run.results.len(),
            skipped = run.skipped_count(),
            duration = format!("{:.1}s", duration_secs),
            "Screening run complete"
        );

        Ok(run)
    }

    /// Evaluate one ticker through all stages.
    pub async fn evaluate(&self, ticker: &str, as_of: NaiveDate) -> TickerOutcome {
        match self.screen(ticker, as_of).await {
            Ok(result) => {
                debug!(ticker, rise = result.rise_from_low_pct, "Ticker passed");
                TickerOutcome::Passed(result)
            }
            Err(Rejection::Filtered(stage, reason)) => {
                debug!(ticker, %stage, %reason, "Ticker filtered");
                Rejection::Filtered(stage, reason).into()
            }
            Err(Rejection::Skipped(stage, err)) => {
                warn!(ticker, %stage, error = %err, "Ticker skipped");
                Rejection::Skipped(stage, err).into()
            }
        }
    }

    async fn screen(&self, ticker: &str, as_of: NaiveDate) -> Result<ScreenResult, Rejection> {
        use FilterStage::{Liquidity, PriceAction, Universe};

        // Stage 1: Universe
        let today = self
            .source
            .get_daily_series(ticker, as_of, as_of)
            .await
            .map_err(|e| Rejection::Skipped(Universe, e))?;
        let quote = self
            .filters
            .universe(ticker, &normalize_series(today), as_of)
            .map_err(|r| Rejection::Filtered(Universe, r))?;

        // Stage 2: Liquidity, on a history shared with stage 3
        let from = history_start(as_of, self.config().history_days());
        let history = self
            .source
            .get_daily_series(ticker, from, as_of)
            .await
            .map_err(|e| Rejection::Skipped(Liquidity, e))?;
        let history = normalize_series(history);

        let market_cap = self
            .source
            .get_market_cap(ticker, as_of)
            .await
            .map_err(|e| Rejection::Skipped(Liquidity, e))?;
        let liquidity = self
            .filters
            .liquidity_metric(ticker, &history, as_of, market_cap)
            .map_err(|e| Rejection::Skipped(Liquidity, e))?;
        self.filters
            .liquidity(&liquidity)
            .map_err(|r| Rejection::Filtered(Liquidity, r))?;

        // Stage 3: Price action
        let window = self
            .filters
            .price_window(ticker, &history, as_of)
            .map_err(|e| Rejection::Skipped(PriceAction, e))?;
        self.filters
            .price_action(&window)
            .map_err(|r| Rejection::Filtered(PriceAction, r))?;

        let name = match self.source.get_ticker_name(ticker).await {
            Ok(name) => name,
            Err(e) => {
                debug!(ticker, error = %e, "Name lookup failed, using ticker");
                ticker.to_string()
            }
        };

        debug!(ticker, quote = quote.price, window_close = window.current, "Stages passed");

        Ok(ScreenResult {
            ticker: ticker.to_string(),
            name,
            current_price: window.current,
            rise_from_low_pct: window.rise_from_low_pct(),
            drop_from_high_pct: window.drop_from_high_pct(),
            avg_trading_value: liquidity.avg_trading_value,
            market_cap: liquidity.market_cap,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
