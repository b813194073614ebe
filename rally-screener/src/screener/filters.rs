//! Filter stages of the screener.
//!
//! Implements a three-stage funnel, each stage seeing only the survivors of
//! the previous one:
//! 1. Universe: close on the evaluation date at or below the price ceiling
//! 2. Liquidity: trailing mean trading value against a share of market cap
//! 3. Price action: rise off the window low, proximity to the window high,
//!    and a floor under the window low

use chrono::NaiveDate;
use rally_common::ScreenerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{trailing_window, PricePoint, ProviderError, Quote, Ticker};

/// Relative slack on inclusive threshold comparisons.
///
/// Absorbs binary floating-point noise (`1.3 * 100.0 != 130.0`) without
/// letting a one-tick shortfall through.
pub const REL_TOLERANCE: f64 = 1e-9;

/// `value >= threshold`, inclusive up to [`REL_TOLERANCE`].
pub fn at_least(value: f64, threshold: f64) -> bool {
    value >= threshold - threshold.abs() * REL_TOLERANCE
}

/// `value <= threshold`, inclusive up to [`REL_TOLERANCE`].
pub fn at_most(value: f64, threshold: f64) -> bool {
    value <= threshold + threshold.abs() * REL_TOLERANCE
}

// ============================================================================
// Filter Stage
// ============================================================================

/// Filter stage identifier for tracking where tickers are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Price ceiling on the evaluation-date close
    Universe,
    /// Trading value relative to market cap
    Liquidity,
    /// Lookback-window price pattern
    PriceAction,
}

impl FilterStage {
    /// All stages in pipeline order.
    pub const ALL: [FilterStage; 3] = [Self::Universe, Self::Liquidity, Self::PriceAction];
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universe => write!(f, "universe"),
            Self::Liquidity => write!(f, "liquidity"),
            Self::PriceAction => write!(f, "price_action"),
        }
    }
}

// ============================================================================
// Filter Reason
// ============================================================================

/// Why a ticker was filtered out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterReason {
    /// No session dated exactly on the evaluation date
    NoTradeOnDate,
    /// Close is non-finite or non-positive
    InvalidPrice { price: f64 },
    /// Close above the universe ceiling
    AbovePriceCeiling { price: f64, max_price: f64 },
    /// Average trading value below the required share of market cap
    InsufficientLiquidity { avg_trading_value: f64, required: f64 },
    /// At least one price-action condition failed
    PriceActionUnmet { window: PriceWindow },
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTradeOnDate => write!(f, "no trade on evaluation date"),
            Self::InvalidPrice { price } => write!(f, "invalid price {}", price),
            Self::AbovePriceCeiling { price, max_price } => {
                write!(f, "price {} above ceiling {}", price, max_price)
            }
            Self::InsufficientLiquidity {
                avg_trading_value,
                required,
            } => write!(
                f,
                "avg trading value {:.0} below required {:.0}",
                avg_trading_value, required
            ),
            Self::PriceActionUnmet { window } => {
                write!(f, "price action unmet: {}", window.failed_conditions().join(", "))
            }
        }
    }
}

// ============================================================================
// Stage Summary
// ============================================================================

/// Per-stage funnel counts. `input = passed + filtered + skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: FilterStage,
    pub input: usize,
    pub passed: usize,
    pub filtered: usize,
    pub skipped: usize,
}

impl StageSummary {
    pub fn new(stage: FilterStage) -> Self {
        Self {
            stage,
            input: 0,
            passed: 0,
            filtered: 0,
            skipped: 0,
        }
    }

    /// Elimination rate (%), filtered and skipped together.
    pub fn elimination_rate(&self) -> f64 {
        if self.input > 0 {
            ((self.filtered + self.skipped) as f64 / self.input as f64) * 100.0
        } else {
            0.0
        }
    }
}

// ============================================================================
// Liquidity Metric
// ============================================================================

/// Trailing liquidity of a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityMetric {
    pub ticker: Ticker,
    /// Mean of `close * volume` over the window
    pub avg_trading_value: f64,
    pub market_cap: f64,
    /// Points actually averaged (at most `liquidity_days`)
    pub window_days: usize,
}

// ============================================================================
// Price Window
// ============================================================================

/// Low/high/current of the lookback window and the three condition outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindow {
    /// Minimum daily low in the window
    pub low: f64,
    /// Maximum daily high in the window
    pub high: f64,
    /// Close of the last point in the window
    pub current: f64,
    pub window_days: usize,
    /// `current >= low * (1 + rise_from_low)`
    pub rise_from_low_met: bool,
    /// `current >= high * (1 - drop_from_high)`
    pub near_high_met: bool,
    /// `current >= low * (1 - max_drawdown)`
    pub drawdown_floor_met: bool,
}

impl PriceWindow {
    /// All three conditions hold.
    pub fn passes(&self) -> bool {
        self.rise_from_low_met && self.near_high_met && self.drawdown_floor_met
    }

    /// Rise of the close above the low, in percent.
    pub fn rise_from_low_pct(&self) -> f64 {
        (self.current / self.low - 1.0) * 100.0
    }

    /// Pullback of the close from the high, in percent.
    pub fn drop_from_high_pct(&self) -> f64 {
        (1.0 - self.current / self.high) * 100.0
    }

    /// Names of the failed conditions.
    pub fn failed_conditions(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.rise_from_low_met {
            failed.push("rise_from_low");
        }
        if !self.near_high_met {
            failed.push("drop_from_high");
        }
        if !self.drawdown_floor_met {
            failed.push("drawdown_floor");
        }
        failed
    }
}

// ============================================================================
// Screen Filters
// ============================================================================

/// The three screening stages over one configuration.
#[derive(Debug, Clone)]
pub struct ScreenFilters {
    config: ScreenerConfig,
}

impl ScreenFilters {
    pub fn new(config: ScreenerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScreenerConfig::default())
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    // ========================================================================
    // Stage 1: Universe
    // ========================================================================

    /// Quote the close dated exactly `as_of` and apply the price ceiling.
    ///
    /// A missing session is never read as price 0.
    pub fn universe(
        &self,
        ticker: &str,
        series: &[PricePoint],
        as_of: NaiveDate,
    ) -> Result<Quote, FilterReason> {
        let point = series
            .iter()
            .rev()
            .find(|p| p.date == as_of)
            .ok_or(FilterReason::NoTradeOnDate)?;

        let price = point.close;
        if !price.is_finite() || price <= 0.0 {
            return Err(FilterReason::InvalidPrice { price });
        }
        if !at_most(price, self.config.max_price) {
            return Err(FilterReason::AbovePriceCeiling {
                price,
                max_price: self.config.max_price,
            });
        }

        Ok(Quote {
            ticker: ticker.to_string(),
            price,
        })
    }

    // ========================================================================
    // Stage 2: Liquidity
    // ========================================================================

    /// Average trading value over the trailing `liquidity_days` sessions.
    ///
    /// Fewer sessions are accepted. An empty window or an unusable market cap
    /// means the ticker cannot be evaluated.
    pub fn liquidity_metric(
        &self,
        ticker: &str,
        series: &[PricePoint],
        as_of: NaiveDate,
        market_cap: f64,
    ) -> Result<LiquidityMetric, ProviderError> {
        let window = trailing_window(series, as_of, self.config.liquidity_days);
        if window.is_empty() {
            return Err(ProviderError::DataUnavailable(format!(
                "no sessions for {} in liquidity window ending {}",
                ticker, as_of
            )));
        }
        if !market_cap.is_finite() || market_cap <= 0.0 {
            return Err(ProviderError::DataUnavailable(format!(
                "unusable market cap {} for {}",
                market_cap, ticker
            )));
        }

        let total: f64 = window.iter().map(PricePoint::trading_value).sum();
        Ok(LiquidityMetric {
            ticker: ticker.to_string(),
            avg_trading_value: total / window.len() as f64,
            market_cap,
            window_days: window.len(),
        })
    }

    /// Keep iff `avg_trading_value >= liquidity_ratio * market_cap`.
    pub fn liquidity(&self, metric: &LiquidityMetric) -> Result<(), FilterReason> {
        let required = self.config.liquidity_ratio * metric.market_cap;
        if at_least(metric.avg_trading_value, required) {
            Ok(())
        } else {
            Err(FilterReason::InsufficientLiquidity {
                avg_trading_value: metric.avg_trading_value,
                required,
            })
        }
    }

    // ========================================================================
    // Stage 3: Price Action
    // ========================================================================

    /// Evaluate the trailing `lookback_days` window ending at `as_of`.
    ///
    /// Errors when the window is empty or its prices are unusable.
    pub fn price_window(
        &self,
        ticker: &str,
        series: &[PricePoint],
        as_of: NaiveDate,
    ) -> Result<PriceWindow, ProviderError> {
        let window = trailing_window(series, as_of, self.config.lookback_days);
        let last = window.last().ok_or_else(|| {
            ProviderError::DataUnavailable(format!(
                "no sessions for {} in lookback window ending {}",
                ticker, as_of
            ))
        })?;

        let low = window.iter().map(|p| p.low).fold(f64::INFINITY, f64::min);
        let high = window.iter().map(|p| p.high).fold(f64::NEG_INFINITY, f64::max);
        let current = last.close;

        if !(low.is_finite() && high.is_finite() && current.is_finite()) || low <= 0.0 || high <= 0.0 {
            return Err(ProviderError::DataUnavailable(format!(
                "unusable prices for {} in lookback window (low {}, high {}, close {})",
                ticker, low, high, current
            )));
        }

        let c = &self.config;
        Ok(PriceWindow {
            low,
            high,
            current,
            window_days: window.len(),
            rise_from_low_met: at_least(current, low * (1.0 + c.rise_from_low_pct)),
            near_high_met: at_least(current, high * (1.0 - c.drop_from_high_pct)),
            drawdown_floor_met: at_least(current, low * (1.0 - c.max_drawdown_pct)),
        })
    }

    /// Keep iff all three conditions hold.
    pub fn price_action(&self, window: &PriceWindow) -> Result<(), FilterReason> {
        if window.passes() {
            Ok(())
        } else {
            Err(FilterReason::PriceActionUnmet {
                window: window.clone(),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    fn flat(date: NaiveDate, price: f64, volume: f64) -> PricePoint {
        PricePoint::new(date, price, price, price, price, volume)
    }

    /// `n` consecutive daily points ending at `as_of`, all at `price`.
    fn flat_series(n: i64, price: f64, volume: f64) -> Vec<PricePoint> {
        (0..n)
            .rev()
            .map(|i| flat(as_of() - Duration::days(i), price, volume))
            .collect()
    }

    #[test]
    fn test_tolerance_helpers() {
        assert!(at_least(130.0, 100.0 * 1.3));
        assert!(at_least(100.0 * 1.3, 130.0));
        assert!(!at_least(129.99, 130.0));
        assert!(at_most(10_000.0, 10_000.0));
        assert!(!at_most(10_000.01, 10_000.0));
    }

    #[test]
    fn test_stage_order_and_display() {
        assert!(FilterStage::Universe < FilterStage::Liquidity);
        assert!(FilterStage::Liquidity < FilterStage::PriceAction);
        assert_eq!(FilterStage::PriceAction.to_string(), "price_action");
    }

    #[test]
    fn test_universe_filter() {
        let filters = ScreenFilters::with_defaults();

        let quote = filters
            .universe("A", &[flat(as_of(), 9_500.0, 1.0)], as_of())
            .unwrap();
        assert_eq!(quote.price, 9_500.0);

        // Boundary is inclusive
        assert!(filters.universe("A", &[flat(as_of(), 10_000.0, 1.0)], as_of()).is_ok());

        assert_eq!(
            filters.universe("B", &[flat(as_of(), 12_000.0, 1.0)], as_of()),
            Err(FilterReason::AbovePriceCeiling {
                price: 12_000.0,
                max_price: 10_000.0
            })
        );
    }

    #[test]
    fn test_universe_requires_session_on_date() {
        let filters = ScreenFilters::with_defaults();
        let yesterday = flat(as_of() - Duration::days(1), 5_000.0, 1.0);
        assert_eq!(
            filters.universe("A", &[yesterday], as_of()),
            Err(FilterReason::NoTradeOnDate)
        );
        assert_eq!(filters.universe("A", &[], as_of()), Err(FilterReason::NoTradeOnDate));
    }

    #[test]
    fn test_universe_invalid_price() {
        let filters = ScreenFilters::with_defaults();
        assert!(matches!(
            filters.universe("A", &[flat(as_of(), 0.0, 1.0)], as_of()),
            Err(FilterReason::InvalidPrice { .. })
        ));
        assert!(matches!(
            filters.universe("A", &[flat(as_of(), f64::NAN, 1.0)], as_of()),
            Err(FilterReason::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_liquidity_metric_uses_trailing_window() {
        let filters = ScreenFilters::with_defaults();
        // 30 sessions; only the last 20 are averaged.
        let mut series = flat_series(30, 1_000.0, 1.0);
        for p in series.iter_mut().rev().take(20) {
            p.volume = 50.0;
        }

        let metric = filters.liquidity_metric("A", &series, as_of(), 1_000_000.0).unwrap();
        assert_eq!(metric.window_days, 20);
        assert!((metric.avg_trading_value - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_liquidity_short_history_accepted() {
        let filters = ScreenFilters::with_defaults();
        let series = flat_series(5, 1_000.0, 10.0);
        let metric = filters.liquidity_metric("A", &series, as_of(), 1.0).unwrap();
        assert_eq!(metric.window_days, 5);
    }

    #[test]
    fn test_liquidity_data_unavailable() {
        let filters = ScreenFilters::with_defaults();
        assert!(matches!(
            filters.liquidity_metric("A", &[], as_of(), 1.0e9),
            Err(ProviderError::DataUnavailable(_))
        ));
        let series = flat_series(5, 1_000.0, 10.0);
        assert!(filters.liquidity_metric("A", &series, as_of(), 0.0).is_err());
        assert!(filters.liquidity_metric("A", &series, as_of(), f64::NAN).is_err());
    }

    #[test]
    fn test_liquidity_threshold_inclusive() {
        let filters = ScreenFilters::with_defaults();
        let metric = LiquidityMetric {
            ticker: "A".into(),
            avg_trading_value: 2.0e9,
            market_cap: 1.0e11,
            window_days: 20,
        };
        assert!(filters.liquidity(&metric).is_ok());

        let short = LiquidityMetric {
            avg_trading_value: 1.9e9,
            ..metric
        };
        assert!(matches!(
            filters.liquidity(&short),
            Err(FilterReason::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_price_window_conditions() {
        let filters = ScreenFilters::with_defaults();
        // Low 100, high 140, close 130: rise 30%, drop ~7.1%
        let mut series = flat_series(60, 120.0, 1.0);
        series[10].low = 100.0;
        series[20].high = 140.0;
        series[59] = flat(as_of(), 130.0, 1.0);

        let window = filters.price_window("A", &series, as_of()).unwrap();
        assert_eq!(window.low, 100.0);
        assert_eq!(window.high, 140.0);
        assert_eq!(window.current, 130.0);
        assert!(window.passes());
        assert!((window.rise_from_low_pct() - 30.0).abs() < 1e-9);
        assert!(filters.price_action(&window).is_ok());
    }

    #[test]
    fn test_price_window_rise_shortfall() {
        let filters = ScreenFilters::with_defaults();
        let mut series = flat_series(60, 120.0, 1.0);
        series[10].low = 100.0;
        series[59] = flat(as_of(), 129.99, 1.0);

        let window = filters.price_window("A", &series, as_of()).unwrap();
        assert!(!window.rise_from_low_met);
        assert!(window.near_high_met);
        assert_eq!(window.failed_conditions(), vec!["rise_from_low"]);
        assert!(matches!(
            filters.price_action(&window),
            Err(FilterReason::PriceActionUnmet { .. })
        ));
    }

    #[test]
    fn test_price_window_drawdown_floor() {
        let config = ScreenerConfig {
            rise_from_low_pct: 0.0,
            drop_from_high_pct: 1.0,
            max_drawdown_pct: 0.15,
            ..ScreenerConfig::default()
        };
        let filters = ScreenFilters::new(config);

        // The window low always bounds the close from below, so the floor
        // holds for any consistent window.
        let series = flat_series(60, 100.0, 1.0);
        let window = filters.price_window("A", &series, as_of()).unwrap();
        assert!(window.drawdown_floor_met);
    }

    #[test]
    fn test_price_window_close_below_window_low() {
        // Final session reports close 90 under its own low of 95
        let mut series = flat_series(60, 100.0, 1.0);
        series[59] = PricePoint::new(as_of(), 96.0, 96.0, 95.0, 90.0, 1.0);

        let tight = ScreenFilters::new(ScreenerConfig {
            max_drawdown_pct: 0.05,
            ..ScreenerConfig::default()
        });
        let window = tight.price_window("A", &series, as_of()).unwrap();
        assert_eq!(window.low, 95.0);
        assert_eq!(window.current, 90.0);
        assert!(!window.drawdown_floor_met);
        assert!(window.failed_conditions().contains(&"drawdown_floor"));

        let loose = ScreenFilters::new(ScreenerConfig {
            max_drawdown_pct: 0.15,
            ..ScreenerConfig::default()
        });
        let window = loose.price_window("A", &series, as_of()).unwrap();
        assert!(window.drawdown_floor_met);
        assert!(!window.failed_conditions().contains(&"drawdown_floor"));
    }

    #[test]
    fn test_price_window_empty_is_unavailable() {
        let filters = ScreenFilters::with_defaults();
        let future: Vec<_> = vec![flat(as_of() + Duration::days(1), 100.0, 1.0)];
        assert!(matches!(
            filters.price_window("A", &future, as_of()),
            Err(ProviderError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_stage_summary_rate() {
        let summary = StageSummary {
            stage: FilterStage::Universe,
            input: 4,
            passed: 2,
            filtered: 1,
            skipped: 1,
        };
        assert!((summary.elimination_rate() - 50.0).abs() < 1e-9);
        assert_eq!(StageSummary::new(FilterStage::Liquidity).elimination_rate(), 0.0);
    }
}
