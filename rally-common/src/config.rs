//! Configuration types for the rally screener.
//!
//! Configuration lives in `~/.rally/`:
//! - `config.json` - base configuration (all sections)
//! - `screener.json` - optional overrides for the `screener` section
//! - `source.json` - optional overrides for the `source` section
//!
//! Every field has a default, so an empty directory yields a usable config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config_loader::load_modular_config;

/// Get the configuration directory (`~/.rally`).
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".rally"),
        |dirs| dirs.home_dir().join(".rally"),
    )
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub screener: ScreenerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the default directory, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_dir(&config_dir())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load the modular configuration files from a directory.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        if value.as_object().map_or(true, |o| o.is_empty()) {
            tracing::info!(dir = %dir.display(), "No config files found, using defaults");
        }
        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("RALLY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RALLY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(price) = lookup("RALLY_MAX_PRICE") {
            match price.parse() {
                Ok(p) => self.screener.max_price = p,
                Err(_) => tracing::warn!(value = %price, "Ignoring unparsable RALLY_MAX_PRICE"),
            }
        }
        if let Some(market) = lookup("RALLY_MARKET") {
            self.screener.market = market;
        }
        if let Some(url) = lookup("RALLY_SOURCE_URL") {
            self.source.kind = SourceKind::Http;
            self.source.base_url = Some(url);
        }
        if let Some(path) = lookup("RALLY_SNAPSHOT") {
            self.source.kind = SourceKind::Snapshot;
            self.source.snapshot_path = Some(path);
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets held at `warn`.
    #[serde(default)]
    pub exclude_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            exclude_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Market Data Source
// ============================================================================

/// Which market data source backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local JSON market snapshot
    #[default]
    Snapshot,
    /// REST market-data gateway
    Http,
}

/// Market data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Path to a JSON snapshot (snapshot kind)
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Gateway base URL (http kind)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent to the gateway, if any
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout applied to every source call
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Token-bucket rate limit; unlimited when absent
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    /// Retries for transient failures (0 = fail on first error)
    #[serde(default)]
    pub max_retries: u32,

    /// Linear backoff step between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// TTL of the daily-series cache; no caching when absent
    #[serde(default)]
    pub cache_ttl_secs: Option<i64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            snapshot_path: None,
            base_url: None,
            api_key: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            requests_per_minute: None,
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            cache_ttl_secs: None,
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    500
}

// ============================================================================
// Screener Thresholds
// ============================================================================

/// Metric used to rank screen results for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Largest rise off the window low first
    #[default]
    RiseFromLow,
    /// Closest to the window high first
    DropFromHigh,
    /// Largest average trading value first
    TradingValue,
    /// Largest market cap first
    MarketCap,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RiseFromLow => write!(f, "rise_from_low"),
            Self::DropFromHigh => write!(f, "drop_from_high"),
            Self::TradingValue => write!(f, "trading_value"),
            Self::MarketCap => write!(f, "market_cap"),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "rise_from_low" | "rise" => Ok(Self::RiseFromLow),
            "drop_from_high" | "drop" => Ok(Self::DropFromHigh),
            "trading_value" | "value" => Ok(Self::TradingValue),
            "market_cap" | "cap" => Ok(Self::MarketCap),
            _ => Err(format!("Unknown sort key: {}", s)),
        }
    }
}

/// Screening thresholds. Percentages are fractions (0.30 = 30%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Market passed to the ticker listing (e.g. "KOSPI", "KOSDAQ", "ALL")
    #[serde(default = "default_market")]
    pub market: String,

    /// Universe ceiling on the evaluation-date close
    #[serde(default = "default_max_price")]
    pub max_price: f64,

    /// Minimum average trading value as a fraction of market cap
    #[serde(default = "default_liquidity_ratio")]
    pub liquidity_ratio: f64,

    /// Trailing trading days averaged by the liquidity filter
    #[serde(default = "default_liquidity_days")]
    pub liquidity_days: usize,

    /// Trailing trading days of the price-action window
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,

    /// Required rise of the close above the window low
    #[serde(default = "default_rise_from_low_pct")]
    pub rise_from_low_pct: f64,

    /// Largest allowed pullback of the close from the window high
    #[serde(default = "default_drop_from_high_pct")]
    pub drop_from_high_pct: f64,

    /// Floor of the close relative to the window low
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,

    /// Number of ranked results presented
    #[serde(default = "default_max_output_count")]
    pub max_output_count: usize,

    /// Ranking metric for presentation
    #[serde(default)]
    pub sort_by: SortKey,

    /// Tickers evaluated at once (1 = strictly sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            market: default_market(),
            max_price: default_max_price(),
            liquidity_ratio: default_liquidity_ratio(),
            liquidity_days: default_liquidity_days(),
            lookback_days: default_lookback_days(),
            rise_from_low_pct: default_rise_from_low_pct(),
            drop_from_high_pct: default_drop_from_high_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_output_count: default_max_output_count(),
            sort_by: SortKey::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl ScreenerConfig {
    /// One-line summary of the thresholds for logs and report headers.
    pub fn summary(&self) -> String {
        format!(
            "price<={}, value>={:.1}% cap/{}d, rise>={:.0}%, drop<={:.0}%, floor>=-{:.0}% over {}d",
            self.max_price,
            self.liquidity_ratio * 100.0,
            self.liquidity_days,
            self.rise_from_low_pct * 100.0,
            self.drop_from_high_pct * 100.0,
            self.max_drawdown_pct * 100.0,
            self.lookback_days
        )
    }

    /// Trading days of history the later stages need.
    pub fn history_days(&self) -> usize {
        self.liquidity_days.max(self.lookback_days)
    }
}

fn default_market() -> String {
    "KOSPI".into()
}

fn default_max_price() -> f64 {
    10_000.0
}

fn default_liquidity_ratio() -> f64 {
    0.02
}

fn default_liquidity_days() -> usize {
    20
}

fn default_lookback_days() -> usize {
    60
}

fn default_rise_from_low_pct() -> f64 {
    0.30
}

fn default_drop_from_high_pct() -> f64 {
    0.20
}

fn default_max_drawdown_pct() -> f64 {
    0.15
}

fn default_max_output_count() -> usize {
    20
}

fn default_concurrency() -> usize {
    1
}

// ============================================================================
// Output
// ============================================================================

/// Output configuration for screener results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Report format printed to stdout (table, markdown, json)
    #[serde(default = "default_output_format")]
    pub format: String,

    /// Directory to save reports into, if any
    #[serde(default)]
    pub report_dir: Option<String>,

    /// List tickers that could not be evaluated
    #[serde(default)]
    pub show_skipped: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            report_dir: None,
            show_skipped: false,
        }
    }
}

fn default_output_format() -> String {
    "table".into()
}

// ============================================================================
// Tests
// ============================================================================
