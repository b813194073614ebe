//! Command-line interface.
//!
//! Settings are layered: config files, then `RALLY_*` environment variables,
//! then command-line flags.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use rally_common::config::expand_path;
use rally_common::{Config, Error, SortKey, SourceKind};

#[derive(Parser, Debug)]
#[command(name = "rally-screener")]
#[command(version)]
#[command(about = "Rule-based momentum stock screener", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Screen a market as of a date
    Run(RunArgs),

    /// Print the effective configuration as JSON and validate it
    Config {
        /// Config file to load instead of ~/.rally
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Flags of the `run` command. Every flag overrides configuration.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Evaluation date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Config file to load instead of ~/.rally
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Market snapshot JSON to screen
    #[arg(long, conflicts_with = "base_url")]
    pub snapshot: Option<String>,

    /// Market-data gateway base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Market to list (e.g. KOSPI, KOSDAQ, ALL)
    #[arg(long)]
    pub market: Option<String>,

    /// Universe price ceiling
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Number of ranked results shown
    #[arg(long)]
    pub top: Option<usize>,

    /// Ranking metric (rise_from_low, drop_from_high, trading_value, market_cap)
    #[arg(long)]
    pub sort_by: Option<SortKey>,

    /// Output format (table, markdown, json)
    #[arg(long)]
    pub format: Option<String>,

    /// Directory to save the report into
    #[arg(long)]
    pub output: Option<String>,

    /// Tickers evaluated at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// List tickers that could not be evaluated
    #[arg(long)]
    pub show_skipped: bool,
}

impl RunArgs {
    /// Overlay the flags onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.snapshot {
            config.source.kind = SourceKind::Snapshot;
            config.source.snapshot_path = Some(path.clone());
        }
        if let Some(url) = &self.base_url {
            config.source.kind = SourceKind::Http;
            config.source.base_url = Some(url.clone());
        }
        if let Some(market) = &self.market {
            config.screener.market = market.clone();
        }
        if let Some(max_price) = self.max_price {
            config.screener.max_price = max_price;
        }
        if let Some(top) = self.top {
            config.screener.max_output_count = top;
        }
        if let Some(sort_by) = self.sort_by {
            config.screener.sort_by = sort_by;
        }
        if let Some(format) = &self.format {
            config.output.format = format.clone();
        }
        if let Some(dir) = &self.output {
            config.output.report_dir = Some(dir.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.screener.concurrency = concurrency;
        }
        if self.show_skipped {
            config.output.show_skipped = true;
        }
    }

    /// Evaluation date, today (local) when not given.
    pub fn as_of(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

/// Load configuration from `path` or the default directory, then apply env overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if path.is_some() {
        config.apply_env_overrides();
    }
    Ok(config)
}

/// Resolved snapshot path of a snapshot-kind source.
pub fn snapshot_path(config: &Config) -> Result<PathBuf> {
    match (&config.source.kind, &config.source.snapshot_path) {
        (SourceKind::Snapshot, Some(raw)) => Ok(expand_path(raw)),
        (SourceKind::Snapshot, None) => Err(Error::Config(
            "no snapshot configured; pass --snapshot or set source.snapshot_path".into(),
        )
        .into()),
        (kind, _) => Err(Error::Config(format!("source kind {:?} has no snapshot", kind)).into()),
    }
}

/// Report directory, `~`-expanded.
pub fn report_dir(config: &Config) -> Option<PathBuf> {
    config.output.report_dir.as_deref().map(expand_path)
}

// ============================================================================
// Tests
// ============================================================================
