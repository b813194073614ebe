//! Rally Screener Library
//!
//! Rule-based momentum screening over daily market data. A run reduces a
//! market's ticker universe through three filters and ranks the survivors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        rally-screener                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐   ┌────────────────┐   ┌─────────────────┐  │
//! │  │  data         │   │  screener      │   │  report         │  │
//! │  │  snapshot/http│──▶│  universe      │──▶│  rank + render  │  │
//! │  │  + guard      │   │  liquidity     │   │  table/md/json  │  │
//! │  └───────────────┘   │  price action  │   └─────────────────┘  │
//! │                      └────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Outcomes
//! Every listed ticker ends as exactly one of `Passed`, `Filtered` (evaluated
//! and rejected at a stage) or `Skipped` (could not be evaluated: data
//! unavailable or a transient provider failure).
//!
//! ## Thresholds
//! Configured as fractions (0.30 = 30%) and compared inclusively; results
//! report percentages in percent units.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod data;
pub mod screener;

use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use rally_common::Config;

use crate::data::{GuardConfig, GuardedSource, MarketDataSource};
use crate::screener::{ScreenerEngine, ScreenerReport};

/// Screen `source` as of `as_of` under `config` and prepare the report.
///
/// The source is wrapped in a [`GuardedSource`] built from `config.source`.
pub async fn screen<S: MarketDataSource>(
    config: &Config,
    source: S,
    as_of: NaiveDate,
) -> Result<ScreenerReport> {
    let guarded = GuardedSource::new(source, GuardConfig::from_source_config(&config.source));
    let engine = ScreenerEngine::new(config.screener.clone(), Arc::new(guarded));

    let run = engine.run(as_of).await?;

    let metrics = engine.source().metrics().summary().await;
    info!(
        requests = metrics.request_count,
        errors = metrics.error_count,
        retries = metrics.retry_count,
        avg_ms = metrics.avg_duration_ms,
        "Source metrics"
    );
    if let Some(stats) = engine.source().cache_stats() {
        debug!(entries = stats.total_entries, active = stats.active_entries, "Source cache");
    }

    Ok(ScreenerReport::new(
        run,
        config.screener.sort_by,
        config.screener.max_output_count,
    )
    .with_skipped(config.output.show_skipped))
}
