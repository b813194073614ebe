//! Screening pipeline.
//!
//! Reduces a market's ticker universe to the tickers that are cheap enough,
//! liquid enough relative to their size, and rallying off their recent low.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ MarketData     │──▶│ Universe   │──▶│ Liquidity   │──▶│ Price action │
//! │ Source         │   │ close<=max │   │ value>=r*cap│   │ 3 conditions │
//! └────────────────┘   └────────────┘   └─────────────┘   └──────┬───────┘
//!                                                                │
//!                                             ┌──────────────────▼───────┐
//!                                             │ rank + report (top N)    │
//!                                             └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use rally_screener::screener::{ScreenerEngine, ScreenerReport, ReportFormat};
//!
//! let engine = ScreenerEngine::new(config.screener.clone(), Arc::new(source));
//! let run = engine.run(as_of).await?;
//!
//! let report = ScreenerReport::new(run, config.screener.sort_by, config.screener.max_output_count);
//! println!("{}", report.generate(ReportFormat::Table));
//! ```

pub mod engine;
pub mod filters;
pub mod report;

pub use engine::{summarize_stages, ScreenResult, ScreenerEngine, ScreenerRun, TickerOutcome};
pub use filters::{
    FilterReason, FilterStage, LiquidityMetric, PriceWindow, ScreenFilters, StageSummary,
    REL_TOLERANCE,
};
pub use report::{rank, ReportFormat, ScreenerReport};
