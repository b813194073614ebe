//! Ranking and report generation for screening runs.
//!
//! Generates reports in various formats:
//! - Table (plain text for terminals)
//! - Markdown (for documentation)
//! - JSON (the full run, for programmatic use)
//!
//! Monetary magnitudes are shown in hundred-millions (억) in the human
//! formats; JSON keeps raw currency values.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rally_common::logging::short_id;
use rally_common::util::{format_hundred_millions, format_pct, format_price, truncate_with_ellipsis};
use rally_common::SortKey;

use super::engine::{ScreenResult, ScreenerRun};

/// Longest name shown in the text table
const NAME_WIDTH: usize = 12;

// ============================================================================
// Ranking
// ============================================================================

/// Sort `results` by `sort_by` and keep the first `max_output_count`.
///
/// Rise, trading value and market cap rank descending; drop from high ranks
/// ascending (closest to the high first). Ties break by ticker.
pub fn rank(results: &[ScreenResult], sort_by: SortKey, max_output_count: usize) -> Vec<ScreenResult> {
    let mut ranked = results.to_vec();
    ranked.sort_by(|a, b| compare(a, b, sort_by).then_with(|| a.ticker.cmp(&b.ticker)));
    ranked.truncate(max_output_count);
    ranked
}

fn compare(a: &ScreenResult, b: &ScreenResult, sort_by: SortKey) -> Ordering {
    let ord = match sort_by {
        SortKey::RiseFromLow => b.rise_from_low_pct.partial_cmp(&a.rise_from_low_pct),
        SortKey::DropFromHigh => a.drop_from_high_pct.partial_cmp(&b.drop_from_high_pct),
        SortKey::TradingValue => b.avg_trading_value.partial_cmp(&a.avg_trading_value),
        SortKey::MarketCap => b.market_cap.partial_cmp(&a.market_cap),
    };
    ord.unwrap_or(Ordering::Equal)
}

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Plain text table
    #[default]
    Table,
    /// Markdown format (human-readable)
    Markdown,
    /// JSON format (machine-readable)
    Json,
}

impl ReportFormat {
    /// File extension used when saving.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Table => "txt",
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" | "txt" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Screener Report
// ============================================================================

/// Report generator for a screening run.
pub struct ScreenerReport {
    run: ScreenerRun,
    ranked: Vec<ScreenResult>,
    sort_by: SortKey,
    show_skipped: bool,
}

impl ScreenerReport {
    /// Rank the run's results and prepare a report of the top `max_output_count`.
    pub fn new(run: ScreenerRun, sort_by: SortKey, max_output_count: usize) -> Self {
        let ranked = rank(&run.results, sort_by, max_output_count);
        Self {
            run,
            ranked,
            sort_by,
            show_skipped: false,
        }
    }

    /// Also list tickers that could not be evaluated.
    pub fn with_skipped(mut self, show_skipped: bool) -> Self {
        self.show_skipped = show_skipped;
        self
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Table => self.to_table(),
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Save the report into `dir` as `screen_<date>_<run>.<ext>`.
    pub fn save_to_dir(&self, dir: &Path, format: ReportFormat) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

        let file_path = dir.join(format!(
            "screen_{}_{}.{}",
            self.run.as_of.format("%Y%m%d"),
            short_id(&self.run.run_id),
            format.extension()
        ));

        std::fs::write(&file_path, self.generate(format))
            .with_context(|| format!("Failed to write report file {}", file_path.display()))?;

        Ok(file_path)
    }

    /// Generate a plain text table.
    pub fn to_table(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "{} {} | run {} | {}\n",
            self.run.market,
            self.run.as_of,
            short_id(&self.run.run_id),
            self.run.summary()
        ));
        out.push_str(&format!("Filters: {}\n", self.run.config_summary));
        out.push_str(&format!(
            "Top {} of {} by {}\n\n",
            self.ranked.len(),
            self.run.results.len(),
            self.sort_by
        ));

        if self.ranked.is_empty() {
            out.push_str("No tickers passed all filters.\n");
        } else {
            out.push_str(&format!(
                "{:>3}  {:<8} {:<15} {:>10} {:>8} {:>8} {:>12} {:>12}\n",
                "#", "Ticker", "Name", "Price", "Rise", "Drop", "AvgValue", "MarketCap"
            ));
            out.push_str(&format!("{}\n", "-".repeat(84)));
            for (i, r) in self.ranked.iter().enumerate() {
                out.push_str(&format!(
                    "{:>3}  {:<8} {:<15} {:>10} {:>8} {:>8} {:>12} {:>12}\n",
                    i + 1,
                    r.ticker,
                    truncate_with_ellipsis(&r.name, NAME_WIDTH),
                    format_price(r.current_price),
                    format_pct(r.rise_from_low_pct),
                    format_pct(r.drop_from_high_pct),
                    format_hundred_millions(r.avg_trading_value),
                    format_hundred_millions(r.market_cap),
                ));
            }
        }

        if self.show_skipped {
            let skipped: Vec<_> = self.run.skipped().collect();
            if !skipped.is_empty() {
                out.push_str(&format!("\nSkipped ({}):\n", skipped.len()));
                for (ticker, stage, kind, message) in skipped {
                    out.push_str(&format!(
                        "  {:<8} {:<12} {:<17} {}\n",
                        ticker,
                        stage.to_string(),
                        kind.to_string(),
                        message
                    ));
                }
            }
        }

        out
    }

    /// Generate markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        // Header
        md.push_str(&format!(
            "# 종목 스크리닝 리포트\n\n**실행 ID**: {}\n**기준일**: {}\n**시장**: {}\n**소요**: {:.1}초\n\n",
            self.run.run_id, self.run.as_of, self.run.market, self.run.duration_secs
        ));

        // Summary
        md.push_str("## 요약\n\n");
        md.push_str(&format!("- **전체 종목**: {}\n", self.run.total_tickers));
        md.push_str(&format!("- **최종 통과**: {}\n", self.run.results.len()));
        md.push_str(&format!("- **평가 불가**: {}\n", self.run.skipped_count()));
        md.push_str(&format!("- **조건**: {}\n\n", self.run.config_summary));

        // Funnel
        md.push_str("### 필터 단계\n\n");
        md.push_str("| 단계 | 입력 | 통과 | 탈락 | 평가 불가 | 탈락률 |\n");
        md.push_str("|------|------|------|------|-----------|--------|\n");
        for s in &self.run.stages {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {:.1}% |\n",
                s.stage,
                s.input,
                s.passed,
                s.filtered,
                s.skipped,
                s.elimination_rate()
            ));
        }
        md.push('\n');

        // Ranked results
        md.push_str(&format!("## 상위 종목 ({} 기준)\n\n", self.sort_by));
        if self.ranked.is_empty() {
            md.push_str("조건을 모두 만족한 종목이 없습니다.\n\n");
        } else {
            md.push_str("| 순위 | 종목코드 | 종목명 | 현재가 | 저점대비 | 고점대비 | 평균거래대금 | 시가총액 |\n");
            md.push_str("|------|----------|--------|--------|----------|----------|--------------|----------|\n");
            for (i, r) in self.ranked.iter().enumerate() {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                    i + 1,
                    r.ticker,
                    r.name,
                    format_price(r.current_price),
                    format_pct(r.rise_from_low_pct),
                    format_pct(r.drop_from_high_pct),
                    format_hundred_millions(r.avg_trading_value),
                    format_hundred_millions(r.market_cap),
                ));
            }
            md.push('\n');
        }

        if self.show_skipped {
            let skipped: Vec<_> = self.run.skipped().collect();
            if !skipped.is_empty() {
                md.push_str("## 평가 불가 종목\n\n");
                md.push_str("| 종목코드 | 단계 | 유형 | 메시지 |\n");
                md.push_str("|----------|------|------|--------|\n");
                for (ticker, stage, kind, message) in skipped {
                    md.push_str(&format!("| {} | {} | {} | {} |\n", ticker, stage, kind, message));
                }
                md.push('\n');
            }
        }

        // Footer
        md.push_str("---\n\n");
        md.push_str(&format!(
            "*{} UTC 생성*\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));

        md
    }

    /// Generate JSON report: the ranked list plus the full run.
    pub fn to_json(&self) -> String {
        let value = serde_json::json!({
            "sort_by": self.sort_by,
            "ranked": self.ranked,
            "run": self.run,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get the underlying run.
    pub fn run(&self) -> &ScreenerRun {
        &self.run
    }

    /// Ranked, truncated results.
    pub fn ranked(&self) -> &[ScreenResult] {
        &self.ranked
    }
}

// ============================================================================
// Tests
// ============================================================================
