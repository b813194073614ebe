//! Logging setup, run ids and source-call metrics.
//!
//! Logs go to stderr so a report printed to stdout can be piped cleanly.
//! HTTP client internals (hyper, reqwest, h2, rustls) are held at `warn`;
//! otherwise a run at `debug` is dominated by connection chatter rather than
//! per-ticker decisions. `RUST_LOG`, when set, replaces the whole filter.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Crates whose events are capped at `warn`.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "tokio_util"];

/// `EnvFilter` directives: the base level, then a `warn` cap per noisy or excluded target.
fn build_directives(log_level: &str, excluded_targets: &[String]) -> String {
    let capped = NOISY_MODULES
        .iter()
        .copied()
        .chain(excluded_targets.iter().map(String::as_str))
        .map(|target| format!("{}=warn", target));
    std::iter::once(log_level.to_string())
        .chain(capped)
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber described by `config`.
///
/// `log_format` "json" emits one JSON object per event with file and line;
/// anything else is the human-readable format. Calling this twice is harmless;
/// the second subscriber is simply not installed.
pub fn init_logging(config: &ObservabilityConfig) {
    let directives = build_directives(&config.log_level, &config.exclude_targets);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!(
            level = %config.log_level,
            format = %config.log_format,
            capped_targets = NOISY_MODULES.len() + config.exclude_targets.len(),
            "Logging ready"
        );
    }
}

/// Fresh id for a screening run.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// First eight characters of a run id, for log lines and file names.
pub fn short_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

// ============================================================================
// Fetch Metrics
// ============================================================================

/// Counters for calls made against a market data source. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct FetchMetrics {
    counters: Arc<RwLock<Counters>>,
}

#[derive(Debug, Default)]
struct Counters {
    calls: u64,
    failures: u64,
    retries: u64,
    elapsed_ms: u64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished attempt and its latency.
    pub async fn record_request(&self, duration_ms: u64, success: bool) {
        let mut c = self.counters.write().await;
        c.calls += 1;
        c.elapsed_ms += duration_ms;
        c.failures += u64::from(!success);
    }

    /// Count one retry decision.
    pub async fn record_retry(&self) {
        self.counters.write().await.retries += 1;
    }

    /// Snapshot of the counters.
    pub async fn summary(&self) -> FetchMetricsSummary {
        let c = self.counters.read().await;
        FetchMetricsSummary {
            request_count: c.calls,
            error_count: c.failures,
            retry_count: c.retries,
            avg_duration_ms: c.elapsed_ms.checked_div(c.calls).unwrap_or(0),
        }
    }
}

/// Point-in-time view of [`FetchMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FetchMetricsSummary {
    /// Attempts made, retries included
    pub request_count: u64,
    /// Attempts that failed or timed out
    pub error_count: u64,
    pub retry_count: u64,
    pub avg_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_internals_are_capped() {
        for module in ["hyper", "reqwest", "rustls"] {
            assert!(NOISY_MODULES.contains(&module));
        }
    }

    #[test]
    fn test_build_directives() {
        let directives = build_directives("debug", &["wiremock".to_string()]);
        assert!(directives.starts_with("debug,hyper=warn,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.ends_with(",wiremock=warn"));
        assert_eq!(build_directives("info", &[]).split(',').count(), NOISY_MODULES.len() + 1);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = ObservabilityConfig::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_run_ids() {
        let first = generate_run_id();
        let second = generate_run_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 36);
        assert_eq!(short_id(&first).len(), 8);
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_metrics_summary() {
        let metrics = FetchMetrics::new();
        assert_eq!(metrics.summary().await.avg_duration_ms, 0);

        metrics.record_request(120, true).await;
        metrics.record_request(80, false).await;
        metrics.record_retry().await;

        let summary = metrics.summary().await;
        assert_eq!(
            summary,
            FetchMetricsSummary {
                request_count: 2,
                error_count: 1,
                retry_count: 1,
                avg_duration_ms: 100,
            }
        );
    }

    #[test]
    fn test_metrics_shared_between_clones() {
        let metrics = FetchMetrics::new();
        let clone = metrics.clone();
        tokio_test::block_on(clone.record_request(10, true));
        assert_eq!(tokio_test::block_on(metrics.summary()).request_count, 1);
    }
}
