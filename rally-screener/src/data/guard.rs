//! Resilience layer around a market data source.
//!
//! [`GuardedSource`] wraps any [`MarketDataSource`] and adds, per call:
//! - an optional shared token-bucket rate limit
//! - a hard timeout (`ProviderError::Timeout` when exceeded)
//! - bounded retries of recoverable errors with linear backoff
//! - an optional TTL cache for daily series and market caps
//! - request/error/retry metrics

use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use rally_common::logging::FetchMetrics;
use rally_common::SourceConfig;

use super::cache::{CacheStats, DataCache};
use super::provider::{MarketDataSource, ProviderError};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::{PricePoint, Ticker};

/// Guard settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt, recoverable errors only
    pub max_retries: u32,
    /// Backoff step; attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
    /// Token-bucket limit; unlimited when `None`
    pub requests_per_minute: Option<u32>,
    /// Cache TTL; no cache when `None`
    pub cache_ttl_secs: Option<i64>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            requests_per_minute: None,
            cache_ttl_secs: None,
        }
    }
}

impl GuardConfig {
    pub fn from_source_config(config: &SourceConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            requests_per_minute: config.requests_per_minute,
            cache_ttl_secs: config.cache_ttl_secs,
        }
    }
}

/// A [`MarketDataSource`] decorator enforcing timeouts, rate limits and retries.
pub struct GuardedSource<S> {
    inner: S,
    config: GuardConfig,
    limiter: Option<SharedRateLimiter>,
    cache: Option<DataCache>,
    metrics: FetchMetrics,
}

impl<S: MarketDataSource> GuardedSource<S> {
    pub fn new(inner: S, config: GuardConfig) -> Self {
        let limiter = config
            .requests_per_minute
            .map(|rpm| Arc::new(RateLimiter::new(inner.name().to_string(), rpm)));
        let cache = config.cache_ttl_secs.map(DataCache::with_ttl);

        Self {
            inner,
            config,
            limiter,
            cache,
            metrics: FetchMetrics::new(),
        }
    }

    /// Share an existing rate limiter instead of the one built from config.
    pub fn with_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Request metrics collected so far.
    pub fn metrics(&self) -> &FetchMetrics {
        &self.metrics
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(DataCache::stats)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run `request_fn` under the limiter and timeout, retrying recoverable failures.
    async fn execute<T, F, Fut>(&self, op: &str, request_fn: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        let mut attempt: u32 = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let started = Instant::now();
            let result = match tokio::time::timeout(self.config.timeout, request_fn()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    secs: self.config.timeout.as_secs(),
                }),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            self.metrics.record_request(elapsed_ms, result.is_ok()).await;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_recoverable() || attempt >= self.config.max_retries {
                return Err(err);
            }

            attempt += 1;
            let wait = err
                .retry_after_secs()
                .map(Duration::from_secs)
                .unwrap_or(self.config.retry_backoff * attempt);
            warn!(
                source = self.inner.name(),
                op,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Recoverable source error, retrying"
            );
            self.metrics.record_retry().await;
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for GuardedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list_tickers(
        &self,
        as_of: NaiveDate,
        market: &str,
    ) -> Result<Vec<Ticker>, ProviderError> {
        self.execute("list_tickers", || self.inner.list_tickers(as_of, market))
            .await
    }

    async fn get_daily_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        if let Some(series) = self.cache.as_ref().and_then(|c| c.get_series(ticker, from, to)) {
            debug!(ticker, %from, %to, "Series cache hit");
            return Ok(series);
        }

        let series = self
            .execute("get_daily_series", || {
                self.inner.get_daily_series(ticker, from, to)
            })
            .await?;

        if let Some(cache) = &self.cache {
            cache.set_series(ticker, from, to, series.clone());
        }
        Ok(series)
    }

    async fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Result<f64, ProviderError> {
        if let Some(cap) = self.cache.as_ref().and_then(|c| c.get_market_cap(ticker, as_of)) {
            return Ok(cap);
        }

        let cap = self
            .execute("get_market_cap", || self.inner.get_market_cap(ticker, as_of))
            .await?;

        if let Some(cache) = &self.cache {
            cache.set_market_cap(ticker, as_of, cap);
        }
        Ok(cap)
    }

    async fn get_ticker_name(&self, ticker: &str) -> Result<String, ProviderError> {
        self.execute("get_ticker_name", || self.inner.get_ticker_name(ticker))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
