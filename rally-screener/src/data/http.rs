//! REST market-data gateway adapter.
//!
//! # Endpoints
//! - `GET /tickers?market=&date=` -> `{"tickers": ["005930", ...]}`
//! - `GET /tickers/{ticker}/daily?from=&to=` -> `{"bars": [PricePoint, ...]}`
//! - `GET /tickers/{ticker}/market-cap?date=` -> `{"market_cap": 4.2e14}`
//! - `GET /tickers/{ticker}` -> `{"ticker": "005930", "name": "..."}`
//!
//! # Status mapping
//! - 404: `DataUnavailable`
//! - 429: `RateLimited` (honours `Retry-After` in seconds)
//! - 5xx: `Unavailable`
//! - connect failures and client timeouts: `Network` / `Timeout`

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use rally_common::SourceConfig;

use super::provider::{MarketDataSource, ProviderError};
use super::{normalize_series, PricePoint, Ticker};

// ============================================================================
// Constants
// ============================================================================

/// Ticker listing endpoint, first path segment of every request
const TICKERS_ENDPOINT: &str = "tickers";

/// Default HTTP client timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body carried into an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

// ============================================================================
// HTTP Adapter
// ============================================================================

/// Market data source backed by a REST gateway.
pub struct HttpMarketSource {
    /// Base URL without trailing slash
    base_url: String,
    /// Optional bearer token
    api_key: Option<String>,
    /// HTTP client
    client: reqwest::Client,
    /// Client timeout, reported in `Timeout` errors
    timeout_secs: u64,
}

impl HttpMarketSource {
    /// Create a source for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, None, DEFAULT_TIMEOUT_SECS)
    }

    /// Create with an optional API key and client timeout.
    pub fn with_timeout(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            timeout_secs,
        }
    }

    /// Create from config. Returns `None` when no base URL is configured.
    pub fn from_config(config: &SourceConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref()?;
        Some(Self::with_timeout(
            base_url,
            config.api_key.clone(),
            config.fetch_timeout_secs,
        ))
    }

    /// Configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Malformed(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::Malformed(format!("Base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the endpoint at `segments` with `query` and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, "Fetching from market gateway");

        let mut request = self
            .client
            .get(url.clone())
            .query(query)
            .header("accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    secs: self.timeout_secs,
                }
            } else if e.is_connect() {
                ProviderError::Network(format!("Connection failed: {}", e))
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after, url.as_str(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse {}: {}", url, e)))
    }
}

/// Translate a non-success HTTP status into a provider error.
fn map_status(status: StatusCode, retry_after: Option<u64>, url: &str, body: &str) -> ProviderError {
    let body = rally_common::util::truncate_with_ellipsis(body.trim(), MAX_ERROR_BODY_CHARS);
    match status {
        StatusCode::NOT_FOUND => ProviderError::DataUnavailable(format!("{} not found", url)),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after,
        },
        s if s.is_server_error() => ProviderError::Unavailable(format!("HTTP {}: {}", s, body)),
        s => ProviderError::Malformed(format!("HTTP {}: {}", s, body)),
    }
}

// ============================================================================
// MarketDataSource Implementation
// ============================================================================

#[async_trait]
impl MarketDataSource for HttpMarketSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_tickers(
        &self,
        as_of: NaiveDate,
        market: &str,
    ) -> Result<Vec<Ticker>, ProviderError> {
        let response: TickerListResponse = self
            .get_json(
                &[TICKERS_ENDPOINT],
                &[("market", market.to_string()), ("date", as_of.to_string())],
            )
            .await?;
        Ok(response.tickers)
    }

    async fn get_daily_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let response: DailyResponse = self
            .get_json(&[TICKERS_ENDPOINT, ticker, "daily"], &[("from", from.to_string()), ("to", to.to_string())])
            .await?;
        Ok(normalize_series(response.bars))
    }

    async fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Result<f64, ProviderError> {
        let response: MarketCapResponse = self
            .get_json(&[TICKERS_ENDPOINT, ticker, "market-cap"], &[("date", as_of.to_string())])
            .await?;
        response.market_cap.ok_or_else(|| {
            ProviderError::DataUnavailable(format!("no market cap for {} as of {}", ticker, as_of))
        })
    }

    async fn get_ticker_name(&self, ticker: &str) -> Result<String, ProviderError> {
        let response: TickerInfoResponse = self.get_json(&[TICKERS_ENDPOINT, ticker], &[]).await?;
        Ok(response
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ticker.to_string()))
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TickerListResponse {
    tickers: Vec<Ticker>,
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(default)]
    bars: Vec<PricePoint>,
}

#[derive(Debug, Deserialize)]
struct MarketCapResponse {
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerInfoResponse {
    #[serde(default)]
    name: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
