//! Market data source abstraction.
//!
//! Defines the `MarketDataSource` trait every backend implements and the
//! `ProviderError` taxonomy the screener uses to tell "no data" apart from
//! "the provider failed".

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{PricePoint, Ticker};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors surfaced by market data sources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// No data for the requested ticker/date range
    #[error("Data not available: {0}")]
    DataUnavailable(String),

    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Call did not finish within the configured timeout
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Provider is temporarily unavailable (5xx, maintenance)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with something we could not parse
    #[error("Malformed response: {0}")]
    Malformed(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

/// The two failure kinds a per-ticker evaluation can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The source has no data for the ticker/date
    DataUnavailable,
    /// Network or provider failure; the same request may succeed later
    Transient,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable => write!(f, "data unavailable"),
            Self::Transient => write!(f, "transient failure"),
        }
    }
}

impl ProviderError {
    /// Collapse into the per-ticker failure kind.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::DataUnavailable(_) => FetchErrorKind::DataUnavailable,
            _ => FetchErrorKind::Transient,
        }
    }

    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Timeout { .. } | Self::Unavailable(_)
        )
    }

    /// Suggested wait before retrying, when the provider gave one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

// ============================================================================
// Market Data Source Trait
// ============================================================================

/// Trait for market data sources.
///
/// Implementations must be safe to call concurrently; the screener may
/// evaluate several tickers at once.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Source name for logs (e.g. "snapshot", "http")
    fn name(&self) -> &str;

    /// List the tickers of `market` tradable as of `as_of`.
    async fn list_tickers(
        &self,
        as_of: NaiveDate,
        market: &str,
    ) -> Result<Vec<Ticker>, ProviderError>;

    /// Fetch daily points for `ticker` between `from` and `to` inclusive, date-ascending.
    ///
    /// A known ticker with no sessions in range yields an empty series; a
    /// ticker the source knows nothing about fails with `DataUnavailable`.
    async fn get_daily_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, ProviderError>;

    /// Market capitalization of `ticker` as of `as_of`, in currency units.
    async fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Result<f64, ProviderError>;

    /// Display name of `ticker`.
    async fn get_ticker_name(&self, ticker: &str) -> Result<String, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_kind() {
        assert_eq!(
            ProviderError::DataUnavailable("no bars".into()).kind(),
            FetchErrorKind::DataUnavailable
        );
        assert_eq!(ProviderError::Network("reset".into()).kind(), FetchErrorKind::Transient);
        assert_eq!(ProviderError::Timeout { secs: 5 }.kind(), FetchErrorKind::Transient);
        assert_eq!(ProviderError::Malformed("bad json".into()).kind(), FetchErrorKind::Transient);
    }

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::RateLimited { retry_after_secs: Some(60) }.is_recoverable());
        assert!(ProviderError::Unavailable("maintenance".into()).is_recoverable());
        assert!(ProviderError::Timeout { secs: 30 }.is_recoverable());
        assert!(!ProviderError::DataUnavailable("no data".into()).is_recoverable());
        assert!(!ProviderError::Malformed("garbage".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(err.to_string().contains("30 seconds"));
        assert_eq!(err.retry_after_secs(), Some(30));
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: None }.to_string(),
            "Rate limited"
        );

        let err = ProviderError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.retry_after_secs(), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FetchErrorKind::DataUnavailable.to_string(), "data unavailable");
        assert_eq!(FetchErrorKind::Transient.to_string(), "transient failure");
    }
}
