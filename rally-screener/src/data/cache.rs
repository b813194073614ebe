//! In-memory TTL cache for daily series and market caps.
//!
//! Closed trading days never change, so repeated runs over the same date
//! range (or the history fetch shared by two stages) can be served without
//! another provider round trip.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::PricePoint;

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl_secs: i64) -> Self {
        Self {
            data,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

type SeriesKey = (String, NaiveDate, NaiveDate);
type CapKey = (String, NaiveDate);

/// Market data cache
pub struct DataCache {
    series: RwLock<HashMap<SeriesKey, CacheEntry<Vec<PricePoint>>>>,
    market_caps: RwLock<HashMap<CapKey, CacheEntry<f64>>>,
    ttl_secs: i64,
}

impl DataCache {
    /// Create with the given TTL in seconds
    pub fn with_ttl(ttl_secs: i64) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            market_caps: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    /// Cached series for an exact `(ticker, from, to)` request.
    pub fn get_series(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Option<Vec<PricePoint>> {
        let cache = self.series.read().ok()?;
        cache
            .get(&(ticker.to_string(), from, to))
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    /// Cache a series.
    pub fn set_series(&self, ticker: &str, from: NaiveDate, to: NaiveDate, series: Vec<PricePoint>) {
        let entry = CacheEntry::new(series, self.ttl_secs);
        if let Ok(mut cache) = self.series.write() {
            cache.insert((ticker.to_string(), from, to), entry);
        }
    }

    /// Cached market cap.
    pub fn get_market_cap(&self, ticker: &str, as_of: NaiveDate) -> Option<f64> {
        let cache = self.market_caps.read().ok()?;
        cache
            .get(&(ticker.to_string(), as_of))
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data)
    }

    /// Cache a market cap.
    pub fn set_market_cap(&self, ticker: &str, as_of: NaiveDate, market_cap: f64) {
        let entry = CacheEntry::new(market_cap, self.ttl_secs);
        if let Ok(mut cache) = self.market_caps.write() {
            cache.insert((ticker.to_string(), as_of), entry);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (series_total, series_expired) = self
            .series
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));
        let (caps_total, caps_expired) = self
            .market_caps
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));

        let total = series_total + caps_total;
        let expired = series_expired + caps_expired;
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Tests
// ============================================================================
