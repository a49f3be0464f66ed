//! Yahoo Finance market data adapter

use crate::error::{EngineError, Result};
use crate::providers::{HistoryBar, MarketDataProvider, Quote};
use async_trait::async_trait;
use cached::{Cached, TimedCache};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use yahoo_finance_api as yahoo;

const QUOTE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Market data backed by the Yahoo Finance chart API, with a short-lived
/// quote cache to absorb repeated lookups for the same symbol
pub struct YahooMarketData {
    quote_cache: RwLock<TimedCache<String, Quote>>,
}

impl YahooMarketData {
    pub fn new() -> Self {
        Self {
            quote_cache: RwLock::new(TimedCache::with_lifespan(QUOTE_CACHE_TTL)),
        }
    }

    fn connector() -> Result<yahoo::YahooConnector> {
        yahoo::YahooConnector::new().map_err(|e| EngineError::Provider(e.to_string()))
    }
}

impl Default for YahooMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        if let Some(cached) = self.quote_cache.write().await.cache_get(symbol).cloned() {
            tracing::debug!(%symbol, "quote cache hit");
            return Ok(cached);
        }

        let provider = Self::connector()?;
        let response = provider
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| EngineError::Provider(e.to_string()))?;
        let latest = response.last_quote().map_err(|e| {
            EngineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            }
        })?;

        let quote = Quote {
            symbol: symbol.to_string(),
            current_price: latest.close,
            volume: latest.volume,
            change_percent: if latest.open.abs() > f64::EPSILON {
                (latest.close - latest.open) / latest.open * 100.0
            } else {
                0.0
            },
        };

        self.quote_cache
            .write()
            .await
            .cache_set(symbol.to_string(), quote.clone());
        Ok(quote)
    }

    async fn history(&self, symbol: &str, lookback: usize) -> Result<Vec<HistoryBar>> {
        let end = Utc::now();
        let start = end - ChronoDuration::days(lookback as i64);

        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| EngineError::Provider(format!("invalid start timestamp: {e}")))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| EngineError::Provider(format!("invalid end timestamp: {e}")))?;

        let provider = Self::connector()?;
        let response = provider
            .get_quote_history(symbol, start_odt, end_odt)
            .await
            .map_err(|e| EngineError::Provider(e.to_string()))?;
        let quotes = response.quotes().map_err(|e| EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;

        Ok(quotes
            .iter()
            .map(|q| HistoryBar {
                timestamp: DateTime::from_timestamp(q.timestamp as i64, 0)
                    .unwrap_or_else(Utc::now),
                close: q.close,
            })
            .collect())
    }
}
