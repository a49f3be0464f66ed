//! Provider capability traits
//!
//! The engine consumes three external capabilities: free-text reasoning, web
//! search, and market data. Concrete backends live in [`crate::adapters`];
//! the orchestrator only sees these traits.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current quote for an instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current_price: f64,
    pub volume: u64,
    pub change_percent: f64,
}

/// One historical close
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryBar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Free-text reasoning backend
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Send a prompt and return the model's text response
    async fn analyze(&self, prompt: &str) -> Result<String>;

    /// Provider name (e.g., "claude")
    fn name(&self) -> &str;
}

/// Web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a query and return raw result text
    async fn search(&self, query: &str) -> Result<String>;
}

/// Market data backend
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Current quote for a symbol
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Trailing window of historical closes, oldest first
    async fn history(&self, symbol: &str, lookback: usize) -> Result<Vec<HistoryBar>>;
}

/// Bundle of provider handles injected into the orchestrator
#[derive(Clone)]
pub struct Providers {
    pub reasoning: Arc<dyn ReasoningProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub market_data: Arc<dyn MarketDataProvider>,
}

impl Providers {
    pub fn new(
        reasoning: Arc<dyn ReasoningProvider>,
        search: Arc<dyn SearchProvider>,
        market_data: Arc<dyn MarketDataProvider>,
    ) -> Self {
        Self {
            reasoning,
            search,
            market_data,
        }
    }
}
