//! Concrete provider backends
//!
//! Each adapter implements one capability trait from [`crate::providers`]
//! against a real external service.

pub mod anthropic;
pub mod duckduckgo;
pub mod yahoo;

pub use anthropic::ClaudeReasoning;
pub use duckduckgo::DuckDuckGoSearch;
pub use yahoo::YahooMarketData;
