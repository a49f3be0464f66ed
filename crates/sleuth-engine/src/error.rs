//! Error types for investigation operations

use thiserror::Error;
use uuid::Uuid;

/// Investigation engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reasoning or search backend failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Rate limit exceeded for a provider
    #[error("Rate limit exceeded for {provider}")]
    RateLimited {
        provider: String,
    },

    /// Market data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable {
        symbol: String,
        reason: String,
    },

    /// Unknown investigation id
    #[error("Investigation not found: {0}")]
    NotFound(Uuid),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected failure escaping a phase's own handling
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error is an expected provider-side failure that phase
    /// runners absorb into fallback content rather than propagate.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_)
                | Self::RateLimited { .. }
                | Self::DataUnavailable { .. }
                | Self::Network(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
