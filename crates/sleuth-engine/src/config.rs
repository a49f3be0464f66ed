//! Configuration for the investigation engine

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retention policy for finished investigations in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionPolicy {
    /// Keep every investigation for the lifetime of the process
    Unbounded,
    /// Evict the oldest finished investigations beyond this capacity.
    /// Active investigations are never evicted.
    Capacity(usize),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Capacity(256)
    }
}

/// Configuration for investigation runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing window of historical closes fetched during DataFetch
    pub history_lookback: usize,

    /// How many periods back the reference close sits (clamped to history)
    pub reference_offset: usize,

    /// Interval between progress stream polls
    pub poll_interval: Duration,

    /// Maximum number of progress stream polls before forced termination
    pub max_polls: u32,

    /// Total cap on key findings aggregated by the comprehensive branch
    pub findings_cap: usize,

    /// How many comprehensive findings are copied onto the record
    pub comprehensive_findings_kept: usize,

    /// Pause between sequential workflow phases, giving pollers a chance to
    /// observe intermediate states. Zero disables pacing.
    pub phase_delay: Duration,

    /// Retention policy for finished investigations
    pub retention: RetentionPolicy,

    /// Request timeout for provider adapters
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_lookback: 90,
            reference_offset: 30,
            poll_interval: Duration::from_millis(100),
            max_polls: 50,
            findings_cap: 8,
            comprehensive_findings_kept: 5,
            phase_delay: Duration::from_millis(300),
            retention: RetentionPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.history_lookback == 0 {
            return Err(EngineError::Config(
                "history_lookback must be greater than 0".to_string(),
            ));
        }

        if self.reference_offset > self.history_lookback {
            return Err(EngineError::Config(
                "reference_offset cannot exceed history_lookback".to_string(),
            ));
        }

        if self.max_polls == 0 {
            return Err(EngineError::Config(
                "max_polls must be greater than 0".to_string(),
            ));
        }

        if let RetentionPolicy::Capacity(0) = self.retention {
            return Err(EngineError::Config(
                "retention capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    history_lookback: Option<usize>,
    reference_offset: Option<usize>,
    poll_interval: Option<Duration>,
    max_polls: Option<u32>,
    findings_cap: Option<usize>,
    comprehensive_findings_kept: Option<usize>,
    phase_delay: Option<Duration>,
    retention: Option<RetentionPolicy>,
    request_timeout: Option<Duration>,
}

impl EngineConfigBuilder {
    /// Set the historical close lookback window
    pub fn history_lookback(mut self, periods: usize) -> Self {
        self.history_lookback = Some(periods);
        self
    }

    /// Set the reference close offset
    pub fn reference_offset(mut self, periods: usize) -> Self {
        self.reference_offset = Some(periods);
        self
    }

    /// Set the progress stream poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the progress stream poll cap
    pub fn max_polls(mut self, polls: u32) -> Self {
        self.max_polls = Some(polls);
        self
    }

    /// Set the comprehensive branch findings cap
    pub fn findings_cap(mut self, cap: usize) -> Self {
        self.findings_cap = Some(cap);
        self
    }

    /// Set how many comprehensive findings land on the record
    pub fn comprehensive_findings_kept(mut self, kept: usize) -> Self {
        self.comprehensive_findings_kept = Some(kept);
        self
    }

    /// Set the pause between workflow phases
    pub fn phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = Some(delay);
        self
    }

    /// Set the retention policy
    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = Some(policy);
        self
    }

    /// Set the provider request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            history_lookback: self.history_lookback.unwrap_or(defaults.history_lookback),
            reference_offset: self.reference_offset.unwrap_or(defaults.reference_offset),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            max_polls: self.max_polls.unwrap_or(defaults.max_polls),
            findings_cap: self.findings_cap.unwrap_or(defaults.findings_cap),
            comprehensive_findings_kept: self
                .comprehensive_findings_kept
                .unwrap_or(defaults.comprehensive_findings_kept),
            phase_delay: self.phase_delay.unwrap_or(defaults.phase_delay),
            retention: self.retention.unwrap_or(defaults.retention),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
        };

        config.validate()?;
        Ok(config)
    }
}
