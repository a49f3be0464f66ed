//! Investigation engine for stock price movements
//!
//! This crate builds a causal investigation tree for a symbol's price move:
//! fetch market data, generate hypotheses, fan out concurrent analysis
//! branches, cross-validate them, and synthesize a final verdict. Provider
//! failures degrade to clearly-labeled fallback content instead of failing
//! the investigation.

pub mod adapters;
pub mod config;
pub mod error;
pub mod indicators;
pub mod model;
pub mod orchestrator;
pub mod phases;
pub mod providers;
pub mod store;
pub mod stream;

pub use config::{EngineConfig, RetentionPolicy};
pub use error::{EngineError, Result};
pub use model::{InvestigationRecord, InvestigationSnapshot, InvestigationStatus, Node};
pub use orchestrator::Orchestrator;
pub use providers::Providers;
pub use store::{InMemoryStore, InvestigationStore};
pub use stream::{ProgressEvent, ProgressStream};
