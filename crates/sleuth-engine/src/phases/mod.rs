//! Investigation phase runners
//!
//! One function per workflow phase. Phases run strictly sequentially inside
//! a single background task per investigation; only the fanout phase is
//! internally parallel. Every phase absorbs expected provider failures into
//! clearly-labeled fallback content and appends finished nodes only.

pub mod cross_validate;
pub mod data_fetch;
pub mod decision;
pub mod fanout;
pub mod inference;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::Node;
use crate::providers::Providers;
use crate::store::SharedRecord;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a phase runner needs: the record under investigation, the
/// provider bundle, and the engine configuration.
#[derive(Clone)]
pub struct PhaseContext {
    pub record: SharedRecord,
    pub providers: Providers,
    pub config: Arc<EngineConfig>,
}

impl PhaseContext {
    pub fn new(record: SharedRecord, providers: Providers, config: Arc<EngineConfig>) -> Self {
        Self {
            record,
            providers,
            config,
        }
    }

    /// Symbol under investigation
    pub async fn symbol(&self) -> String {
        self.record.read().await.symbol.clone()
    }

    /// Price change computed during DataFetch, 0 until then
    pub async fn price_change(&self) -> f64 {
        self.record.read().await.price_change_percent.unwrap_or(0.0)
    }

    /// Append a finished node to the record
    pub async fn append_node(&self, node: Node) -> Result<Uuid> {
        self.record.write().await.append_node(node)
    }

    /// Append a node and tag the branch that produced it
    pub async fn append_branch_node(&self, node: Node, branch: &str) -> Result<Uuid> {
        let mut record = self.record.write().await;
        let id = record.append_node(node)?;
        record.add_branch(branch);
        Ok(id)
    }
}
