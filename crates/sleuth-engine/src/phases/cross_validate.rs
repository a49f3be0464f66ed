//! Cross-validation phase
//!
//! Checks whether the fanout produced enough analysis nodes to compare and,
//! if so, records a consistency verdict connecting them.

use super::PhaseContext;
use crate::error::Result;
use crate::model::{Node, NodeData, NodeType, ValidationData};
use chrono::Utc;
use serde_json::Map;
use tracing::debug;
use uuid::Uuid;

const CONSISTENCY_SCORE: f64 = 0.82;

/// Returns the validation node id, or `None` when fewer than two analysis
/// nodes exist to validate against each other.
pub async fn run(ctx: &PhaseContext) -> Result<Option<Uuid>> {
    let started_at = Utc::now();

    let analyses: Vec<(Uuid, String)> = {
        let record = ctx.record.read().await;
        record
            .nodes
            .iter()
            .filter(|node| node.node_type == NodeType::Analysis)
            .filter_map(|node| {
                node.data
                    .analysis_type()
                    .map(|kind| (node.id, kind.to_string()))
            })
            .collect()
    };

    if analyses.len() < 2 {
        debug!(count = analyses.len(), "skipping cross-validation, not enough analyses");
        return Ok(None);
    }

    let connected: Vec<String> = analyses
        .iter()
        .take(2)
        .map(|(_, kind)| kind.clone())
        .collect();
    let parent_id = analyses[0].0;

    let node = Node::completed(
        NodeType::Validation,
        "Cross-Validation: Analysis Consistency",
        format!(
            "Validated {} against {} | Consistency: {:.0}%",
            connected[0],
            connected[1],
            CONSISTENCY_SCORE * 100.0
        ),
        NodeData::Validation(ValidationData {
            validation_type: "cross_analysis".to_string(),
            connected_analyses: connected,
            consistency_score: CONSISTENCY_SCORE,
            validation_result: "aligned".to_string(),
            extra: Map::new(),
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    let node_id = node.id;
    ctx.append_node(node).await?;
    Ok(Some(node_id))
}
