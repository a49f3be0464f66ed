//! Master inference phase
//!
//! Synthesizes every completed node's evidence into a final causal verdict,
//! writes the Inference node, and completes the record with the aggregate
//! confidence score.

use super::PhaseContext;
use crate::error::Result;
use crate::model::{InferenceData, Node, NodeData, NodeStatus, NodeType};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Map;
use tracing::warn;
use uuid::Uuid;

const PARSE_FALLBACK_CONFIDENCE: f64 = 0.8;
const PROVIDER_FALLBACK_CONFIDENCE: f64 = 0.7;
const SUMMARY_TRUNCATE: usize = 200;

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    executive_summary: Option<String>,
    primary_cause: Option<String>,
    detailed_reasoning: Option<String>,
    cause_confidence: Option<f64>,
}

/// Build the verdict and complete the investigation. `parent_id` is the
/// validation node when one exists, otherwise the decision node.
pub async fn run(ctx: &PhaseContext, parent_id: Uuid) -> Result<()> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;
    let change = ctx.price_change().await;

    let direction = if change >= 0.0 { "up" } else { "down" };
    let magnitude = change.abs();

    let evidence: Vec<String> = {
        let record = ctx.record.read().await;
        record
            .nodes
            .iter()
            .filter(|node| node.status == NodeStatus::Completed)
            .map(|node| format!("{}: {}", node.label, node.description))
            .collect()
    };

    let prompt = format!(
        "You are a financial analyst delivering a final verdict on why {symbol} stock moved \
         {magnitude:.2}% {direction}.\n\n\
         EVIDENCE COLLECTED:\n{}\n\n\
         Respond with a JSON object containing exactly these keys:\n\
         {{\n\
           \"executive_summary\": \"one sentence verdict\",\n\
           \"primary_cause\": \"short cause label\",\n\
           \"detailed_reasoning\": \"paragraph connecting the evidence\",\n\
           \"cause_confidence\": 0.0\n\
         }}\n\
         cause_confidence is your confidence in the primary cause, between 0 and 1.",
        evidence.join("\n")
    );

    let inference = match ctx.providers.reasoning.analyze(&prompt).await {
        Ok(raw) => parse_inference(&raw),
        Err(err) if err.is_degradable() => {
            warn!(%symbol, error = %err, "master inference unavailable, using fallback verdict");
            InferenceData {
                executive_summary: format!("{symbol}: {direction} {magnitude:.1}%"),
                primary_cause: "Analysis Required".to_string(),
                detailed_reasoning: format!("Price moved {magnitude:.1}% {direction}."),
                cause_confidence: PROVIDER_FALLBACK_CONFIDENCE,
                extra: Map::new(),
            }
        }
        Err(err) => return Err(err),
    };

    let confidence = inference.cause_confidence.clamp(0.0, 1.0);
    let description = format!(
        "{}: {magnitude:.1}% {direction}",
        inference.primary_cause
    );

    let node = Node::completed(
        NodeType::Inference,
        format!("Master Inference: {symbol}"),
        description,
        NodeData::Inference(InferenceData {
            cause_confidence: confidence,
            ..inference
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    // The record transitions to Completed only after the verdict node is
    // visible, so a completed status always implies a full tree
    let mut record = ctx.record.write().await;
    record.append_node(node)?;
    record.complete(confidence);

    Ok(())
}

/// Parse a reasoning response into the verdict payload, tolerating prose
/// around the JSON. An unparseable response is kept verbatim as reasoning.
fn parse_inference(raw: &str) -> InferenceData {
    if let Some(parsed) = extract_json(raw) {
        return InferenceData {
            executive_summary: parsed
                .executive_summary
                .unwrap_or_else(|| "Analysis complete".to_string()),
            primary_cause: parsed
                .primary_cause
                .unwrap_or_else(|| "Market Dynamics".to_string()),
            detailed_reasoning: parsed.detailed_reasoning.unwrap_or_default(),
            cause_confidence: parsed.cause_confidence.unwrap_or(PARSE_FALLBACK_CONFIDENCE),
            extra: Map::new(),
        };
    }

    let summary: String = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("Analysis complete")
        .chars()
        .take(SUMMARY_TRUNCATE)
        .collect();

    InferenceData {
        executive_summary: summary,
        primary_cause: "Reasoning Analysis".to_string(),
        detailed_reasoning: raw.to_string(),
        cause_confidence: PARSE_FALLBACK_CONFIDENCE,
        extra: Map::new(),
    }
}

/// Pull an `InferenceResponse` out of a response that may wrap the JSON in
/// markdown fences or surrounding commentary
fn extract_json(raw: &str) -> Option<InferenceResponse> {
    if let Ok(parsed) = serde_json::from_str(raw) {
        return Some(parsed);
    }

    if let Some(fenced) = raw
        .split("```json")
        .nth(1)
        .and_then(|rest| rest.split("```").next())
    {
        if let Ok(parsed) = serde_json::from_str(fenced.trim()) {
            return Some(parsed);
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if start < end {
        serde_json::from_str(&raw[start..=end]).ok()
    } else {
        None
    }
}
