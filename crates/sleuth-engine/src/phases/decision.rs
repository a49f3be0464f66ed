//! Decision phase: open-ended hypothesis generation
//!
//! Describes the observed price/volume pattern to the reasoning provider and
//! parses an open-ended hypothesis list from the response. No fixed taxonomy
//! is imposed; a single generic hypothesis is substituted on failure.

use super::PhaseContext;
use super::data_fetch::DataFetchOutcome;
use crate::error::Result;
use crate::model::{DecisionData, Node, NodeData, NodeType};
use chrono::Utc;
use serde_json::Map;
use tracing::{info, warn};
use uuid::Uuid;

const FALLBACK_HYPOTHESIS: &str = "Market analysis needed";

/// What the decision phase hands to fanout
pub struct DecisionOutcome {
    pub node_id: Uuid,
    pub hypotheses: Vec<String>,
}

pub async fn run(ctx: &PhaseContext, fetch: &DataFetchOutcome) -> Result<DecisionOutcome> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;

    let (change_percent, current_price) = {
        let record = ctx.record.read().await;
        (
            record.price_change_percent.unwrap_or(0.0),
            record.price_end.unwrap_or(100.0),
        )
    };

    let prompt = format!(
        "You are analyzing {symbol} stock movement. Here's what happened:\n\n\
         PRICE MOVEMENT: {change_percent:.2}%\n\
         CURRENT PRICE: ${current_price:.2}\n\
         VOLUME: {}\n\n\
         Based ONLY on this price and volume data, list the hypotheses worth \
         investigating to explain the move. Don't categorize or use preset \
         frameworks. Respond with one hypothesis per line, each starting with \"- \".",
        fetch.volume
    );

    let hypotheses = match ctx.providers.reasoning.analyze(&prompt).await {
        Ok(response) => {
            let parsed = parse_hypotheses(&response);
            if parsed.is_empty() {
                vec![FALLBACK_HYPOTHESIS.to_string()]
            } else {
                parsed
            }
        }
        Err(err) if err.is_degradable() => {
            warn!(%symbol, error = %err, "reasoning unavailable, substituting generic hypothesis");
            vec![FALLBACK_HYPOTHESIS.to_string()]
        }
        Err(err) => return Err(err),
    };

    info!(%symbol, count = hypotheses.len(), "generated investigation hypotheses");

    let node = Node::completed(
        NodeType::Decision,
        "Investigation Decision",
        format!("Generated {} investigation hypotheses", hypotheses.len()),
        NodeData::Decision(DecisionData {
            investigation_hypotheses: hypotheses.clone(),
            extra: Map::new(),
        }),
    )
    .with_parent(fetch.node_id)
    .with_started_at(started_at);

    let node_id = ctx.append_node(node).await?;

    Ok(DecisionOutcome {
        node_id,
        hypotheses,
    })
}

/// Parse bulleted or numbered lines into hypotheses; a response with no list
/// structure becomes a single free-text hypothesis.
fn parse_hypotheses(response: &str) -> Vec<String> {
    let items: Vec<String> = response
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let stripped = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| strip_numbered(line))?;
            let stripped = stripped.trim();
            (!stripped.is_empty()).then(|| stripped.to_string())
        })
        .collect();

    if !items.is_empty() {
        return items;
    }

    let trimmed = response.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

fn strip_numbered(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None;
    }
    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))
}
