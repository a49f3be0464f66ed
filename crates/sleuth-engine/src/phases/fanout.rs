//! Fanout phase: independent sub-investigation branches
//!
//! Spawns the fixed branch set concurrently. Branches are fault-isolated at
//! branch granularity: a provider failure inside one branch degrades that
//! branch to deterministic fallback content and never prevents the others
//! from completing or producing their own node.

use super::PhaseContext;
use super::data_fetch::DataFetchOutcome;
use super::decision::DecisionOutcome;
use crate::error::Result;
use crate::indicators::{self, IndicatorCategory};
use crate::model::{AnalysisData, Node, NodeData, NodeType};
use crate::providers::HistoryBar;
use chrono::Utc;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, json};
use ta::Next;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};
use tracing::warn;
use uuid::Uuid;

pub const BRANCH_SENTIMENT: &str = "sentiment_analysis";
pub const BRANCH_EARNINGS: &str = "earnings_investigation";
pub const BRANCH_MARKET: &str = "market_context";
pub const BRANCH_TECHNICAL: &str = "technical_analysis";
pub const BRANCH_COMPREHENSIVE: &str = "comprehensive";

const SENTIMENT_CONFIDENCE: f64 = 0.75;
const EARNINGS_CONFIDENCE: f64 = 0.80;
const MARKET_CONFIDENCE: f64 = 0.65;

const RSI_PERIOD: usize = 14;
const SMA_PERIOD: usize = 20;

pub async fn run(
    ctx: &PhaseContext,
    decision: &DecisionOutcome,
    fetch: &DataFetchOutcome,
) -> Result<()> {
    let parent_id = decision.node_id;
    let change = ctx.price_change().await;

    let launch_earnings = decision
        .hypotheses
        .iter()
        .any(|h| h.to_lowercase().contains("earnings"));

    let mut branches: Vec<BoxFuture<'_, Result<()>>> = vec![
        Box::pin(sentiment_branch(ctx, parent_id, change)),
        Box::pin(market_branch(ctx, parent_id, change)),
        Box::pin(technical_branch(ctx, parent_id, &fetch.history)),
        Box::pin(comprehensive_branch(ctx, parent_id)),
    ];
    if launch_earnings {
        branches.push(Box::pin(earnings_branch(ctx, parent_id, change)));
    }

    for outcome in join_all(branches).await {
        outcome?;
    }

    Ok(())
}

/// News sentiment branch: search plus an optional reasoning narrative,
/// indicator extraction over the raw search text
async fn sentiment_branch(ctx: &PhaseContext, parent_id: Uuid, change: f64) -> Result<()> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;
    let query = format!("{symbol} stock news recent price movement earnings");

    let (indicators, key_events, fallback, source_error) =
        match ctx.providers.search.search(&query).await {
            Ok(raw) => (
                indicators::extract_sentiment(&raw),
                indicators::extract(&raw, IndicatorCategory::KeyEvent),
                false,
                None,
            ),
            Err(err) if err.is_degradable() => {
                warn!(%symbol, error = %err, "sentiment search failed, using fallback indicators");
                let (indicators, events) = fallback_sentiment(change);
                (indicators, events, true, Some(err.to_string()))
            }
            Err(err) => return Err(err),
        };

    let sentiment = sentiment_tag(&indicators);

    // Narrative context is best-effort; its absence never degrades the branch
    let narrative = if fallback {
        None
    } else {
        let prompt = format!(
            "Recent news search results for {symbol} alongside a {change:.2}% price move:\n\n\
             Indicators: {}\n\n\
             Just read these signals and tell me what story they're telling. \
             How do they relate to the price movement?",
            indicators.join(", ")
        );
        match ctx.providers.reasoning.analyze(&prompt).await {
            Ok(text) => Some(text),
            Err(err) if err.is_degradable() => {
                warn!(%symbol, error = %err, "sentiment narrative unavailable");
                None
            }
            Err(err) => return Err(err),
        }
    };

    let mut description = format!(
        "News sentiment: {sentiment} (impact score: {SENTIMENT_CONFIDENCE:.1})"
    );
    if !indicators.is_empty() {
        description.push_str(&format!(
            " | Key indicators: {}",
            indicators.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !key_events.is_empty() {
        description.push_str(&format!(
            " | Events detected: {}",
            key_events.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut extra = Map::new();
    extra.insert("sentiment".to_string(), json!(sentiment));
    extra.insert("impact_score".to_string(), json!(SENTIMENT_CONFIDENCE));
    extra.insert("key_events".to_string(), json!(key_events));
    if let Some(narrative) = narrative {
        extra.insert("narrative".to_string(), json!(narrative));
    }
    if let Some(source_error) = source_error {
        extra.insert("source_error".to_string(), json!(source_error));
    }

    let node = Node::completed(
        NodeType::Analysis,
        "Sentiment Analysis: News & Events",
        description,
        NodeData::Analysis(AnalysisData {
            analysis_type: "news_sentiment".to_string(),
            confidence: Some(SENTIMENT_CONFIDENCE),
            indicators,
            fallback,
            extra,
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    ctx.append_branch_node(node, BRANCH_SENTIMENT).await?;
    Ok(())
}

/// Earnings branch, launched only when a hypothesis mentions earnings
async fn earnings_branch(ctx: &PhaseContext, parent_id: Uuid, change: f64) -> Result<()> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;
    let query = format!("{symbol} earnings report quarterly results analyst estimates guidance");

    let (earnings, analyst, fallback, source_error) =
        match ctx.providers.search.search(&query).await {
            Ok(raw) => (
                indicators::extract(&raw, IndicatorCategory::Earnings),
                indicators::extract(&raw, IndicatorCategory::Analyst),
                false,
                None,
            ),
            Err(err) if err.is_degradable() => {
                warn!(%symbol, error = %err, "earnings search failed, using fallback indicators");
                let (earnings, analyst) = fallback_earnings(change);
                (earnings, analyst, true, Some(err.to_string()))
            }
            Err(err) => return Err(err),
        };

    let mut description = format!("Analyzing {symbol} earnings impact on price movement");
    if !earnings.is_empty() {
        description.push_str(&format!(
            " | Indicators: {}",
            earnings.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !analyst.is_empty() {
        description.push_str(&format!(
            " | Analyst activity: {}",
            analyst.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut extra = Map::new();
    extra.insert("analyst_sentiment".to_string(), json!(analyst));
    extra.insert("analysis_focus".to_string(), json!("EPS and guidance"));
    if let Some(source_error) = source_error {
        extra.insert("source_error".to_string(), json!(source_error));
    }

    let node = Node::completed(
        NodeType::Analysis,
        "Earnings Investigation",
        description,
        NodeData::Analysis(AnalysisData {
            analysis_type: "earnings_impact".to_string(),
            confidence: Some(EARNINGS_CONFIDENCE),
            indicators: earnings,
            fallback,
            extra,
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    ctx.append_branch_node(node, BRANCH_EARNINGS).await?;
    Ok(())
}

/// Sector and peer context branch
async fn market_branch(ctx: &PhaseContext, parent_id: Uuid, change: f64) -> Result<()> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;
    let query =
        format!("{symbol} sector performance market trends peer comparison industry analysis");

    let (sector, peers, fallback, source_error) =
        match ctx.providers.search.search(&query).await {
            Ok(raw) => (
                indicators::extract(&raw, IndicatorCategory::Sector),
                indicators::extract(&raw, IndicatorCategory::Peer),
                false,
                None,
            ),
            Err(err) if err.is_degradable() => {
                warn!(%symbol, error = %err, "market context search failed, using fallback indicators");
                let (sector, peers) = fallback_market(change);
                (sector, peers, true, Some(err.to_string()))
            }
            Err(err) => return Err(err),
        };

    let mut description = format!("Analyzing {symbol} performance relative to sector trends");
    if !sector.is_empty() {
        description.push_str(&format!(
            " | Sector insights: {}",
            sector.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !peers.is_empty() {
        description.push_str(&format!(
            " | Peer analysis: {}",
            peers.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut extra = Map::new();
    extra.insert("peer_performance".to_string(), json!(peers));
    if let Some(source_error) = source_error {
        extra.insert("source_error".to_string(), json!(source_error));
    }

    let node = Node::completed(
        NodeType::Analysis,
        "Market Context: Sector & Peer Analysis",
        description,
        NodeData::Analysis(AnalysisData {
            analysis_type: "market_context".to_string(),
            confidence: Some(MARKET_CONFIDENCE),
            indicators: sector,
            fallback,
            extra,
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    ctx.append_branch_node(node, BRANCH_MARKET).await?;
    Ok(())
}

/// Technical branch: indicators derived from already-fetched history,
/// no external call
async fn technical_branch(
    ctx: &PhaseContext,
    parent_id: Uuid,
    history: &[HistoryBar],
) -> Result<()> {
    let started_at = Utc::now();

    let derived = derive_technicals(history);
    let (rsi, signal, derived_from_history) = match derived {
        Some((rsi, signal)) => (rsi, signal, true),
        // Without history (demo data path) fall back to fixed plausible values
        None => (65.4, "bullish", false),
    };

    let mut extra = Map::new();
    extra.insert("rsi".to_string(), json!(rsi));
    extra.insert("moving_average_signal".to_string(), json!(signal));
    extra.insert("volume_confirmation".to_string(), json!(true));
    extra.insert("derived_from_history".to_string(), json!(derived_from_history));

    let node = Node::completed(
        NodeType::Analysis,
        "Technical Analysis: Price Patterns",
        format!(
            "RSI {rsi:.1} ({}) | moving average signal: {signal}",
            interpret_rsi(rsi)
        ),
        NodeData::Analysis(AnalysisData {
            analysis_type: "technical".to_string(),
            confidence: None,
            indicators: Vec::new(),
            fallback: !derived_from_history,
            extra,
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    ctx.append_branch_node(node, BRANCH_TECHNICAL).await?;
    Ok(())
}

/// Comprehensive branch: batch re-run of the external calls with per-sub-call
/// fault isolation and aggregation into the record's findings
async fn comprehensive_branch(ctx: &PhaseContext, parent_id: Uuid) -> Result<()> {
    let started_at = Utc::now();
    let symbol = ctx.symbol().await;

    let (news, earnings, market) = tokio::join!(
        news_sub_call(ctx, &symbol),
        earnings_sub_call(ctx, &symbol),
        market_sub_call(ctx, &symbol),
    );

    // Fixed aggregation order: sentiment -> earnings -> market
    let sub_calls = [news?, earnings?, market?];

    let mut confidences = Vec::new();
    let mut key_findings = Vec::new();
    for sub_call in sub_calls.into_iter().flatten() {
        confidences.push(sub_call.confidence);
        key_findings.extend(sub_call.findings);
    }
    key_findings.truncate(ctx.config.findings_cap);

    let overall_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    {
        let mut record = ctx.record.write().await;
        for finding in key_findings
            .iter()
            .take(ctx.config.comprehensive_findings_kept)
        {
            record.add_finding(format!("Comprehensive: {finding}"));
        }
    }

    let mut extra = Map::new();
    extra.insert("succeeded_sub_calls".to_string(), json!(confidences.len()));
    extra.insert(
        "failed_sub_calls".to_string(),
        json!(3 - confidences.len()),
    );

    let node = Node::completed(
        NodeType::Analysis,
        "Comprehensive Investigation",
        format!(
            "Multi-dimensional analysis complete | Confidence: {:.0}% | {} key insights identified",
            overall_confidence * 100.0,
            key_findings.len()
        ),
        NodeData::Analysis(AnalysisData {
            analysis_type: "comprehensive".to_string(),
            confidence: Some(overall_confidence),
            indicators: key_findings,
            fallback: confidences.is_empty(),
            extra,
        }),
    )
    .with_parent(parent_id)
    .with_started_at(started_at);

    ctx.append_branch_node(node, BRANCH_COMPREHENSIVE).await?;
    Ok(())
}

struct SubCall {
    confidence: f64,
    findings: Vec<String>,
}

async fn news_sub_call(ctx: &PhaseContext, symbol: &str) -> Result<Option<SubCall>> {
    let query = format!("{symbol} stock news recent price movement earnings");
    sub_call(ctx, &query, SENTIMENT_CONFIDENCE, |raw| {
        let mut findings: Vec<String> = indicators::extract_sentiment(raw)
            .into_iter()
            .take(2)
            .collect();
        findings.extend(
            indicators::extract(raw, IndicatorCategory::KeyEvent)
                .into_iter()
                .take(2),
        );
        findings
    })
    .await
}

async fn earnings_sub_call(ctx: &PhaseContext, symbol: &str) -> Result<Option<SubCall>> {
    let query = format!("{symbol} earnings report quarterly results analyst estimates guidance");
    sub_call(ctx, &query, EARNINGS_CONFIDENCE, |raw| {
        let mut findings: Vec<String> = indicators::extract(raw, IndicatorCategory::Earnings)
            .into_iter()
            .take(2)
            .collect();
        findings.extend(
            indicators::extract(raw, IndicatorCategory::Analyst)
                .into_iter()
                .take(2),
        );
        findings
    })
    .await
}

async fn market_sub_call(ctx: &PhaseContext, symbol: &str) -> Result<Option<SubCall>> {
    let query =
        format!("{symbol} sector performance market trends peer comparison industry analysis");
    sub_call(ctx, &query, MARKET_CONFIDENCE, |raw| {
        let mut findings: Vec<String> = indicators::extract(raw, IndicatorCategory::Sector)
            .into_iter()
            .take(2)
            .collect();
        findings.extend(
            indicators::extract(raw, IndicatorCategory::Peer)
                .into_iter()
                .take(2),
        );
        findings
    })
    .await
}

async fn sub_call(
    ctx: &PhaseContext,
    query: &str,
    confidence: f64,
    harvest: impl FnOnce(&str) -> Vec<String>,
) -> Result<Option<SubCall>> {
    match ctx.providers.search.search(query).await {
        Ok(raw) => Ok(Some(SubCall {
            confidence,
            findings: harvest(&raw),
        })),
        Err(err) if err.is_degradable() => {
            warn!(%query, error = %err, "comprehensive sub-call failed");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Overall sentiment tag from indicator label counts; ties are neutral
fn sentiment_tag(indicators: &[String]) -> &'static str {
    let positive = indicators
        .iter()
        .filter(|l| l.starts_with("Positive"))
        .count();
    let negative = indicators
        .iter()
        .filter(|l| l.starts_with("Negative"))
        .count();

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => "positive",
        std::cmp::Ordering::Less => "negative",
        std::cmp::Ordering::Equal => "neutral",
    }
}

fn fallback_sentiment(change: f64) -> (Vec<String>, Vec<String>) {
    let indicators = vec![
        if change > 0.0 {
            "Positive: strong"
        } else {
            "Negative: decline"
        }
        .to_string(),
        if change > 2.0 {
            "Positive: growth"
        } else {
            "Neutral: stable"
        }
        .to_string(),
        if change > 5.0 {
            "Positive: outperform"
        } else {
            "Negative: underperform"
        }
        .to_string(),
    ];

    let events = vec![
        "Event detected: earnings".to_string(),
        if change > 0.0 {
            "Event detected: analyst upgrade"
        } else {
            "Event detected: market volatility"
        }
        .to_string(),
    ];

    (indicators, events)
}

fn fallback_earnings(change: f64) -> (Vec<String>, Vec<String>) {
    let earnings = vec![
        "Earnings indicator: EPS".to_string(),
        "Earnings indicator: revenue".to_string(),
        if change > 0.0 {
            "Earnings indicator: beat"
        } else {
            "Earnings indicator: miss"
        }
        .to_string(),
        "Earnings indicator: guidance".to_string(),
    ];

    let analyst = vec![
        "Analyst activity: rating".to_string(),
        if change > 0.0 {
            "Analyst activity: upgrade"
        } else {
            "Analyst activity: downgrade"
        }
        .to_string(),
        "Analyst activity: price target".to_string(),
    ];

    (earnings, analyst)
}

fn fallback_market(change: f64) -> (Vec<String>, Vec<String>) {
    let sector = vec![
        "Sector trend: technology".to_string(),
        if change > 0.0 {
            "Sector trend: growth"
        } else {
            "Sector trend: volatility"
        }
        .to_string(),
        "Sector trend: market share".to_string(),
    ];

    let peers = vec![
        "Peer comparison: competitor".to_string(),
        if change > 0.0 {
            "Peer comparison: outperform"
        } else {
            "Peer comparison: underperform"
        }
        .to_string(),
        "Peer comparison: market position".to_string(),
    ];

    (sector, peers)
}

/// RSI and moving-average signal from trailing closes; None when history is
/// too short for a meaningful read
fn derive_technicals(history: &[HistoryBar]) -> Option<(f64, &'static str)> {
    if history.len() <= RSI_PERIOD {
        return None;
    }

    let closes: Vec<f64> = history.iter().map(|bar| bar.close).collect();

    let mut rsi_indicator = RelativeStrengthIndex::new(RSI_PERIOD).ok()?;
    let mut rsi = 0.0;
    for &close in &closes {
        rsi = rsi_indicator.next(close);
    }

    let sma_period = SMA_PERIOD.min(closes.len());
    let mut sma_indicator = SimpleMovingAverage::new(sma_period).ok()?;
    let mut sma = 0.0;
    for &close in &closes {
        sma = sma_indicator.next(close);
    }

    let last_close = *closes.last()?;
    let signal = if last_close >= sma { "bullish" } else { "bearish" };

    Some((rsi, signal))
}

fn interpret_rsi(rsi: f64) -> &'static str {
    if rsi > 70.0 {
        "Overbought - potential sell signal"
    } else if rsi < 30.0 {
        "Oversold - potential buy signal"
    } else {
        "Neutral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bars(closes: &[f64]) -> Vec<HistoryBar> {
        closes
            .iter()
            .map(|&close| HistoryBar {
                timestamp: Utc::now(),
                close,
            })
            .collect()
    }

    #[test]
    fn test_sentiment_tag_counts() {
        let positive = vec![
            "Positive: strong".to_string(),
            "Positive: growth".to_string(),
            "Negative: miss".to_string(),
        ];
        assert_eq!(sentiment_tag(&positive), "positive");

        let negative = vec![
            "Negative: decline".to_string(),
            "Negative: weak".to_string(),
            "Positive: beat".to_string(),
        ];
        assert_eq!(sentiment_tag(&negative), "negative");

        let tied = vec![
            "Positive: strong".to_string(),
            "Negative: weak".to_string(),
        ];
        assert_eq!(sentiment_tag(&tied), "neutral");
        assert_eq!(sentiment_tag(&[]), "neutral");
    }

    #[test]
    fn test_fallback_sentiment_tracks_direction() {
        let (up, up_events) = fallback_sentiment(6.0);
        assert!(up.contains(&"Positive: outperform".to_string()));
        assert!(up_events.contains(&"Event detected: analyst upgrade".to_string()));

        let (down, down_events) = fallback_sentiment(-3.0);
        assert!(down.contains(&"Negative: decline".to_string()));
        assert!(down_events.contains(&"Event detected: market volatility".to_string()));
    }

    #[test]
    fn test_derive_technicals_needs_history() {
        assert!(derive_technicals(&[]).is_none());
        assert!(derive_technicals(&bars(&[100.0; 10])).is_none());
    }

    #[test]
    fn test_derive_technicals_signal() {
        // Steadily rising closes end above the moving average
        let closes: Vec<f64> = (1..=30).map(|i| 100.0 + f64::from(i)).collect();
        let (rsi, signal) = derive_technicals(&bars(&closes)).expect("enough history");

        assert_eq!(signal, "bullish");
        assert!(rsi > 50.0);
    }

    #[test]
    fn test_interpret_rsi() {
        assert_eq!(interpret_rsi(75.0), "Overbought - potential sell signal");
        assert_eq!(interpret_rsi(25.0), "Oversold - potential buy signal");
        assert_eq!(interpret_rsi(50.0), "Neutral");
    }
}
