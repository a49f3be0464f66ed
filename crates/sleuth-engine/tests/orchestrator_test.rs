//! End-to-end orchestrator tests with stubbed providers

use async_trait::async_trait;
use sleuth_engine::model::{NodeStatus, NodeType};
use sleuth_engine::providers::{
    HistoryBar, MarketDataProvider, Providers, Quote, ReasoningProvider, SearchProvider,
};
use sleuth_engine::{
    EngineConfig, EngineError, InMemoryStore, InvestigationSnapshot, InvestigationStatus,
    Orchestrator, ProgressEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct StubReasoning {
    response: String,
}

#[async_trait]
impl ReasoningProvider for StubReasoning {
    async fn analyze(&self, _prompt: &str) -> sleuth_engine::Result<String> {
        Ok(self.response.clone())
    }
    fn name(&self) -> &str {
        "stub"
    }
}

struct FailingReasoning;

#[async_trait]
impl ReasoningProvider for FailingReasoning {
    async fn analyze(&self, _prompt: &str) -> sleuth_engine::Result<String> {
        Err(EngineError::Provider("reasoning backend down".to_string()))
    }
    fn name(&self) -> &str {
        "failing"
    }
}

struct StubSearch {
    text: String,
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, _query: &str) -> sleuth_engine::Result<String> {
        Ok(self.text.clone())
    }
}

struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    async fn search(&self, _query: &str) -> sleuth_engine::Result<String> {
        Err(EngineError::RateLimited {
            provider: "search".to_string(),
        })
    }
}

struct StubMarket;

#[async_trait]
impl MarketDataProvider for StubMarket {
    async fn quote(&self, symbol: &str) -> sleuth_engine::Result<Quote> {
        Ok(Quote {
            symbol: symbol.to_string(),
            current_price: 150.0,
            volume: 1_000_000,
            change_percent: 2.5,
        })
    }

    async fn history(&self, _symbol: &str, lookback: usize) -> sleuth_engine::Result<Vec<HistoryBar>> {
        // Steadily rising closes ending below the current quote
        Ok((0..lookback)
            .map(|i| HistoryBar {
                timestamp: chrono::Utc::now() - chrono::Duration::days((lookback - i) as i64),
                close: 100.0 + i as f64 * 0.5,
            })
            .collect())
    }
}

struct FailingMarket;

#[async_trait]
impl MarketDataProvider for FailingMarket {
    async fn quote(&self, symbol: &str) -> sleuth_engine::Result<Quote> {
        Err(EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "no data".to_string(),
        })
    }

    async fn history(&self, symbol: &str, _lookback: usize) -> sleuth_engine::Result<Vec<HistoryBar>> {
        Err(EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "no data".to_string(),
        })
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig::builder()
        .phase_delay(Duration::from_millis(1))
        .poll_interval(Duration::from_millis(1))
        .max_polls(500)
        .build()
        .unwrap()
}

fn orchestrator(providers: Providers) -> Orchestrator {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(sleuth_utils::init_tracing);

    Orchestrator::new(Arc::new(InMemoryStore::default()), providers, fast_config()).unwrap()
}

fn healthy_providers() -> Providers {
    Providers::new(
        Arc::new(StubReasoning {
            response: "- earnings beat expectations\n- sector momentum".to_string(),
        }),
        Arc::new(StubSearch {
            text: "Analysts upgrade the price target amid strong growth; \
                   earnings beat and raised guidance lifted the sector rally"
                .to_string(),
        }),
        Arc::new(StubMarket),
    )
}

fn failing_providers() -> Providers {
    Providers::new(
        Arc::new(FailingReasoning),
        Arc::new(FailingSearch),
        Arc::new(FailingMarket),
    )
}

async fn wait_done(orchestrator: &Orchestrator, id: Uuid) -> InvestigationSnapshot {
    for _ in 0..1000 {
        let snapshot = orchestrator.status(id).await.unwrap();
        if snapshot.status != InvestigationStatus::Active {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("investigation never left active state");
}

fn count_type(snapshot: &InvestigationSnapshot, node_type: NodeType) -> usize {
    snapshot
        .nodes
        .iter()
        .filter(|n| n.node_type == node_type)
        .count()
}

#[tokio::test]
async fn test_full_run_builds_complete_tree() {
    let orchestrator = orchestrator(healthy_providers());
    let id = orchestrator.start("aapl").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    assert_eq!(snapshot.status, InvestigationStatus::Completed);
    assert_eq!(snapshot.symbol, "AAPL");
    assert!(snapshot.confidence_score > 0.0 && snapshot.confidence_score <= 1.0);

    assert_eq!(count_type(&snapshot, NodeType::DataFetch), 1);
    assert_eq!(count_type(&snapshot, NodeType::Decision), 1);
    // Earnings hypothesis present, so all five branches ran
    assert_eq!(count_type(&snapshot, NodeType::Analysis), 5);
    assert_eq!(count_type(&snapshot, NodeType::Validation), 1);
    assert_eq!(count_type(&snapshot, NodeType::Inference), 1);

    let branches: HashSet<&str> = snapshot.branches.iter().map(String::as_str).collect();
    for branch in [
        "sentiment_analysis",
        "earnings_investigation",
        "market_context",
        "technical_analysis",
        "comprehensive",
    ] {
        assert!(branches.contains(branch), "missing branch {branch}");
    }

    assert!(!snapshot.findings.is_empty());
    assert!(
        snapshot
            .findings
            .iter()
            .all(|f| f.starts_with("Comprehensive: "))
    );
}

#[tokio::test]
async fn test_node_ids_unique_and_parents_backward() {
    let orchestrator = orchestrator(healthy_providers());
    let id = orchestrator.start("MSFT").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    let mut seen = HashSet::new();
    for node in &snapshot.nodes {
        assert!(seen.insert(node.id), "duplicate node id {}", node.id);
        if let Some(parent_id) = node.parent_id {
            assert!(
                seen.contains(&parent_id),
                "node {} references parent {} that was not appended earlier",
                node.id,
                parent_id
            );
        }
        assert_eq!(node.status, NodeStatus::Completed);
        assert!(node.created_at <= node.completed_at);
    }

    // Root is the single unparented node
    let roots = snapshot
        .nodes
        .iter()
        .filter(|n| n.parent_id.is_none())
        .count();
    assert_eq!(roots, 1);
}

#[tokio::test]
async fn test_market_failure_degrades_to_demo_data() {
    let providers = Providers::new(
        Arc::new(StubReasoning {
            response: "- profit taking after rally".to_string(),
        }),
        Arc::new(StubSearch {
            text: "growth and momentum in the sector".to_string(),
        }),
        Arc::new(FailingMarket),
    );

    let orchestrator = orchestrator(providers);
    let id = orchestrator.start("AAPL").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    assert_eq!(snapshot.status, InvestigationStatus::Completed);

    let fetch = snapshot
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::DataFetch)
        .expect("fetch node present");
    let data = serde_json::to_value(&fetch.data).unwrap();
    assert_eq!(data["demo"], true);
    assert_eq!(data["price_start"], 95.0);
    assert_eq!(data["price_end"], 100.0);
    assert!(data.get("source_error").is_some());

    // Workflow continued past the degraded fetch
    assert_eq!(count_type(&snapshot, NodeType::Decision), 1);
    assert_eq!(count_type(&snapshot, NodeType::Inference), 1);
}

#[tokio::test]
async fn test_every_provider_failing_still_completes() {
    let orchestrator = orchestrator(failing_providers());
    let id = orchestrator.start("TSLA").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    assert_eq!(snapshot.status, InvestigationStatus::Completed);
    assert!(snapshot.confidence_score > 0.0);

    // Fallback hypothesis mentions no earnings, so four branches ran
    assert_eq!(count_type(&snapshot, NodeType::Analysis), 4);
    assert!(!snapshot.branches.contains(&"earnings_investigation".to_string()));

    for node in snapshot
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Analysis)
    {
        let data = serde_json::to_value(&node.data).unwrap();
        assert_eq!(
            data["fallback"], true,
            "analysis node {} should be flagged as fallback",
            node.label
        );
        assert_eq!(node.status, NodeStatus::Completed);
    }
}

#[tokio::test]
async fn test_earnings_branch_only_on_earnings_hypothesis() {
    let providers = Providers::new(
        Arc::new(StubReasoning {
            response: "- supply chain disruption\n- regulatory pressure".to_string(),
        }),
        Arc::new(StubSearch {
            text: "sector decline and volatility".to_string(),
        }),
        Arc::new(StubMarket),
    );

    let orchestrator = orchestrator(providers);
    let id = orchestrator.start("NVDA").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    assert_eq!(count_type(&snapshot, NodeType::Analysis), 4);
    assert!(!snapshot.branches.contains(&"earnings_investigation".to_string()));
    assert!(snapshot.branches.contains(&"sentiment_analysis".to_string()));
}

#[tokio::test]
async fn test_validation_connects_two_analyses() {
    let orchestrator = orchestrator(healthy_providers());
    let id = orchestrator.start("AAPL").await.unwrap();
    let snapshot = wait_done(&orchestrator, id).await;

    let validation = snapshot
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Validation)
        .expect("validation node present");
    let data = serde_json::to_value(&validation.data).unwrap();

    assert_eq!(data["validation_type"], "cross_analysis");
    assert_eq!(data["validation_result"], "aligned");
    assert_eq!(data["connected_analyses"].as_array().unwrap().len(), 2);

    // Inference hangs off the validation node
    let inference = snapshot
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Inference)
        .expect("inference node present");
    assert_eq!(inference.parent_id, Some(validation.id));
}

#[tokio::test]
async fn test_stream_yields_each_node_once_then_terminal() {
    let orchestrator = orchestrator(healthy_providers());
    let id = orchestrator.start("AAPL").await.unwrap();

    let mut stream = orchestrator.stream_progress(id).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event);
    }

    let snapshot = orchestrator.status(id).await.unwrap();
    assert_eq!(snapshot.status, InvestigationStatus::Completed);

    let mut streamed_ids = Vec::new();
    for event in &events[..events.len() - 1] {
        match event {
            ProgressEvent::NodeAdded(node) => streamed_ids.push(node.id),
            other => panic!("unexpected event before terminal: {other:?}"),
        }
    }

    let record_ids: Vec<Uuid> = snapshot.nodes.iter().map(|n| n.id).collect();
    assert_eq!(streamed_ids, record_ids);

    match events.last() {
        Some(ProgressEvent::InvestigationComplete {
            status,
            total_nodes,
            ..
        }) => {
            assert_eq!(*status, InvestigationStatus::Completed);
            assert_eq!(*total_nodes, record_ids.len());
        }
        other => panic!("expected terminal event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let orchestrator = orchestrator(healthy_providers());
    let id = Uuid::new_v4();

    assert!(matches!(
        orchestrator.status(id).await,
        Err(EngineError::NotFound(missing)) if missing == id
    ));
    assert!(matches!(
        orchestrator.stream_progress(id).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_empty_symbol_rejected() {
    let orchestrator = orchestrator(healthy_providers());
    assert!(matches!(
        orchestrator.start("   ").await,
        Err(EngineError::Config(_))
    ));
}

#[tokio::test]
async fn test_concurrent_investigations_stay_isolated() {
    let orchestrator = orchestrator(healthy_providers());

    let first = orchestrator.start("AAPL").await.unwrap();
    let second = orchestrator.start("MSFT").await.unwrap();
    assert_ne!(first, second);

    let first_snapshot = wait_done(&orchestrator, first).await;
    let second_snapshot = wait_done(&orchestrator, second).await;

    assert_eq!(first_snapshot.symbol, "AAPL");
    assert_eq!(second_snapshot.symbol, "MSFT");

    let first_ids: HashSet<Uuid> = first_snapshot.nodes.iter().map(|n| n.id).collect();
    assert!(second_snapshot.nodes.iter().all(|n| !first_ids.contains(&n.id)));
}
