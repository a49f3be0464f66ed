//! Command-line interface for the sleuth investigation engine

use clap::Parser;
use sleuth_engine::adapters::{ClaudeReasoning, DuckDuckGoSearch, YahooMarketData};
use sleuth_engine::{
    EngineConfig, InMemoryStore, Orchestrator, ProgressEvent, Providers,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sleuth")]
#[command(about = "Investigate why a stock price moved", long_about = None)]
struct Args {
    /// Ticker symbol to investigate (e.g., AAPL)
    symbol: String,

    /// Print raw progress events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sleuth_utils::init_tracing();

    let args = Args::parse();
    let config = EngineConfig::default();

    let providers = Providers::new(
        Arc::new(ClaudeReasoning::from_env(config.request_timeout)?),
        Arc::new(DuckDuckGoSearch::new(config.request_timeout)?),
        Arc::new(YahooMarketData::new()),
    );

    let store = Arc::new(InMemoryStore::new(config.retention));
    let orchestrator = Orchestrator::new(store, providers, config)?;

    let id = orchestrator.start(&args.symbol).await?;
    info!(investigation = %id, "investigation started");

    let mut stream = orchestrator.stream_progress(id).await?;
    while let Some(event) = stream.next_event().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }

        match event {
            ProgressEvent::NodeAdded(node) => {
                println!("[{:?}] {} :: {}", node.node_type, node.label, node.description);
            }
            ProgressEvent::InvestigationComplete {
                status,
                confidence_score,
                total_nodes,
            } => {
                println!(
                    "Investigation {status:?} with {total_nodes} nodes, confidence {:.0}%",
                    confidence_score * 100.0
                );
            }
        }
    }

    let snapshot = orchestrator.status(id).await?;
    for finding in &snapshot.findings {
        println!("  finding: {finding}");
    }

    Ok(())
}
