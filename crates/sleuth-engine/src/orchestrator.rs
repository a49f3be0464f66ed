//! Investigation orchestrator
//!
//! Owns the store and provider bundle, starts one background task per
//! investigation, and exposes status queries and progress streams. Phases
//! run strictly in sequence inside the task; a panic or unexpected error in
//! any phase marks the record failed instead of leaving it active forever.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{InvestigationRecord, InvestigationSnapshot};
use crate::phases::{self, PhaseContext};
use crate::providers::Providers;
use crate::store::InvestigationStore;
use crate::stream::ProgressStream;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Entry point for running and querying investigations
pub struct Orchestrator {
    store: Arc<dyn InvestigationStore>,
    providers: Providers,
    config: Arc<EngineConfig>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn InvestigationStore>,
        providers: Providers,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            providers,
            config: Arc::new(config),
        })
    }

    /// Start an investigation for a symbol and return its id immediately.
    /// The workflow runs in a detached background task.
    #[instrument(skip(self))]
    pub async fn start(&self, symbol: &str) -> Result<Uuid> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(EngineError::Config("symbol must not be empty".to_string()));
        }

        let record = InvestigationRecord::new(symbol);
        let id = record.id;
        let handle = self.store.insert(record).await;

        let ctx = PhaseContext::new(handle, self.providers.clone(), Arc::clone(&self.config));
        info!(investigation = %id, symbol = %ctx.symbol().await, "starting investigation");
        tokio::spawn(supervise(ctx, id));

        Ok(id)
    }

    /// Point-in-time snapshot of an investigation
    pub async fn status(&self, id: Uuid) -> Result<InvestigationSnapshot> {
        let handle = self
            .store
            .get(id)
            .await
            .ok_or(EngineError::NotFound(id))?;
        let snapshot = handle.read().await.snapshot();
        Ok(snapshot)
    }

    /// Progress stream yielding each node once, then a terminal event
    pub async fn stream_progress(&self, id: Uuid) -> Result<ProgressStream> {
        let handle = self
            .store
            .get(id)
            .await
            .ok_or(EngineError::NotFound(id))?;
        Ok(ProgressStream::new(handle, &self.config))
    }
}

/// Run the workflow inside a nested task so panics surface as a JoinError
/// and degrade to a failed record instead of a permanently active one
async fn supervise(ctx: PhaseContext, id: Uuid) {
    let inner = ctx.clone();
    let outcome = tokio::spawn(async move { run_phases(&inner).await }).await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(investigation = %id, error = %err, "investigation failed");
            ctx.record.write().await.fail();
        }
        Err(join_err) => {
            error!(investigation = %id, error = %join_err, "investigation task panicked");
            ctx.record.write().await.fail();
        }
    }
}

async fn run_phases(ctx: &PhaseContext) -> Result<()> {
    let pace = ctx.config.phase_delay;

    let fetch = phases::data_fetch::run(ctx).await?;
    tokio::time::sleep(pace).await;

    let decision = phases::decision::run(ctx, &fetch).await?;
    tokio::time::sleep(pace).await;

    phases::fanout::run(ctx, &decision, &fetch).await?;
    tokio::time::sleep(pace).await;

    let validation_id = phases::cross_validate::run(ctx).await?;
    tokio::time::sleep(pace).await;

    let inference_parent = validation_id.unwrap_or(decision.node_id);
    phases::inference::run(ctx, inference_parent).await?;

    Ok(())
}
