//! Investigation registry
//!
//! The registry is an explicit store injected into the orchestrator, not
//! ambient global state. Each record is wrapped in its own lock: the single
//! background task for that investigation takes write access, status queries
//! and progress streams take concurrent read access.

use crate::config::RetentionPolicy;
use crate::model::InvestigationRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Handle to one investigation's mutable state
pub type SharedRecord = Arc<RwLock<InvestigationRecord>>;

/// Registry of investigations by id
#[async_trait]
pub trait InvestigationStore: Send + Sync {
    /// Register a new record, returning its shared handle
    async fn insert(&self, record: InvestigationRecord) -> SharedRecord;

    /// Look up an investigation by id
    async fn get(&self, id: Uuid) -> Option<SharedRecord>;

    /// Number of registered investigations
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory store with optional capacity-bounded retention
pub struct InMemoryStore {
    records: RwLock<HashMap<Uuid, SharedRecord>>,
    retention: RetentionPolicy,
}

impl InMemoryStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Evict the oldest finished investigations beyond capacity.
    /// Active investigations are never evicted. Caller holds the write lock.
    async fn evict_over_capacity(records: &mut HashMap<Uuid, SharedRecord>, capacity: usize) {
        if records.len() <= capacity {
            return;
        }

        let mut finished = Vec::new();
        for (id, handle) in records.iter() {
            let record = handle.read().await;
            if !record.is_active() {
                finished.push((*id, record.started_at));
            }
        }
        finished.sort_by_key(|(_, started_at)| *started_at);

        let excess = records.len() - capacity;
        for (id, _) in finished.into_iter().take(excess) {
            tracing::debug!(investigation = %id, "evicting finished investigation");
            records.remove(&id);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

#[async_trait]
impl InvestigationStore for InMemoryStore {
    async fn insert(&self, record: InvestigationRecord) -> SharedRecord {
        let id = record.id;
        let handle = Arc::new(RwLock::new(record));

        let mut records = self.records.write().await;
        records.insert(id, Arc::clone(&handle));

        if let RetentionPolicy::Capacity(capacity) = self.retention {
            Self::evict_over_capacity(&mut records, capacity).await;
        }

        handle
    }

    async fn get(&self, id: Uuid) -> Option<SharedRecord> {
        self.records.read().await.get(&id).map(Arc::clone)
    }

    async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}
