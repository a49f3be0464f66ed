//! Incremental progress streaming
//!
//! A `ProgressStream` polls one investigation's record and yields every node
//! exactly once, in append order, followed by a single terminal event. The
//! stream holds no subscription inside the engine; it is a cursor over the
//! record's append-only node list, so any number of streams can observe the
//! same investigation independently.

use crate::config::EngineConfig;
use crate::model::{InvestigationStatus, Node};
use crate::store::SharedRecord;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// One streamed progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A node was appended to the investigation tree
    NodeAdded(Node),
    /// Terminal event: the investigation left the active state (or the
    /// stream hit its poll cap). Emitted exactly once, always last.
    #[serde(rename_all = "camelCase")]
    InvestigationComplete {
        status: InvestigationStatus,
        confidence_score: f64,
        total_nodes: usize,
    },
}

/// Polling cursor over one investigation's node list
pub struct ProgressStream {
    record: SharedRecord,
    poll_interval: Duration,
    max_polls: u32,
    polls: u32,
    cursor: usize,
    pending: VecDeque<ProgressEvent>,
    done: bool,
}

impl ProgressStream {
    pub(crate) fn new(record: SharedRecord, config: &EngineConfig) -> Self {
        Self {
            record,
            poll_interval: config.poll_interval,
            max_polls: config.max_polls,
            polls: 0,
            cursor: 0,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Next event, or `None` once the terminal event has been yielded.
    ///
    /// Nodes that appeared between polls are drained before the terminal
    /// event, so the event count is always the node count plus one.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.done {
                return None;
            }

            let (active, status, confidence_score) = {
                let record = self.record.read().await;
                for node in &record.nodes[self.cursor..] {
                    self.pending.push_back(ProgressEvent::NodeAdded(node.clone()));
                }
                self.cursor = record.nodes.len();
                (record.is_active(), record.status, record.confidence_score)
            };

            if !active || self.polls >= self.max_polls {
                self.pending.push_back(ProgressEvent::InvestigationComplete {
                    status,
                    confidence_score,
                    total_nodes: self.cursor,
                });
                self.done = true;
                continue;
            }

            if !self.pending.is_empty() {
                continue;
            }

            self.polls += 1;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Adapt into a `futures::Stream` of events
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_event().await.map(|event| (event, stream))
        })
    }
}
