//! Batch wire format and batching of drained events.
//!
//! Wire format (one POST per batch):
//!
//! ```json
//! {
//!   "slug": "acme",
//!   "events": [{"name": "command", "payload": {}, "timestamp": "...", "sequence": 1, "version": "1.0", "ci": false}],
//!   "user_id": "...",
//!   "invocation_id": "...",
//!   "project_key": "..."
//! }
//! ```

use crate::features::queue::QueuedEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request metadata captured when a dispatch starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMetadata {
    pub user_id: String,
    pub invocation_id: String,
    pub project_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub version: String,
    pub ci: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub slug: String,
    pub events: Vec<BatchEvent>,
    pub user_id: String,
    pub invocation_id: String,
    pub project_key: String,
}

impl Batch {
    fn empty(slug: &str, meta: &DispatchMetadata) -> Self {
        Batch {
            slug: slug.to_string(),
            events: Vec::new(),
            user_id: meta.user_id.clone(),
            invocation_id: meta.invocation_id.clone(),
            project_key: meta.project_key.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence numbers covered by this batch, for log lines
    pub fn sequence_range(&self) -> Option<(u64, u64)> {
        Some((self.events.first()?.sequence, self.events.last()?.sequence))
    }
}

impl From<QueuedEvent> for BatchEvent {
    fn from(event: QueuedEvent) -> Self {
        BatchEvent {
            name: event.name,
            payload: event.payload,
            timestamp: event.timestamp,
            sequence: event.sequence_no,
            version: event.version,
            ci: event.is_ci,
        }
    }
}

/// Split drained events into batches, keeping queue order.
///
/// A new batch starts whenever the slug changes or the current batch would
/// exceed `max_events` or `max_bytes`. A single event is never split, so a
/// batch holding one event may exceed `max_bytes`.
pub fn build_batches(
    events: Vec<QueuedEvent>,
    meta: &DispatchMetadata,
    max_events: usize,
    max_bytes: usize,
) -> Vec<Batch> {
    let max_events = max_events.max(1);
    let mut batches: Vec<Batch> = Vec::new();
    let mut current_bytes = 0;

    for event in events {
        let size = event.approx_size();
        let start_new = match batches.last() {
            None => true,
            Some(batch) => {
                batch.slug != event.slug
                    || batch.len() >= max_events
                    || (!batch.is_empty() && current_bytes + size > max_bytes)
            }
        };
        if start_new {
            batches.push(Batch::empty(&event.slug, meta));
            current_bytes = 0;
        }

        current_bytes += size;
        if let Some(batch) = batches.last_mut() {
            batch.events.push(event.into());
        }
    }

    batches
}
