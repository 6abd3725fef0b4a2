//! Queued event record.

use crate::features::state::IdentitySnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rough per-event overhead of the JSON envelope, in bytes
const ENVELOPE_OVERHEAD: usize = 96;

/// An event waiting for dispatch. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub sequence_no: u64,
    pub slug: String,
    #[serde(alias = "type")]
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Host version when the event was tracked
    pub version: String,
    /// Whether the host reported CI when the event was tracked
    pub is_ci: bool,
}

impl QueuedEvent {
    pub fn new(
        sequence_no: u64,
        identity: IdentitySnapshot,
        name: &str,
        payload: serde_json::Value,
    ) -> Self {
        QueuedEvent {
            sequence_no,
            slug: identity.project_slug,
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
            version: identity.version,
            is_ci: identity.is_ci,
        }
    }

    /// Approximate serialized size, used for queue and batch byte caps
    pub fn approx_size(&self) -> usize {
        estimate_size(&self.slug, &self.name, &self.version, &self.payload)
    }
}

/// Size estimate shared by the queue (before an event exists) and batching
pub fn estimate_size(slug: &str, name: &str, version: &str, payload: &serde_json::Value) -> usize {
    ENVELOPE_OVERHEAD + slug.len() + name.len() + version.len() + payload.to_string().len()
}
