//! # Event Queue
//!
//! Ordered, bounded in-memory buffer of events waiting for dispatch. When a
//! new event pushes the queue past its event or byte cap, the oldest events
//! are dropped first. Enqueueing never waits on anything but the queue lock.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::features::queue::event::{estimate_size, QueuedEvent};
use crate::features::state::IdentitySnapshot;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Event stored; `evicted` older events were dropped to make room
    Queued { sequence_no: u64, evicted: usize },
    /// Event alone exceeds the byte cap and was not stored
    TooLarge { size: usize },
}

#[derive(Debug, Default)]
struct QueueInner {
    events: VecDeque<QueuedEvent>,
    bytes: usize,
    next_sequence: u64,
    evicted_total: u64,
}

#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    max_events: usize,
    max_bytes: usize,
}

impl EventQueue {
    pub fn new(max_events: usize, max_bytes: usize) -> Self {
        EventQueue {
            inner: Mutex::new(QueueInner {
                next_sequence: 1,
                ..Default::default()
            }),
            max_events: max_events.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event, evicting the oldest ones if a cap is exceeded
    pub fn enqueue(
        &self,
        identity: IdentitySnapshot,
        name: &str,
        payload: serde_json::Value,
    ) -> EnqueueOutcome {
        let size = estimate_size(&identity.project_slug, name, &identity.version, &payload);
        if size > self.max_bytes {
            warn!(
                "Dropping event {:?}: {} bytes exceeds queue limit of {} bytes",
                name, size, self.max_bytes
            );
            return EnqueueOutcome::TooLarge { size };
        }

        let mut inner = self.lock();
        let sequence_no = inner.next_sequence;
        inner.next_sequence += 1;

        let mut evicted = 0;
        while !inner.events.is_empty()
            && (inner.events.len() + 1 > self.max_events || inner.bytes + size > self.max_bytes)
        {
            if let Some(oldest) = inner.events.pop_front() {
                inner.bytes -= oldest.approx_size();
                evicted += 1;
            }
        }
        if evicted > 0 {
            inner.evicted_total += evicted as u64;
            warn!(
                "Event queue full, dropped {} oldest event(s) ({} dropped so far)",
                evicted, inner.evicted_total
            );
        }

        let event = QueuedEvent::new(sequence_no, identity, name, payload);
        inner.bytes += event.approx_size();
        inner.events.push_back(event);
        debug!(
            "Queued event #{} {:?} ({} pending)",
            sequence_no,
            name,
            inner.events.len()
        );

        EnqueueOutcome::Queued {
            sequence_no,
            evicted,
        }
    }

    /// Take every event currently queued, oldest first
    pub fn drain(&self) -> Vec<QueuedEvent> {
        let mut inner = self.lock();
        inner.bytes = 0;
        inner.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Approximate bytes held by pending events
    #[cfg(test)]
    fn bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Events dropped by eviction over the life of the queue
    #[cfg(test)]
    fn evicted_total(&self) -> u64 {
        self.lock().evicted_total
    }
}
