//! In-memory sink for tests.

use crate::core::error::{Error, Result};
use crate::features::dispatch::batch::Batch;
use crate::features::dispatch::sink::EventSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every batch it accepts; can be slowed down or made to fail
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Batch>>,
    requests: AtomicUsize,
    delay: Duration,
    fail_status: Option<u16>,
}

impl RecordingSink {
    pub fn with_delay(delay: Duration) -> Self {
        RecordingSink {
            delay,
            ..Default::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        RecordingSink {
            fail_status: Some(status),
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    /// Sequence numbers of every delivered event, in delivery order
    pub fn sequences(&self) -> Vec<u64> {
        self.batches()
            .iter()
            .flat_map(|b| b.events.iter().map(|e| e.sequence))
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, batch: &Batch) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(Error::Rejected {
                status,
                retryable: status >= 500,
            });
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}
