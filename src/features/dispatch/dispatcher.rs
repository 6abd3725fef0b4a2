//! # Dispatcher
//!
//! Delivers batches on a small background tokio runtime owned by the
//! dispatcher, so the host's calling thread never waits on the network.
//! Each call to [`Dispatcher::dispatch`] becomes one task that sends its
//! batches in order, retrying per [`RetryPolicy`], and drops what it cannot
//! deliver. [`Dispatcher::dispatch_with`] also moves building the batches
//! onto the runtime's blocking pool.
//!
//! The number of running tasks is tracked so a host can optionally wait for
//! them with [`Dispatcher::flush`] before exiting.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

use crate::core::error::{Error, Result};
use crate::features::dispatch::batch::Batch;
use crate::features::dispatch::retry::{send_with_retry, RetryPolicy};
use crate::features::dispatch::sink::EventSink;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const WORKER_THREADS: usize = 2;
const THREAD_NAME: &str = "cls-dispatch";

/// Count of dispatch tasks still running
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(self: &Arc<Self>) -> InFlightGuard {
        *self.lock() += 1;
        InFlightGuard(self.clone())
    }
}

/// Decrements the in-flight count when the task finishes or is dropped
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Delivery counters over the life of the dispatcher
#[derive(Debug, Default)]
pub struct DispatchStats {
    batches_sent: AtomicU64,
    batches_dropped: AtomicU64,
    events_sent: AtomicU64,
    events_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub batches_sent: u64,
    pub batches_dropped: u64,
    pub events_sent: u64,
    pub events_dropped: u64,
}

impl DispatchStats {
    fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct Dispatcher {
    /// `None` if the runtime could not be built; dispatch is then a no-op
    runtime: Option<Runtime>,
    sink: Arc<dyn EventSink>,
    policy: RetryPolicy,
    in_flight: Arc<InFlight>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn EventSink>, policy: RetryPolicy) -> Self {
        let runtime = match Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name(THREAD_NAME)
            .enable_all()
            .build()
        {
            Ok(rt) => Some(rt),
            Err(e) => {
                error!("Failed to start dispatch runtime, events will not be sent: {e}");
                None
            }
        };

        Dispatcher {
            runtime,
            sink,
            policy,
            in_flight: Arc::new(InFlight::default()),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Schedule delivery of `batches` and return immediately.
    ///
    /// Returns the number of batches handed to the background runtime.
    pub fn dispatch(&self, batches: Vec<Batch>) -> Result<usize> {
        if batches.is_empty() {
            debug!("Nothing to dispatch");
            return Ok(0);
        }

        let count = batches.len();
        self.dispatch_with(move || batches)?;
        debug!("Scheduled {count} batch(es) for dispatch");
        Ok(count)
    }

    /// Schedule `prepare` on the background runtime and deliver the batches
    /// it builds. `prepare` may block on disk; it runs on the blocking pool,
    /// never on the caller's thread.
    pub fn dispatch_with<F>(&self, prepare: F) -> Result<()>
    where
        F: FnOnce() -> Vec<Batch> + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(Error::Runtime(std::io::Error::other(
                "dispatch runtime was not started",
            )));
        };

        let guard = self.in_flight.begin();
        let sink = self.sink.clone();
        let policy = self.policy;
        let stats = self.stats.clone();

        runtime.spawn(async move {
            let _guard = guard;
            match tokio::task::spawn_blocking(prepare).await {
                Ok(batches) => deliver(sink.as_ref(), batches, &policy, &stats).await,
                Err(e) => error!("Preparing dispatch failed, events dropped: {e}"),
            }
        });
        Ok(())
    }

    /// Wait until every scheduled dispatch has finished or `timeout` passes.
    /// Returns `true` when nothing is left in flight.
    pub fn flush(&self, timeout: Duration) -> bool {
        let count = self.in_flight.lock();
        let (count, _) = self
            .in_flight
            .idle
            .wait_timeout_while(count, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *count > 0 {
            warn!("Flush timed out with {} dispatch(es) still running", *count);
        }
        *count == 0
    }

    /// Dispatch tasks still running
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Never block the dropping thread on unfinished deliveries
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn deliver(
    sink: &dyn EventSink,
    batches: Vec<Batch>,
    policy: &RetryPolicy,
    stats: &DispatchStats,
) {
    for batch in batches {
        let events = batch.len() as u64;
        match send_with_retry(sink, &batch, policy).await {
            Ok(attempts) => {
                stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                stats.events_sent.fetch_add(events, Ordering::Relaxed);
                info!(
                    "Dispatched {} event(s) for {:?} (sequence {:?}, {} attempt(s))",
                    events,
                    batch.slug,
                    batch.sequence_range(),
                    attempts
                );
            }
            Err(e) => {
                stats.batches_dropped.fetch_add(1, Ordering::Relaxed);
                stats.events_dropped.fetch_add(events, Ordering::Relaxed);
                warn!(
                    "Dropping batch of {} event(s) for {:?}: {}",
                    events, batch.slug, e
                );
            }
        }
    }
}
