//! # Dispatch Feature
//!
//! Batching, delivery and retry of queued events.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod batch;
pub mod dispatcher;
pub mod retry;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{build_batches, Batch, BatchEvent, DispatchMetadata};
pub use dispatcher::{DispatchStatsSnapshot, Dispatcher};
pub use retry::RetryPolicy;
pub use sink::{EventSink, HttpSink};
