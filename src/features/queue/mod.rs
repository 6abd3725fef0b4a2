//! # Queue Feature
//!
//! Bounded in-memory storage for events that passed the consent gate.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod buffer;
pub mod event;

pub use buffer::{EnqueueOutcome, EventQueue};
pub use event::QueuedEvent;
