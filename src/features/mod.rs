//! # Features
//!
//! The tracking pipeline, leaf-first: settings persistence, host-configured
//! state, consent gating, the event queue and background dispatch.

pub mod consent;
pub mod dispatch;
pub mod queue;
pub mod settings;
pub mod state;

pub use consent::{ConsentDecision, ConsentSignal};
pub use dispatch::{Dispatcher, EventSink, HttpSink, RetryPolicy};
pub use queue::{EnqueueOutcome, EventQueue, QueuedEvent};
pub use settings::{PersistedSettings, SettingsStore};
pub use state::ConfigState;
