// Core layer - shared types and configuration
pub mod core;

// Features layer - the tracking pipeline
pub mod features;

// Application layer - the owned tracker wiring the features together
pub mod tracker;

// FFI layer - the C ABI surface for host programs
pub mod ffi;

// Re-export core config for convenience
pub use core::{Config, Error, Result};

// Re-export feature items
pub use features::{
    // Consent
    ConsentDecision, ConsentSignal,
    // Dispatch
    Dispatcher, EventSink, HttpSink, RetryPolicy,
    // Queue
    EnqueueOutcome, EventQueue, QueuedEvent,
    // Settings
    PersistedSettings, SettingsStore,
    // State
    ConfigState,
};

pub use tracker::{TrackOutcome, Tracker};
