//! # Consent Feature
//!
//! Permission gating for event collection: CI and non-interactive policy,
//! persisted opt-out, and the permission prompt handshake with the host.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

pub mod gate;
pub mod prompt;
pub mod signal;

pub use gate::{may_track, record_answer, ConsentDecision, ConsentInputs, DenyReason};
pub use prompt::{render_prompt, DEFAULT_REQUEST_PROMPT};
pub use signal::ConsentSignal;
