//! # State Feature
//!
//! The host-configured state shared by every FFI call.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod config_state;

pub use config_state::{ConfigState, IdentitySnapshot};
