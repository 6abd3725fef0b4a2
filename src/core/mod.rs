//! # Core Module
//!
//! Configuration, error types and logging shared by every feature.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used items
pub use config::Config;
pub use error::{Error, Result};
