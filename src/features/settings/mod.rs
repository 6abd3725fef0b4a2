//! # Settings Feature
//!
//! Local persistence of consent decisions and cached identifiers.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod store;

pub use store::{settings_key, PersistedSettings, SettingsKey, SettingsStore};
