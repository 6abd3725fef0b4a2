//! # FFI Surface
//!
//! The `extern "C"` functions a host program calls. Each one reads its
//! arguments, forwards to the process-wide [`Tracker`] and collapses the
//! result into an integer status. Panics are caught here and never unwind
//! into the host.
//!
//! The tracker is built on the first call from the `CLS_*` environment.
//!
//! - **Version**: 0.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 0.1.0: Initial release

pub mod exports;
pub mod marshal;

use crate::core::{logging, Config};
use crate::tracker::Tracker;
use log::error;
use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

/// Success, or event queued
pub const STATUS_OK: c_int = 0;
/// Event skipped: consent denied
pub const STATUS_DENIED: c_int = 1;
/// Event skipped: the permission prompt has not been answered
pub const STATUS_PROMPT_REQUIRED: c_int = 2;
/// `flush_events` gave up with dispatches still running
pub const STATUS_TIMED_OUT: c_int = 3;
/// Null pointer or an event too large to keep
pub const STATUS_INVALID_ARGUMENT: c_int = -1;
/// Caught panic or background runtime unavailable
pub const STATUS_INTERNAL: c_int = -2;

static TRACKER: OnceLock<Option<Tracker>> = OnceLock::new();

/// The process-wide tracker, built on first use. `None` if the HTTP client
/// could not be created.
pub fn tracker() -> Option<&'static Tracker> {
    TRACKER
        .get_or_init(|| {
            let config = Config::from_env();
            logging::init(config.log_filter.as_deref(), config.debug.unwrap_or(false));
            match Tracker::new(config) {
                Ok(tracker) => Some(tracker),
                Err(e) => {
                    error!("Failed to initialize tracker, all calls are no-ops: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// Run `call` against the tracker, mapping a missing tracker or a panic to
/// [`STATUS_INTERNAL`]
fn with_tracker<F>(name: &str, call: F) -> c_int
where
    F: FnOnce(&Tracker) -> c_int,
{
    match panic::catch_unwind(AssertUnwindSafe(|| tracker().map(call))) {
        Ok(Some(status)) => status,
        Ok(None) => STATUS_INTERNAL,
        Err(_) => {
            error!("{name} panicked");
            STATUS_INTERNAL
        }
    }
}

/// Setter variant of [`with_tracker`]; setters report nothing to the host
fn update<F>(name: &str, call: F)
where
    F: FnOnce(&Tracker),
{
    with_tracker(name, |tracker| {
        call(tracker);
        STATUS_OK
    });
}
