//! Exported entry points. Setters return nothing; everything else returns a
//! status code from [`crate::ffi`].
//!
//! Functions that take pointers are `unsafe`: every pointer must be null or a
//! NUL-terminated string that stays valid for the duration of the call.

use super::marshal::{free_c_string, into_c_string, read_flag, read_payload, read_str};
use super::{
    tracker, update, with_tracker, STATUS_DENIED, STATUS_INTERNAL, STATUS_INVALID_ARGUMENT,
    STATUS_OK, STATUS_PROMPT_REQUIRED, STATUS_TIMED_OUT,
};
use crate::core::logging;
use crate::features::consent::{ConsentDecision, ConsentSignal};
use crate::features::state::ConfigState;
use crate::tracker::TrackOutcome;
use log::{debug, error, warn};
use std::ffi::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Store a string setting; null pointers are ignored
unsafe fn set_text(name: &str, ptr: *const c_char, log_value: bool, set: fn(&mut ConfigState, &str)) {
    update(name, |tracker| match read_str(ptr) {
        Some(value) => {
            if log_value {
                debug!("{name} {value:?}");
            } else {
                debug!("{name} <{} chars>", value.chars().count());
            }
            tracker.update_state(|state| set(state, &value));
        }
        None => debug!("{name}: null pointer ignored"),
    });
}

fn apply_signal(name: &str, signal: ConsentSignal) {
    update(name, |tracker| tracker.apply_signal(signal));
}

#[no_mangle]
pub extern "C" fn set_debug(debug: u32) {
    update("set_debug", |tracker| {
        let requested = read_flag(debug);
        tracker.update_state(|state| state.set_debug(requested));
        let effective = tracker.state().debug();
        logging::set_debug(effective);
        debug!("set_debug debug={effective}");
    });
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_version(version: *const c_char) {
    set_text("set_version", version, true, ConfigState::set_version);
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_project_key(key: *const c_char) {
    set_text("set_project_key", key, false, ConfigState::set_project_key);
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_project_slug(slug: *const c_char) {
    set_text("set_project_slug", slug, true, ConfigState::set_project_slug);
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_instance_id(id: *const c_char) {
    set_text("set_instance_id", id, true, ConfigState::set_instance_id);
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_request_permission_prompt(text: *const c_char) {
    set_text(
        "set_request_permission_prompt",
        text,
        false,
        ConfigState::set_request_permission_prompt,
    );
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_user_id(user_id: *const c_char) {
    set_text("set_user_id", user_id, true, ConfigState::set_user_id);
}

/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn set_invocation_id(invocation_id: *const c_char) {
    set_text(
        "set_invocation_id",
        invocation_id,
        true,
        ConfigState::set_invocation_id,
    );
}

#[no_mangle]
pub extern "C" fn set_is_ci(is_ci: u32) {
    apply_signal("set_is_ci", ConsentSignal::IsCi(read_flag(is_ci)));
}

#[no_mangle]
pub extern "C" fn set_ci_tracking_enabled(enabled: u32) {
    apply_signal(
        "set_ci_tracking_enabled",
        ConsentSignal::CiTrackingEnabled(read_flag(enabled)),
    );
}

#[no_mangle]
pub extern "C" fn set_is_noninteractive(is_noninteractive: u32) {
    apply_signal(
        "set_is_noninteractive",
        ConsentSignal::IsNoninteractive(read_flag(is_noninteractive)),
    );
}

/// Legacy form of [`set_noninteractive_tracking`]
#[no_mangle]
pub extern "C" fn set_noninteractive_tracking_enabled(enabled: u32) {
    apply_signal(
        "set_noninteractive_tracking_enabled",
        ConsentSignal::NoninteractiveTrackingEnabled(read_flag(enabled)),
    );
}

#[no_mangle]
pub extern "C" fn set_noninteractive_tracking(is_noninteractive: u32, enabled: u32) {
    apply_signal(
        "set_noninteractive_tracking",
        ConsentSignal::Noninteractive {
            is_noninteractive: read_flag(is_noninteractive),
            tracking_enabled: read_flag(enabled),
        },
    );
}

/// Queue an event if consent allows it; a non-zero `dispatch` sends the
/// queue right away.
///
/// # Safety
/// See the module docs.
#[no_mangle]
pub unsafe extern "C" fn track_event(
    slug: *const c_char,
    name: *const c_char,
    payload: *const c_char,
    dispatch: u32,
) -> c_int {
    with_tracker("track_event", |tracker| {
        let (Some(slug), Some(name)) = (read_str(slug), read_str(name)) else {
            warn!("track_event called with a null slug or name");
            return STATUS_INVALID_ARGUMENT;
        };
        let payload = read_payload(payload);
        let dispatch_now = read_flag(dispatch);
        debug!("track_event slug={slug:?} name={name:?} payload={payload} dispatch={dispatch_now}");

        match tracker.track_event(&slug, &name, payload, dispatch_now) {
            TrackOutcome::Queued { .. } => STATUS_OK,
            TrackOutcome::Denied(_) => STATUS_DENIED,
            TrackOutcome::PromptRequired => STATUS_PROMPT_REQUIRED,
            TrackOutcome::Dropped => STATUS_INVALID_ARGUMENT,
        }
    })
}

/// Hand every queued event to the background dispatcher and return at once
#[no_mangle]
pub extern "C" fn dispatch_events() -> c_int {
    with_tracker("dispatch_events", |tracker| {
        debug!("dispatch_events");
        match tracker.dispatch_events() {
            Ok(_) => STATUS_OK,
            Err(e) => {
                error!("dispatch_events failed: {e}");
                STATUS_INTERNAL
            }
        }
    })
}

/// Wait up to `timeout_ms` for running dispatches, for hosts about to exit
#[no_mangle]
pub extern "C" fn flush_events(timeout_ms: u32) -> c_int {
    with_tracker("flush_events", |tracker| {
        debug!("flush_events timeout_ms={timeout_ms}");
        if tracker.flush(Duration::from_millis(timeout_ms.into())) {
            STATUS_OK
        } else {
            STATUS_TIMED_OUT
        }
    })
}

/// Current consent decision: `0` allow, `1` denied, `2` prompt required
#[no_mangle]
pub extern "C" fn consent_status() -> c_int {
    with_tracker("consent_status", |tracker| match tracker.consent() {
        ConsentDecision::Allow => STATUS_OK,
        ConsentDecision::Deny(_) => STATUS_DENIED,
        ConsentDecision::PromptRequired => STATUS_PROMPT_REQUIRED,
    })
}

/// Record the user's answer to the permission prompt
#[no_mangle]
pub extern "C" fn answer_permission_prompt(allow: u32) -> c_int {
    with_tracker("answer_permission_prompt", |tracker| {
        if let Err(e) = tracker.answer_prompt(read_flag(allow)) {
            warn!("Permission answer applies to this run only: {e}");
        }
        STATUS_OK
    })
}

/// The permission prompt, rendered. Release with [`free_string`]. Null on
/// failure.
#[no_mangle]
pub extern "C" fn permission_prompt_text() -> *mut c_char {
    let text = panic::catch_unwind(AssertUnwindSafe(|| {
        tracker().map(|tracker| tracker.permission_prompt())
    }));
    match text {
        Ok(Some(text)) => into_c_string(text),
        Ok(None) => std::ptr::null_mut(),
        Err(_) => {
            error!("permission_prompt_text panicked");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `text` must be null or a string returned by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn free_string(text: *mut c_char) {
    free_c_string(text);
}
