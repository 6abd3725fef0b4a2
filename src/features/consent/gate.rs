//! # Consent Gate
//!
//! Decides whether an event may be recorded for the current invocation.
//! Rules are checked in order and the first match wins:
//!
//! 1. CI without CI tracking enabled: deny
//! 2. persisted opt-out: deny
//! 3. non-interactive without non-interactive tracking enabled: deny
//! 4. interactive and the prompt never answered: prompt required
//! 5. otherwise: allow
//!
//! `PromptRequired` never records anything on its own. Callers treat it as
//! a deny until the host reports an answer.

use crate::features::settings::PersistedSettings;
use chrono::{DateTime, Utc};

/// Environment facts the gate reads, copied out of the config state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsentInputs {
    pub is_ci: bool,
    pub ci_tracking_enabled: bool,
    pub is_noninteractive: bool,
    pub noninteractive_tracking_enabled: bool,
}

/// Outcome of a consent check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsentDecision {
    Allow,
    Deny(DenyReason),
    PromptRequired,
}

/// Why tracking was denied, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    CiTrackingDisabled,
    OptedOut,
    NoninteractiveTrackingDisabled,
}

impl ConsentDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ConsentDecision::Allow)
    }
}

impl std::fmt::Display for ConsentDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentDecision::Allow => write!(f, "allow"),
            ConsentDecision::Deny(reason) => write!(f, "deny ({reason})"),
            ConsentDecision::PromptRequired => write!(f, "prompt required"),
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::CiTrackingDisabled => write!(f, "ci tracking disabled"),
            DenyReason::OptedOut => write!(f, "opted out"),
            DenyReason::NoninteractiveTrackingDisabled => {
                write!(f, "non-interactive tracking disabled")
            }
        }
    }
}

/// Evaluate the consent rules
pub fn may_track(inputs: &ConsentInputs, settings: &PersistedSettings) -> ConsentDecision {
    if inputs.is_ci && !inputs.ci_tracking_enabled {
        return ConsentDecision::Deny(DenyReason::CiTrackingDisabled);
    }
    if settings.opted_out {
        return ConsentDecision::Deny(DenyReason::OptedOut);
    }
    if inputs.is_noninteractive {
        if !inputs.noninteractive_tracking_enabled {
            return ConsentDecision::Deny(DenyReason::NoninteractiveTrackingDisabled);
        }
        // Nobody to ask; the host enabled non-interactive tracking explicitly
        return ConsentDecision::Allow;
    }
    if !settings.prompt_answered {
        return ConsentDecision::PromptRequired;
    }
    ConsentDecision::Allow
}

/// Record the host's answer to the permission prompt
pub fn record_answer(settings: &mut PersistedSettings, allow: bool, at: DateTime<Utc>) {
    settings.prompt_answered = true;
    settings.opted_out = !allow;
    settings.last_prompt_at = Some(at);
}
