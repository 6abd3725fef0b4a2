//! Consent signals reported by the host.
//!
//! The FFI keeps both the legacy single-flag setters and the combined
//! non-interactive setter. Each of them produces one of these variants, and
//! `ConfigState::apply` is the only place that turns a signal into state.

/// A change to the environment facts the consent gate reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentSignal {
    /// Host runs under CI
    IsCi(bool),
    /// Whether tracking is allowed under CI
    CiTrackingEnabled(bool),
    /// Host runs without a user at the terminal (legacy setter)
    IsNoninteractive(bool),
    /// Whether tracking is allowed when non-interactive (legacy setter)
    NoninteractiveTrackingEnabled(bool),
    /// Combined form of the two legacy non-interactive setters
    Noninteractive {
        is_noninteractive: bool,
        tracking_enabled: bool,
    },
}

impl std::fmt::Display for ConsentSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentSignal::IsCi(v) => write!(f, "is_ci={v}"),
            ConsentSignal::CiTrackingEnabled(v) => write!(f, "ci_tracking_enabled={v}"),
            ConsentSignal::IsNoninteractive(v) => write!(f, "is_noninteractive={v}"),
            ConsentSignal::NoninteractiveTrackingEnabled(v) => {
                write!(f, "noninteractive_tracking_enabled={v}")
            }
            ConsentSignal::Noninteractive {
                is_noninteractive,
                tracking_enabled,
            } => write!(
                f,
                "is_noninteractive={is_noninteractive} noninteractive_tracking_enabled={tracking_enabled}"
            ),
        }
    }
}
