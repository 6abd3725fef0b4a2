//! # Error Types
//!
//! Internal error taxonomy. None of these cross the FFI boundary; the
//! exported functions collapse them into integer status codes.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced inside the tracking pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration input (normalized, never fatal)
    #[error("invalid value for {key}: {reason}")]
    Config { key: &'static str, reason: String },

    /// Settings could not be read or written
    #[error("settings storage error at '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file exists but does not parse
    #[error("settings file '{}' is corrupt: {source}", path.display())]
    CorruptSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No platform directory to keep settings in
    #[error("no local settings directory available on this platform")]
    NoSettingsDir,

    /// HTTP transport failure (connect, timeout, TLS, body)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sink answered with a non-success status
    #[error("sink rejected batch with status {status}")]
    Rejected { status: u16, retryable: bool },

    /// The background dispatch runtime could not be started
    #[error("dispatch runtime unavailable: {0}")]
    Runtime(#[source] std::io::Error),
}

impl Error {
    /// Whether a dispatch attempt that failed with this error is worth repeating
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Rejected { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_retryable_flag() {
        let transient = Error::Rejected {
            status: 503,
            retryable: true,
        };
        let permanent = Error::Rejected {
            status: 400,
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!Error::NoSettingsDir.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::Config {
            key: "CLS_QUEUE_MAX_EVENTS",
            reason: "not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for CLS_QUEUE_MAX_EVENTS: not a number"
        );
    }
}
