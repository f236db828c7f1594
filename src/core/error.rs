//! Error taxonomy for the rate pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never produced a response (timeout, refused connection).
    Transport,
    /// A response arrived but could not be used.
    Protocol,
}

/// Errors raised by a single rate source fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("provider returned an error: {0}")]
    Rejected(String),

    #[error("no rates received from {0}")]
    Empty(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout(_) | FetchError::Connection(_) => FailureKind::Transport,
            FetchError::HttpStatus { .. }
            | FetchError::Parse(_)
            | FetchError::Rejected(_)
            | FetchError::Empty(_) => FailureKind::Protocol,
        }
    }
}

/// Configuration problems. These are never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown source: {name}. Available: {}", .available.join(", "))]
    UnknownSource {
        name: String,
        available: Vec<String>,
    },

    #[error("no provider id configured for crypto currency {0}")]
    MissingProviderId(String),

    #[error("unknown crypto currency: {0}")]
    UnknownCode(String),

    #[error("invalid currency code: {0:?}")]
    InvalidCode(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Failures while reading or writing the cache files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}
