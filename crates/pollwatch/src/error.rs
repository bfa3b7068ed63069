//! Error types for pollwatch.

use thiserror::Error;

/// Failure to turn a captured command into a request descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no absolute http(s) URL found in the command")]
    MissingUrl,
    #[error("internal parser fault: {0}")]
    Internal(String),
}

/// Rejected poll policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("interval must be at least one time unit")]
    ZeroInterval,
    #[error("failure notification cadence must be at least 1")]
    ZeroFailNotifyEvery,
    #[error("time unit must be non-zero")]
    ZeroTick,
}

/// Notification delivery failure. Never fatal to a poll run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("invalid notifier configuration: {0}")]
    Config(String),
}

/// Failure while building a probe
#[derive(Debug, Error)]
pub enum ProbeBuildError {
    #[error("invalid target URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header {0:?}")]
    InvalidHeader(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
