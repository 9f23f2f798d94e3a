//! Errors that end up inside a snapshot.
//!
//! A failed fetch is data, not control flow: the error is stored next to the
//! watch-list entry it belongs to so presenters can show a per-instrument
//! "unavailable" state. Payloads are plain strings to keep the type `Clone`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with something we could not read
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid code or setting, recovered by ignoring it
    #[error("Config error: {0}")]
    Config(String),

    /// The provider asked us to slow down; wait for the next tick
    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl FetchError {
    pub fn parse(msg: impl Into<String>) -> Self {
        FetchError::Parse(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        FetchError::Network(msg.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(format!("{:?}", err))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
