use thiserror::Error;

use crate::record::ScrapeStatus;

/// Static fetch failures. Any of these marks the club `Failed`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("http status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Rendering failures. Never fatal: the static result is kept.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser error: {0}")]
    Browser(String),

    #[error("render timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("bad pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("bad selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value `{value}`")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal status transition {from:?} -> {to:?}")]
pub struct StatusError {
    pub from: ScrapeStatus,
    pub to: ScrapeStatus,
}
