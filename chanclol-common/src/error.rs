use std::error::Error;

use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum ChanclolError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse URL: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("deserialization failed: {0}")]
    DeserializeJson(#[from] serde_json::Error),
    #[error("quota rule must allow at least one request per non-zero window (got {max_requests} per {window:?})")]
    InvalidQuota {
        max_requests: u32,
        window: std::time::Duration,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("remote answered with status {0}")]
    RemoteStatus(StatusCode),
    #[error("remote is throttling requests")]
    Throttled,
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Inconsistent state error: {0}")]
    InconsistentState(String),
    #[error("lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ChanclolError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ChanclolError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
