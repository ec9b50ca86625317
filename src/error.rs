use std::time::Duration;
use thiserror::Error;

/// Main error type for the monitoring bot
#[derive(Error, Debug)]
pub enum WatchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient upstream failure: {0}")]
    Transient(String),

    #[error("API authentication rejected: {0}")]
    Auth(String),

    // Lookup errors
    #[error("Player not found: {0}")]
    NotFound(String),

    #[error("Invalid player tag: {0}")]
    InvalidTag(String),

    // Record errors
    #[error("Malformed battle record: {0}")]
    MalformedRecord(String),

    // Monitoring lifecycle errors
    #[error("Already monitoring {0}")]
    AlreadyMonitored(String),

    #[error("Not monitoring {0}")]
    NotMonitored(String),

    // Persistence errors
    #[error("State store failure: {0}")]
    StateStore(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl WatchError {
    /// Stable error kind identifier, surfaced to external collaborators
    /// in place of raw transport errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::Config(_) => "config",
            WatchError::Http(_) => "http",
            WatchError::RateLimited { .. } => "rate_limited",
            WatchError::Transient(_) => "transient",
            WatchError::Auth(_) => "auth",
            WatchError::NotFound(_) => "not_found",
            WatchError::InvalidTag(_) => "invalid_tag",
            WatchError::MalformedRecord(_) => "malformed_record",
            WatchError::AlreadyMonitored(_) => "already_monitored",
            WatchError::NotMonitored(_) => "not_monitored",
            WatchError::StateStore(_) => "state_store",
            WatchError::Json(_) => "json",
            WatchError::Io(_) => "io",
            WatchError::Internal(_) => "internal",
            WatchError::Other(_) => "other",
        }
    }

    /// Whether the scheduler should answer this error with a backoff delay
    /// rather than failing the subject outright.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatchError::RateLimited { .. }
                | WatchError::Transient(_)
                | WatchError::Http(_)
                | WatchError::StateStore(_)
        )
    }
}

/// Result type alias for WatchError
pub type Result<T> = std::result::Result<T, WatchError>;
