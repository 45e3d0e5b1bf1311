use thiserror::Error;

/// Error taxonomy for the checker.
///
/// Benign cache outcomes (not-found, already-exists, ...) are *not* errors;
/// they are carried by `store::StoreOutcome`. Anything surfacing here is a
/// genuine failure of input, transport, feed data or the cache service.
#[derive(Debug, Clone, Error)]
pub enum PhishError {
    /// Caller supplied something that is not a checkable URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Remote feed unreachable or answered with an unexpected status.
    /// Recoverable: a refresh is skipped, lookups keep serving cached data.
    #[error("Transport Error: {0}")]
    Transport(String),

    /// The feed response itself was unusable (missing/ambiguous validator
    /// headers, unparseable Last-Modified). Aborts one reload attempt.
    #[error("Ingestion Error: {0}")]
    Ingestion(String),

    /// The cache service is unhealthy. Fatal: no further progress is possible.
    #[error("Cache Fault: {0}")]
    CacheFault(String),

    /// Startup/configuration problems.
    #[error("Config Error: {0}")]
    Config(String),
}

impl PhishError {
    /// Whether this error must propagate to the caller of `check()`.
    /// Transport and ingestion failures are swallowed by the refresh path
    /// so lookups keep answering from whatever is cached.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PhishError::CacheFault(_) | PhishError::Config(_))
    }

    /// HTTP status the front end maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            PhishError::InvalidUrl(_) => 400,
            _ => 500,
        }
    }
}

impl From<redis::RedisError> for PhishError {
    fn from(err: redis::RedisError) -> Self {
        PhishError::CacheFault(format!("redis error: {}", err))
    }
}

impl From<reqwest::Error> for PhishError {
    fn from(err: reqwest::Error) -> Self {
        PhishError::Transport(format!("feed request failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PhishError>;
