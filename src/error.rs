//! Muninn error types

use std::time::Duration;

/// One failed attempt against a candidate backend.
///
/// Collected by the router while it walks the fallback chain; the full
/// list is surfaced inside [`MuninnError::AllBackendsFailed`] so a caller
/// sees every backend that was tried and why it failed.
#[derive(Debug, Clone)]
pub struct BackendAttempt {
    /// Backend id the attempt was made against.
    pub backend_id: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl std::fmt::Display for BackendAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend_id, self.reason)
    }
}

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    /// Host memory/cpu facts could not be queried (permission or platform
    /// issue). The router recovers by assuming zero available memory.
    #[error("host metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// Loading this backend would exceed the memory budget. The router
    /// skips to the next candidate in the chain.
    #[error(
        "insufficient memory for backend '{backend}': needs {required_mb} MB, {available_mb} MB available"
    )]
    InsufficientMemory {
        backend: String,
        required_mb: u64,
        available_mb: u64,
    },

    /// Backend could not be reached or refused the request.
    #[error("backend '{0}' unavailable")]
    BackendUnavailable(String),

    /// Backend did not answer within the configured deadline. Treated
    /// identically to an invocation failure by the fallback chain.
    #[error("backend '{backend}' timed out after {after:?}")]
    BackendTimeout { backend: String, after: Duration },

    /// Backend-reported invocation error.
    #[error("backend '{backend}' error: {message}")]
    Backend { backend: String, message: String },

    /// A warm-up load failed inside the cache. Surfaced to the router as a
    /// form of unavailability; the cache never retries internally.
    #[error("load failed for backend '{backend}': {reason}")]
    CacheLoadFailed { backend: String, reason: String },

    /// No descriptor registered under this id.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Every candidate, including the remote fallback, failed. This is the
    /// only error a request source ever sees.
    #[error("all backends failed: [{}]", .attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    AllBackendsFailed { attempts: Vec<BackendAttempt> },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl MuninnError {
    /// Whether this error means "this candidate failed, try the next".
    ///
    /// The router treats unavailability, timeouts, backend-reported errors
    /// and failed warm-up loads uniformly; anything else is terminal.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            MuninnError::BackendUnavailable(_)
                | MuninnError::BackendTimeout { .. }
                | MuninnError::Backend { .. }
                | MuninnError::CacheLoadFailed { .. }
        )
    }
}

impl From<reqwest::Error> for MuninnError {
    fn from(err: reqwest::Error) -> Self {
        MuninnError::Http(err.to_string())
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
