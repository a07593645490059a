//! Error taxonomy for the stream proxy
//!
//! Every failure inside the resolver and the fetch cascade is expressed as an
//! [`Error`] so it can be logged with a category and, at the HTTP edge,
//! mapped to a status code.

use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Proxy token could not be decoded
    #[error("Invalid proxy token: {reason}")]
    InvalidToken {
        /// Why decoding failed
        reason: String,
    },

    /// Token referenced a session that is unknown or past its TTL
    #[error("Session expired or unknown")]
    SessionExpired,

    /// Upstream answered with a non-2xx terminal status
    #[error("Upstream returned status {status} for {url}")]
    UpstreamStatus {
        /// HTTP status code
        status: u16,
        /// Truncated upstream URL
        url: String,
    },

    /// Timeout errors
    #[error("Operation timed out after {duration_secs} seconds: {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// Duration in seconds before timing out
        duration_secs: u64,
    },

    /// Redirect chain longer than allowed
    #[error("Too many redirects ({hops}) while fetching {url}")]
    TooManyRedirects {
        /// Truncated URL of the original request
        url: String,
        /// Number of hops followed before giving up
        hops: usize,
    },

    /// Every applicable fetch strategy failed
    #[error("All fetch strategies failed for {url}: {}", attempts.join("; "))]
    UpstreamExhausted {
        /// Truncated upstream URL
        url: String,
        /// One line per failed strategy
        attempts: Vec<String>,
    },

    /// Browser automation failures
    #[error("Automation error during {stage}: {message}")]
    Automation {
        /// Pipeline stage (launch, navigate, evaluate, ...)
        stage: String,
        /// Error message describing the failure
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error in {field}: {message}")]
    Config {
        /// The configuration field that has an error
        field: String,
        /// Error message describing the issue
        message: String,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal issue
        message: String,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid token error
    pub fn invalid_token<S: Into<String>>(reason: S) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Create an upstream status error
    pub fn upstream_status<S: Into<String>>(status: u16, url: S) -> Self {
        Self::UpstreamStatus {
            status,
            url: url.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_secs,
        }
    }

    /// Create an automation error
    pub fn automation<S: Into<String>>(stage: S, message: S) -> Self {
        Self::Automation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(field: S, message: S) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether upstream rejected the request as unauthorized (401/403)
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Error::UpstreamStatus {
                status: 401 | 403,
                ..
            }
        )
    }

    /// Whether this error belongs to the upstream fetch family
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Error::Http(..)
                | Error::UpstreamStatus { .. }
                | Error::Timeout { .. }
                | Error::TooManyRedirects { .. }
                | Error::UpstreamExhausted { .. }
        )
    }

    /// HTTP status the proxy surface answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidToken { .. } => 400,
            Error::SessionExpired => 410,
            _ => 502,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Http(..) => "http",
            Error::Json(..) => "json",
            Error::Toml(..) => "toml",
            Error::Url(..) => "url",
            Error::Io(..) => "io",
            Error::InvalidToken { .. } => "token",
            Error::SessionExpired => "session",
            Error::UpstreamStatus { .. } => "upstream_status",
            Error::Timeout { .. } => "timeout",
            Error::TooManyRedirects { .. } => "redirect",
            Error::UpstreamExhausted { .. } => "upstream",
            Error::Automation { .. } => "automation",
            Error::Config { .. } => "config",
            Error::Internal { .. } => "internal",
        }
    }
}
