//! Error types for the DDNS client
//!
//! Errors fall into three families that the engine treats differently:
//!
//! - **Resolution** errors abort the current cycle and are retried on the next tick.
//! - **Rejections** (`Rejected`, `Authentication`) are surfaced to the user and are not
//!   retried until the configuration changes or an update is requested manually.
//! - **Settings** errors are fatal: no cycle can run without readable settings.
//!
//! Everything else coming out of a provider is treated as transient.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS client
#[derive(Error, Debug)]
pub enum Error {
    /// The public address could not be determined
    #[error("Address resolution failed: {0}")]
    Resolution(String),

    /// Settings store is unreadable, corrupted or could not be written
    #[error("Settings store error: {0}")]
    Settings(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport or server-side errors (from provider endpoints)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider refused the update (bad record, bad request, ...)
    #[error("Update rejected: {0}")]
    Rejected(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an address resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a settings store error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the update cannot succeed until the user changes something.
    ///
    /// Covers provider refusals and requests that cannot even be built from
    /// the configuration. Rejections are not retried automatically.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::Authentication(_) | Self::Config(_)
        )
    }

    /// Whether this error means the settings store cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Settings(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_classification() {
        assert!(Error::rejected("nohost").is_rejection());
        assert!(Error::auth("bad key").is_rejection());
        assert!(Error::config("template needs {record_id}").is_rejection());
        assert!(!Error::http("502 Bad Gateway").is_rejection());
        assert!(!Error::rate_limited("slow down").is_rejection());
        assert!(!Error::timeout("10s").is_rejection());
    }

    #[test]
    fn only_settings_errors_are_fatal() {
        assert!(Error::settings("corrupted").is_fatal());
        assert!(!Error::resolution("offline").is_fatal());
        assert!(!Error::config("empty hostname").is_fatal());
    }
}
