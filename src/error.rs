// Error module: one error type for the whole library. Every failure is
// tagged with a category so the workflow (and the CLI) can decide what to
// do with it without matching on message text.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Validation,
    Network,
    Protocol,
    Io,
}

impl ErrorKind {
    /// Only transport failures are worth another attempt; everything else
    /// fails the same way when repeated.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network)
    }
}

/// Errors produced while publishing an article.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing credentials or unusable settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A local input file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Wrong file type/size or a malformed payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection failure, timeout or an HTTP 4xx/5xx status.
    #[error("network error: {0}")]
    Network(String),

    /// Unparseable response or an application-level error code.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local filesystem failure other than a missing input.
    #[error("io error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::Configuration(_) => ErrorKind::Configuration,
            PublishError::NotFound(_) => ErrorKind::NotFound,
            PublishError::Validation(_) => ErrorKind::Validation,
            PublishError::Network(_) => ErrorKind::Network,
            PublishError::Protocol(_) => ErrorKind::Protocol,
            PublishError::Io { .. } => ErrorKind::Io,
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PublishError::network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            PublishError::protocol(format!("failed to decode response: {err}"))
        } else {
            PublishError::network(err.to_string())
        }
    }
}
