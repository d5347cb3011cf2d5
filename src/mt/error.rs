use thiserror::Error;

/// Error types for machine translation providers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MtError {
    /// The request never got a response (connect, timeout, broken body)
    #[error("Network error: {0}")]
    Network(String),
    /// The provider answered with a rate limit or server error
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid locale: {0}")]
    InvalidLocale(String),
    /// The provider rejected the request or returned an unusable response
    #[error("Translation error: {0}")]
    Translation(String),
}

impl MtError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, MtError::Network(_) | MtError::Unavailable(_))
    }
}

/// Result type for MT operations
pub type MtResult<T> = Result<T, MtError>;
