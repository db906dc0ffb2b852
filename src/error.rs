use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, GmailError>;

/// Everything that can stop an export
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API answered with an unexpected status
    #[error("Gmail API error: {0}")]
    ApiError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The provider refused the refresh token (expired or revoked)
    #[error("Token refresh rejected: {0}")]
    TokenRefreshRejected(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Connection problems before any HTTP status was received
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// 404 for a message, label or profile
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Raw payload missing or not RFC 822
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// No label has the requested name or id
    #[error("Label not found: {0}")]
    LabelNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid config file, token file or application credentials
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GmailError {
    /// Whether rerunning the export later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimitExceeded(_)
                | GmailError::ServerError { .. }
                | GmailError::NetworkError(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Classify a non-success HTTP status from the Gmail API
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => GmailError::BadRequest(message),
            401 => GmailError::AuthError(message),
            403 => GmailError::Forbidden(message),
            404 => GmailError::NotFound(message),
            429 => GmailError::RateLimitExceeded(message),
            500..=599 => GmailError::ServerError { status, message },
            _ => GmailError::ApiError(message),
        }
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );
                GmailError::from_status(status.as_u16(), message)
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(err.to_string()),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            other => GmailError::ApiError(other.to_string()),
        }
    }
}
